use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::Path;

use wazoo::buildlog::BuildLog;
use wazoo::config::{AppConfig, CONFIG_FILE, FlashConfig, WwwPaths};
use wazoo::flash::{self, FlashContext, ImageStatus, SystemBackend};
use wazoo::image::MkLittlefs;
use wazoo::partition;
use wazoo::www;

#[derive(Parser)]
#[command(name = "wazoo")]
#[command(about = "Build and flash firmware, web assets and the LittleFS image", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Web asset tasks (minify, copy, rewrite references)
    Www {
        #[command(subcommand)]
        action: www::WwwAction,
    },

    /// Show where a partition lives in flash
    Partition {
        /// Partition name (defaults to the configured filesystem partition)
        #[arg(value_name = "NAME")]
        name: Option<String>,

        /// JSON output
        #[arg(long)]
        json: bool,
    },

    /// Build the filesystem image if it is out of date
    Image {
        /// Rebuild even if the image looks current
        #[arg(short, long)]
        force: bool,
    },

    /// Build and flash the firmware, then the filesystem image
    Flash {
        /// Serial port (e.g. /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Rebuild the filesystem image even if it looks current
        #[arg(long)]
        force_image: bool,

        /// Stop after flashing the firmware
        #[arg(long, conflicts_with = "force_image")]
        firmware_only: bool,
    },

    /// Flash only the filesystem image
    FlashFs {
        /// Serial port (e.g. /dev/ttyUSB0)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Rebuild the filesystem image even if it looks current
        #[arg(long)]
        force_image: bool,
    },

    /// List serial ports
    Ports,

    /// Generate configuration file (.wazoo.toml) in current directory
    Genconfig {
        /// Force overwrite existing configuration file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logger, default info level, display file line number and time
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            let level_style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "[{} {level_style}{}{level_style:#} {}:{}] {level_style}{}{level_style:#}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();

    // Try to load configuration file
    let app_config = if Path::new(CONFIG_FILE).exists() {
        match AppConfig::load_from_file(CONFIG_FILE) {
            Ok(cfg) => {
                let abs_path = std::fs::canonicalize(CONFIG_FILE)
                    .unwrap_or_else(|_| std::path::PathBuf::from(CONFIG_FILE));
                info!("Using configuration file: {}", abs_path.display());
                Some(cfg)
            }
            Err(e) => {
                error!("Failed to load configuration file: {}, using defaults", e);
                None
            }
        }
    } else {
        None
    };

    match cli.command {
        Commands::Www { action } => {
            let paths = WwwPaths::resolve(app_config.as_ref());
            www::run(action, &paths.src, &paths.dest)?;
        }

        Commands::Partition { name, json } => {
            let cfg = FlashConfig::resolve(app_config.as_ref(), None, None);
            let name = name.unwrap_or(cfg.partition);
            let part = partition::resolve_from_file(&cfg.partition_table, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&part)?);
            } else {
                println!(
                    "{}: offset {:#x}, size {:#x} ({} bytes)",
                    part.name, part.offset, part.size, part.size
                );
            }
        }

        Commands::Image { force } => {
            let cfg = FlashConfig::resolve(app_config.as_ref(), None, None);
            let packer = MkLittlefs::new(cfg.image_tool.clone());
            match flash::prepare_image(&cfg, &packer, force)? {
                ImageStatus::Ready(_) => info!("{} is ready", cfg.image.display()),
                ImageStatus::ToolUnavailable(tool) => {
                    anyhow::bail!("{tool} not found in PATH, cannot build the image")
                }
            }
        }

        Commands::Flash {
            port,
            baud,
            force_image,
            firmware_only,
        } => {
            let cfg = FlashConfig::resolve(app_config.as_ref(), port, baud);
            let stages = if firmware_only {
                flash::firmware_stages()
            } else {
                flash::full_stages()
            };
            run_flash(&cfg, &stages, force_image)?;
        }

        Commands::FlashFs {
            port,
            baud,
            force_image,
        } => {
            let cfg = FlashConfig::resolve(app_config.as_ref(), port, baud);
            run_flash(&cfg, &flash::filesystem_stages(), force_image)?;
        }

        Commands::Ports => wazoo::ports::list()?,

        Commands::Genconfig { force } => {
            if let Err(e) = AppConfig::generate_config_file(CONFIG_FILE, force) {
                error!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn run_flash(cfg: &FlashConfig, stages: &[Box<dyn flash::Stage>], force_image: bool) -> Result<()> {
    let backend = SystemBackend::new(cfg);
    let packer = MkLittlefs::new(cfg.image_tool.clone());
    let build_log = BuildLog::new(&cfg.log_dir, cfg.log_retain);
    let mut ctx = FlashContext::new(cfg, &backend, &packer, &build_log).force_image(force_image);

    let report = match flash::run_stages(stages, &mut ctx) {
        Ok(report) => report,
        Err(failure) => {
            if failure.stage == "check-device" {
                info!("run `wazoo ports` to see which serial ports are present");
            }
            return Err(failure).context("flash aborted");
        }
    };
    if report.stopped_early {
        warn!("finished without flashing the filesystem image");
    } else {
        info!("all {} stages completed", report.completed.len());
    }
    Ok(())
}
