use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::image::builder::{DEFAULT_BLOCK_SIZE, DEFAULT_PAGE_SIZE};

pub const CONFIG_FILE: &str = ".wazoo.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<FirmwareConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub www: Option<WwwConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud: Option<u32>,
    /// Groups the user must belong to for serial access
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub probe_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FirmwareConfig {
    /// Environment variable holding the SDK root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdk_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_retain: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FilesystemConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_table: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WwwConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<PathBuf>,
}

/// Fully resolved settings for the flash pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashConfig {
    pub port: String,
    pub baud: u32,
    pub groups: Vec<String>,
    pub probe_timeout: Duration,
    pub sdk_env: String,
    pub python: String,
    pub flash_tool: String,
    pub log_dir: PathBuf,
    pub log_retain: usize,
    pub partition_table: PathBuf,
    pub partition: String,
    pub data_dir: PathBuf,
    pub image: PathBuf,
    pub image_tool: String,
    pub block_size: u32,
    pub page_size: u32,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 460_800,
            groups: vec!["dialout".to_string(), "plugdev".to_string()],
            probe_timeout: Duration::from_secs(1),
            sdk_env: "IDF_PATH".to_string(),
            python: "python3".to_string(),
            flash_tool: "esptool.py".to_string(),
            log_dir: PathBuf::from("logs"),
            log_retain: 5,
            partition_table: PathBuf::from("partitions.csv"),
            partition: "storage".to_string(),
            data_dir: PathBuf::from("data"),
            image: PathBuf::from("build/storage.bin"),
            image_tool: "mklittlefs".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            scratch_dir: None,
        }
    }
}

impl FlashConfig {
    /// Merge CLI values over the config file over the defaults.
    pub fn resolve(app: Option<&AppConfig>, port: Option<String>, baud: Option<u32>) -> Self {
        let mut cfg = Self::default();
        let Some(app) = app else {
            cfg.port = port.unwrap_or(cfg.port);
            cfg.baud = baud.unwrap_or(cfg.baud);
            return cfg;
        };

        if let Some(dev) = &app.device {
            if let Some(v) = &dev.port {
                cfg.port = v.clone();
            }
            if let Some(v) = dev.baud {
                cfg.baud = v;
            }
            if let Some(v) = &dev.groups {
                cfg.groups = v.clone();
            }
            if let Some(v) = dev.probe_timeout {
                cfg.probe_timeout = v;
            }
        }
        if let Some(fw) = &app.firmware {
            if let Some(v) = &fw.sdk_env {
                cfg.sdk_env = v.clone();
            }
            if let Some(v) = &fw.python {
                cfg.python = v.clone();
            }
            if let Some(v) = &fw.flash_tool {
                cfg.flash_tool = v.clone();
            }
            if let Some(v) = &fw.log_dir {
                cfg.log_dir = v.clone();
            }
            if let Some(v) = fw.log_retain {
                cfg.log_retain = v;
            }
        }
        if let Some(fsc) = &app.filesystem {
            if let Some(v) = &fsc.partition_table {
                cfg.partition_table = v.clone();
            }
            if let Some(v) = &fsc.partition {
                cfg.partition = v.clone();
            }
            if let Some(v) = &fsc.data_dir {
                cfg.data_dir = v.clone();
            }
            if let Some(v) = &fsc.image {
                cfg.image = v.clone();
            }
            if let Some(v) = &fsc.tool {
                cfg.image_tool = v.clone();
            }
            if let Some(v) = fsc.block_size {
                cfg.block_size = v;
            }
            if let Some(v) = fsc.page_size {
                cfg.page_size = v;
            }
            if fsc.scratch_dir.is_some() {
                cfg.scratch_dir = fsc.scratch_dir.clone();
            }
        }

        cfg.port = port.unwrap_or(cfg.port);
        cfg.baud = baud.unwrap_or(cfg.baud);
        cfg
    }
}

/// Source and output trees for the web asset build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WwwPaths {
    pub src: PathBuf,
    pub dest: PathBuf,
}

impl WwwPaths {
    pub fn resolve(app: Option<&AppConfig>) -> Self {
        let www = app.and_then(|c| c.www.as_ref());
        Self {
            src: www
                .and_then(|w| w.src.clone())
                .unwrap_or_else(|| PathBuf::from("src_www")),
            dest: www
                .and_then(|w| w.dest.clone())
                .unwrap_or_else(|| PathBuf::from("data/www")),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn generate_config_file(path: impl AsRef<Path>, force: bool) -> anyhow::Result<()> {
        let path = path.as_ref();
        if path.exists() && !force {
            anyhow::bail!(
                "Configuration file {} already exists. Use --force to overwrite.",
                path.display()
            );
        }

        fs::write(path, Self::generate_full_config()?)?;

        info!("Configuration file generated: {}", path.display());
        info!("Please edit this file to customize configuration");
        Ok(())
    }

    pub fn generate_full_config() -> anyhow::Result<String> {
        let defaults = FlashConfig::default();
        let www = WwwPaths::resolve(None);
        let config = AppConfig {
            device: Some(DeviceConfig {
                port: Some(defaults.port),
                baud: Some(defaults.baud),
                groups: Some(defaults.groups),
                probe_timeout: Some(defaults.probe_timeout),
            }),
            firmware: Some(FirmwareConfig {
                sdk_env: Some(defaults.sdk_env),
                python: Some(defaults.python),
                flash_tool: Some(defaults.flash_tool),
                log_dir: Some(defaults.log_dir),
                log_retain: Some(defaults.log_retain),
            }),
            filesystem: Some(FilesystemConfig {
                partition_table: Some(defaults.partition_table),
                partition: Some(defaults.partition),
                data_dir: Some(defaults.data_dir),
                image: Some(defaults.image),
                tool: Some(defaults.image_tool),
                block_size: Some(defaults.block_size),
                page_size: Some(defaults.page_size),
                scratch_dir: None,
            }),
            www: Some(WwwConfig {
                src: Some(www.src),
                dest: Some(www.dest),
            }),
        };
        let toml_content = toml::to_string_pretty(&config)?;
        Ok(format!(
            "# wazoo configuration file\n# All fields are optional, command line arguments override config file values\n\n{}",
            toml_content
        ))
    }
}
