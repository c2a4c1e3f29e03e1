#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use walkdir::WalkDir;
use wazoo::config::FlashConfig;
use wazoo::error::FlashError;
use wazoo::flash::Backend;
use wazoo::image::{ImagePacker, PackRequest};
use wazoo::process::CommandOutput;

pub const TABLE: &str = "# Name,   Type, SubType, Offset,  Size, Flags\n\
                         nvs,      data, nvs,     0x9000,  0x5000,\n\
                         phy_init, data, phy,     0xe000,  0x1000,\n\
                         factory,  app,  factory, 0x10000, 1M,\n\
                         storage,  data, spiffs,  ,        1M,\n";

pub fn output(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// What the fake packer saw on one call.
#[derive(Debug, Clone)]
pub struct PackCall {
    pub source: PathBuf,
    pub block_size: u32,
    pub page_size: u32,
    pub image_size: u64,
    pub output: PathBuf,
    pub staged: Vec<String>,
}

pub struct FakePacker {
    pub available: bool,
    pub exit_code: i32,
    pub calls: RefCell<Vec<PackCall>>,
}

impl FakePacker {
    pub fn ok() -> Self {
        Self {
            available: true,
            exit_code: 0,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::ok()
        }
    }

    pub fn missing() -> Self {
        Self {
            available: false,
            ..Self::ok()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl ImagePacker for FakePacker {
    fn name(&self) -> &str {
        "fake-mklittlefs"
    }

    fn locate(&self) -> Option<PathBuf> {
        self.available.then(|| PathBuf::from("/usr/bin/fake-mklittlefs"))
    }

    fn pack(&self, _tool: &Path, req: &PackRequest<'_>) -> std::io::Result<CommandOutput> {
        self.calls.borrow_mut().push(PackCall {
            source: req.source.to_path_buf(),
            block_size: req.block_size,
            page_size: req.page_size,
            image_size: req.image_size,
            output: req.output.to_path_buf(),
            staged: list_files(req.source),
        });
        if self.exit_code != 0 {
            return Ok(output(self.exit_code, "", "mklittlefs: image too small"));
        }
        fs::write(req.output, vec![0xFFu8; 64])?;
        Ok(output(0, "packed", ""))
    }
}

/// Records every call made through [`Backend`].
pub struct MockBackend {
    pub groups: Option<Vec<String>>,
    pub port_ok: bool,
    pub build_code: i32,
    pub flash_fw_code: i32,
    pub write_flash_code: i32,
    pub calls: RefCell<Vec<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            groups: Some(vec!["users".into(), "dialout".into(), "plugdev".into()]),
            port_ok: true,
            build_code: 0,
            flash_fw_code: 0,
            write_flash_code: 0,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl MockBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl Backend for MockBackend {
    fn user_groups(&self) -> std::io::Result<Option<Vec<String>>> {
        self.record("user_groups".into());
        Ok(self.groups.clone())
    }

    fn probe_port(&self, port: &str, _baud: u32, _timeout: Duration) -> serialport::Result<()> {
        self.record(format!("probe_port {port}"));
        if self.port_ok {
            Ok(())
        } else {
            Err(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "No such file or directory",
            ))
        }
    }

    fn run_toolchain(
        &self,
        subcommand: &str,
        extra_args: &[String],
    ) -> Result<CommandOutput, FlashError> {
        let mut call = format!("toolchain {subcommand}");
        for arg in extra_args {
            call.push(' ');
            call.push_str(arg);
        }
        self.record(call);
        let code = match subcommand {
            "build" => self.build_code,
            _ => self.flash_fw_code,
        };
        Ok(output(code, &format!("{subcommand} output"), ""))
    }

    fn write_flash(
        &self,
        port: &str,
        baud: u32,
        offset: u64,
        image: &Path,
    ) -> std::io::Result<CommandOutput> {
        self.record(format!(
            "write_flash {port} {baud} {offset:#x} {}",
            image.display()
        ));
        Ok(output(self.write_flash_code, "", "A fatal error occurred"))
    }
}

/// A project laid out under `root`: partition table, data dir, no image yet.
pub fn project(root: &Path) -> FlashConfig {
    fs::write(root.join("partitions.csv"), TABLE).unwrap();
    let data = root.join("data");
    fs::create_dir_all(data.join("www/img")).unwrap();
    fs::write(data.join("config.json"), "{}").unwrap();
    fs::write(data.join("www/index.html"), "<html></html>").unwrap();
    fs::write(data.join("www/img/logo.png"), [0x89, b'P', b'N', b'G']).unwrap();

    FlashConfig {
        port: "/dev/ttyTEST0".into(),
        baud: 115200,
        log_dir: root.join("logs"),
        log_retain: 3,
        partition_table: root.join("partitions.csv"),
        partition: "storage".into(),
        data_dir: data,
        image: root.join("build/storage.bin"),
        scratch_dir: Some(root.join("scratch")),
        ..FlashConfig::default()
    }
}

pub fn list_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

pub fn dir_is_empty(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
