use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::Backend;
use crate::config::FlashConfig;
use crate::error::FlashError;
use crate::process::{CommandOutput, run_captured};

/// Talks to the real host: `id`, the serial port, `idf.py` and `esptool.py`.
pub struct SystemBackend {
    sdk_env: String,
    python: String,
    flash_tool: String,
}

impl SystemBackend {
    pub fn new(config: &FlashConfig) -> Self {
        Self {
            sdk_env: config.sdk_env.clone(),
            python: config.python.clone(),
            flash_tool: config.flash_tool.clone(),
        }
    }

    fn sdk_root(&self) -> Result<PathBuf, FlashError> {
        std::env::var_os(&self.sdk_env)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| FlashError::SdkRootUnset {
                var: self.sdk_env.clone(),
            })
    }
}

impl Backend for SystemBackend {
    #[cfg(unix)]
    fn user_groups(&self) -> std::io::Result<Option<Vec<String>>> {
        let out = run_captured(Command::new("id").arg("-Gn"))?;
        if !out.success() {
            return Err(std::io::Error::other(format!(
                "`id -Gn` failed ({}): {}",
                out.status(),
                out.combined()
            )));
        }
        Ok(Some(
            out.stdout.split_whitespace().map(str::to_string).collect(),
        ))
    }

    #[cfg(not(unix))]
    fn user_groups(&self) -> std::io::Result<Option<Vec<String>>> {
        Ok(None)
    }

    fn probe_port(&self, port: &str, baud: u32, timeout: Duration) -> serialport::Result<()> {
        let _port = serialport::new(port, baud).timeout(timeout).open()?;
        Ok(())
    }

    fn run_toolchain(
        &self,
        subcommand: &str,
        extra_args: &[String],
    ) -> Result<CommandOutput, FlashError> {
        let idf = self.sdk_root()?.join("tools").join("idf.py");
        info!("idf.py {} {}", extra_args.join(" "), subcommand);
        run_captured(
            Command::new(&self.python)
                .arg(&idf)
                .args(extra_args)
                .arg(subcommand),
        )
        .map_err(|e| FlashError::io(format!("failed to run {}", idf.display()), e))
    }

    fn write_flash(
        &self,
        port: &str,
        baud: u32,
        offset: u64,
        image: &Path,
    ) -> std::io::Result<CommandOutput> {
        let baud = baud.to_string();
        run_captured(
            Command::new(&self.flash_tool)
                .args(["--port", port, "--baud", baud.as_str()])
                .arg("write_flash")
                .arg(format!("{offset:#x}"))
                .arg(image),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolchain_fails_fast_without_sdk_root() {
        let config = FlashConfig {
            sdk_env: "WAZOO_TEST_SDK_ROOT_THAT_IS_NEVER_SET".to_string(),
            ..FlashConfig::default()
        };
        let backend = SystemBackend::new(&config);
        match backend.run_toolchain("build", &[]) {
            Err(FlashError::SdkRootUnset { var }) => {
                assert_eq!(var, "WAZOO_TEST_SDK_ROOT_THAT_IS_NEVER_SET")
            }
            other => panic!("expected SdkRootUnset, got {other:?}"),
        }
    }

    #[test]
    fn missing_serial_port_is_an_error() {
        let backend = SystemBackend::new(&FlashConfig::default());
        assert!(
            backend
                .probe_port("/dev/wazoo-no-such-port", 115200, Duration::from_millis(10))
                .is_err()
        );
    }
}
