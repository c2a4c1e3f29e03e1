//! Firmware and filesystem flashing
//!
//! A flash run is an ordered list of [`Stage`]s:
//!
//! ```text
//! check-permissions -> check-device -> build-firmware -> flash-firmware
//!     -> prepare-filesystem -> flash-filesystem
//! ```
//!
//! Stages run one after another and the first failure ends the run. Nothing
//! is rolled back: if the filesystem flash fails the new firmware stays on
//! the device. A stage may also end the run early without failing, which is
//! how a missing image tool is handled.
//!
//! Everything that touches the host or the device goes through [`Backend`],
//! with [`SystemBackend`] as the real implementation.

mod stages;
mod system;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::buildlog::BuildLog;
use crate::config::FlashConfig;
use crate::error::FlashError;
use crate::image::ImagePacker;
use crate::partition::ResolvedPartition;
use crate::process::CommandOutput;

pub use stages::{
    BuildFirmware, CheckDevice, CheckPermissions, FlashFilesystem, FlashFirmware,
    ImageStatus, PrepareFilesystem, prepare_image,
};
pub use system::SystemBackend;

/// Host and device side effects used by the stages.
pub trait Backend {
    /// Names of the groups the current user belongs to, or `None` when the
    /// platform has no such concept.
    fn user_groups(&self) -> std::io::Result<Option<Vec<String>>>;

    fn probe_port(&self, port: &str, baud: u32, timeout: Duration) -> serialport::Result<()>;

    /// Run a firmware toolchain subcommand such as `build` or `flash`.
    fn run_toolchain(
        &self,
        subcommand: &str,
        extra_args: &[String],
    ) -> Result<CommandOutput, FlashError>;

    fn write_flash(
        &self,
        port: &str,
        baud: u32,
        offset: u64,
        image: &Path,
    ) -> std::io::Result<CommandOutput>;
}

/// Whether the run continues after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Shared state handed to each stage.
pub struct FlashContext<'a> {
    pub config: &'a FlashConfig,
    pub backend: &'a dyn Backend,
    pub packer: &'a dyn ImagePacker,
    pub build_log: &'a BuildLog,
    /// Rebuild the filesystem image even if it looks current
    pub force_image: bool,
    /// Filled in by [`PrepareFilesystem`]
    pub partition: Option<ResolvedPartition>,
}

impl<'a> FlashContext<'a> {
    pub fn new(
        config: &'a FlashConfig,
        backend: &'a dyn Backend,
        packer: &'a dyn ImagePacker,
        build_log: &'a BuildLog,
    ) -> Self {
        Self {
            config,
            backend,
            packer,
            build_log,
            force_image: false,
            partition: None,
        }
    }

    pub fn force_image(mut self, force: bool) -> Self {
        self.force_image = force;
        self
    }
}

pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError>;
}

#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: &'static str,
    #[source]
    pub error: FlashError,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub completed: Vec<&'static str>,
    /// A stage ended the run before the last stage
    pub stopped_early: bool,
}

/// Run `stages` in order, halting on the first failure.
pub fn run_stages(
    stages: &[Box<dyn Stage>],
    ctx: &mut FlashContext<'_>,
) -> Result<RunReport, StageFailure> {
    let mut report = RunReport::default();
    for (idx, stage) in stages.iter().enumerate() {
        let name = stage.name();
        info!("==> [{}/{}] {}", idx + 1, stages.len(), name);
        match stage.run(ctx) {
            Ok(flow) => {
                report.completed.push(name);
                if flow == Flow::Stop {
                    report.stopped_early = idx + 1 < stages.len();
                    break;
                }
            }
            Err(error) => {
                error!("{name} failed");
                return Err(StageFailure { stage: name, error });
            }
        }
    }
    Ok(report)
}

/// Firmware build and flash followed by the filesystem image.
pub fn full_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CheckPermissions),
        Box::new(CheckDevice),
        Box::new(BuildFirmware),
        Box::new(FlashFirmware),
        Box::new(PrepareFilesystem),
        Box::new(FlashFilesystem),
    ]
}

pub fn firmware_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CheckPermissions),
        Box::new(CheckDevice),
        Box::new(BuildFirmware),
        Box::new(FlashFirmware),
    ]
}

pub fn filesystem_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CheckPermissions),
        Box::new(CheckDevice),
        Box::new(PrepareFilesystem),
        Box::new(FlashFilesystem),
    ]
}
