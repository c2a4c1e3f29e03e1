use super::{FlashContext, Flow, Stage};
use crate::config::FlashConfig;
use crate::error::{FlashError, ImageError};
use crate::image::{ImageBuildDecision, ImageBuilder, ImagePacker, needs_rebuild};
use crate::partition::{self, ResolvedPartition};

pub struct CheckPermissions;

impl Stage for CheckPermissions {
    fn name(&self) -> &'static str {
        "check-permissions"
    }

    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError> {
        let required = &ctx.config.groups;
        if required.is_empty() {
            return Ok(Flow::Continue);
        }

        let Some(groups) = ctx
            .backend
            .user_groups()
            .map_err(|e| FlashError::GroupLookup(e.to_string()))?
        else {
            warn!("group membership cannot be checked on this platform");
            return Ok(Flow::Continue);
        };

        let missing: Vec<String> = required
            .iter()
            .filter(|g| !groups.contains(*g))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(FlashError::InsufficientPrivilege { missing });
        }
        debug!("user is in {}", required.join(", "));
        Ok(Flow::Continue)
    }
}

pub struct CheckDevice;

impl Stage for CheckDevice {
    fn name(&self) -> &'static str {
        "check-device"
    }

    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError> {
        let cfg = ctx.config;
        ctx.backend
            .probe_port(&cfg.port, cfg.baud, cfg.probe_timeout)
            .map_err(|e| FlashError::DeviceNotFound {
                port: cfg.port.clone(),
                reason: e.to_string(),
            })?;
        info!("device found on {}", cfg.port);
        Ok(Flow::Continue)
    }
}

pub struct BuildFirmware;

impl Stage for BuildFirmware {
    fn name(&self) -> &'static str {
        "build-firmware"
    }

    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError> {
        run_toolchain(ctx, "build", &[])?;
        Ok(Flow::Continue)
    }
}

pub struct FlashFirmware;

impl Stage for FlashFirmware {
    fn name(&self) -> &'static str {
        "flash-firmware"
    }

    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError> {
        let args = [
            "-p".to_string(),
            ctx.config.port.clone(),
            "-b".to_string(),
            ctx.config.baud.to_string(),
        ];
        run_toolchain(ctx, "flash", &args)?;
        Ok(Flow::Continue)
    }
}

fn run_toolchain(
    ctx: &FlashContext<'_>,
    subcommand: &str,
    args: &[String],
) -> Result<(), FlashError> {
    let out = ctx.backend.run_toolchain(subcommand, args)?;
    let log = ctx
        .build_log
        .record(subcommand, &out)
        .map_err(FlashError::BuildLog)?;

    if !out.success() {
        return Err(FlashError::ToolchainError {
            subcommand: subcommand.to_string(),
            status: out.status(),
            log,
            output: out.combined(),
        });
    }
    info!("{subcommand} finished, log: {}", log.display());
    Ok(())
}

/// Outcome of getting the filesystem image ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    Ready(ResolvedPartition),
    /// The image needed building but the named tool is not installed
    ToolUnavailable(String),
}

/// Resolve the target partition and rebuild the image if it is stale.
pub fn prepare_image(
    config: &FlashConfig,
    packer: &dyn ImagePacker,
    force: bool,
) -> Result<ImageStatus, FlashError> {
    let part = partition::resolve_from_file(&config.partition_table, &config.partition)?;
    info!(
        "partition {}: offset {:#x}, size {} bytes",
        part.name, part.offset, part.size
    );

    let decision = needs_rebuild(force, &config.image, &config.data_dir).map_err(|e| {
        FlashError::io(
            format!(
                "failed to check {} against {}",
                config.image.display(),
                config.data_dir.display()
            ),
            e,
        )
    })?;
    if !decision.should_build() {
        info!("{} is up to date", config.image.display());
        return Ok(ImageStatus::Ready(part));
    }
    if let ImageBuildDecision::RebuildRequired(reason) = &decision {
        info!("rebuilding {} ({reason})", config.image.display());
    } else {
        info!("rebuilding {} (forced)", config.image.display());
    }

    let builder = ImageBuilder::new(packer)
        .with_geometry(config.block_size, config.page_size)
        .with_scratch_root(config.scratch_dir.clone());
    match builder.build(&config.data_dir, part.size, &config.image) {
        Ok(()) => Ok(ImageStatus::Ready(part)),
        Err(ImageError::ImageToolUnavailable(tool)) => Ok(ImageStatus::ToolUnavailable(tool)),
        Err(e) => Err(e.into()),
    }
}

pub struct PrepareFilesystem;

impl Stage for PrepareFilesystem {
    fn name(&self) -> &'static str {
        "prepare-filesystem"
    }

    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError> {
        match prepare_image(ctx.config, ctx.packer, ctx.force_image)? {
            ImageStatus::Ready(part) => {
                ctx.partition = Some(part);
                Ok(Flow::Continue)
            }
            ImageStatus::ToolUnavailable(tool) => {
                warn!("{tool} not found in PATH, skipping the filesystem image");
                warn!("the device will format an empty filesystem on first boot");
                Ok(Flow::Stop)
            }
        }
    }
}

pub struct FlashFilesystem;

impl Stage for FlashFilesystem {
    fn name(&self) -> &'static str {
        "flash-filesystem"
    }

    fn run(&self, ctx: &mut FlashContext<'_>) -> Result<Flow, FlashError> {
        let cfg = ctx.config;
        let part = match ctx.partition.take() {
            Some(part) => part,
            None => partition::resolve_from_file(&cfg.partition_table, &cfg.partition)?,
        };
        if !cfg.image.is_file() {
            return Err(FlashError::ImageMissing(cfg.image.clone()));
        }

        info!(
            "writing {} to {} at {:#x}",
            cfg.image.display(),
            cfg.port,
            part.offset
        );
        let out = ctx
            .backend
            .write_flash(&cfg.port, cfg.baud, part.offset, &cfg.image)
            .map_err(|e| FlashError::io(format!("failed to run {}", cfg.flash_tool), e))?;
        if !out.success() {
            return Err(FlashError::FlashFailed {
                image: cfg.image.clone(),
                offset: part.offset,
                status: out.status(),
                output: out.combined(),
            });
        }
        if !out.stdout.trim().is_empty() {
            debug!("{}", out.stdout.trim_end());
        }
        ctx.partition = Some(part);
        Ok(Flow::Continue)
    }
}
