use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::WalkDir;

use crate::error::ImageError;
use crate::process::{self, CommandOutput};

pub const DEFAULT_BLOCK_SIZE: u32 = 4096;
pub const DEFAULT_PAGE_SIZE: u32 = 256;

const SCRATCH_PREFIX: &str = "wazoo-fs-";

/// Everything the packing tool needs for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackRequest<'a> {
    pub source: &'a Path,
    pub block_size: u32,
    pub page_size: u32,
    pub image_size: u64,
    pub output: &'a Path,
}

/// External tool that turns a directory into a filesystem image.
pub trait ImagePacker {
    /// Name shown in logs and errors.
    fn name(&self) -> &str;
    /// `None` when the tool cannot be found.
    fn locate(&self) -> Option<PathBuf>;
    fn pack(&self, tool: &Path, request: &PackRequest<'_>) -> std::io::Result<CommandOutput>;
}

/// `mklittlefs -c <dir> -b <block> -p <page> -s <size> <image>`
#[derive(Debug, Clone)]
pub struct MkLittlefs {
    program: String,
}

impl MkLittlefs {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for MkLittlefs {
    fn default() -> Self {
        Self::new("mklittlefs")
    }
}

impl ImagePacker for MkLittlefs {
    fn name(&self) -> &str {
        &self.program
    }

    fn locate(&self) -> Option<PathBuf> {
        process::find_in_path(&self.program)
    }

    fn pack(&self, tool: &Path, req: &PackRequest<'_>) -> std::io::Result<CommandOutput> {
        process::run_captured(
            Command::new(tool)
                .arg("-c")
                .arg(req.source)
                .arg("-b")
                .arg(req.block_size.to_string())
                .arg("-p")
                .arg(req.page_size.to_string())
                .arg("-s")
                .arg(req.image_size.to_string())
                .arg(req.output),
        )
    }
}

/// Packs a data directory into an image via a private scratch copy.
pub struct ImageBuilder<'a> {
    packer: &'a dyn ImagePacker,
    block_size: u32,
    page_size: u32,
    scratch_root: Option<PathBuf>,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(packer: &'a dyn ImagePacker) -> Self {
        Self {
            packer,
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            scratch_root: None,
        }
    }

    pub fn with_geometry(mut self, block_size: u32, page_size: u32) -> Self {
        self.block_size = block_size;
        self.page_size = page_size;
        self
    }

    /// Create scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    pub fn build(&self, data_dir: &Path, image_size: u64, output: &Path) -> Result<(), ImageError> {
        let tool = self
            .packer
            .locate()
            .ok_or_else(|| ImageError::ImageToolUnavailable(self.packer.name().to_string()))?;

        // Removed when dropped, on every return path below.
        let scratch = self.scratch_dir()?;
        debug!("staging {} in {}", data_dir.display(), scratch.path().display());
        stage_dir(data_dir, scratch.path())?;

        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                ImageError::io(
                    format!("failed to create output directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let request = PackRequest {
            source: scratch.path(),
            block_size: self.block_size,
            page_size: self.page_size,
            image_size,
            output,
        };
        info!(
            "packing {} into {} ({} bytes, block {}, page {})",
            data_dir.display(),
            output.display(),
            image_size,
            self.block_size,
            self.page_size
        );
        let out = self
            .packer
            .pack(&tool, &request)
            .map_err(|e| ImageError::io(format!("failed to run {}", tool.display()), e))?;
        if !out.success() {
            return Err(ImageError::PackingFailed {
                tool: self.packer.name().to_string(),
                status: out.status(),
                output: out.combined(),
            });
        }
        if !out.stdout.trim().is_empty() {
            debug!("{}", out.stdout.trim_end());
        }
        Ok(())
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir, ImageError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.scratch_root {
            Some(root) => {
                fs::create_dir_all(root).map_err(|e| {
                    ImageError::io(format!("failed to create {}", root.display()), e)
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        dir.map_err(|e| ImageError::io("failed to create scratch directory", e))
    }
}

/// Copy each top-level entry of `src` into `dst`, directories recursively.
fn stage_dir(src: &Path, dst: &Path) -> Result<(), ImageError> {
    let staging = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ImageError::StagingFailed { path, source }
    };

    let entries = fs::read_dir(src).map_err(staging(src))?;
    for entry in entries {
        let entry = entry.map_err(staging(src))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(staging(&from))?;
        }
    }
    Ok(())
}

/// Symlinks are followed, matching `is_dir` at the top level of `stage_dir`.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), ImageError> {
    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| ImageError::StagingFailed {
            path: e.path().unwrap_or(src).to_path_buf(),
            source: e.into(),
        })?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        let result = if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
        } else {
            fs::copy(entry.path(), &target).map(|_| ())
        };
        result.map_err(|source| ImageError::StagingFailed {
            path: entry.path().to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
