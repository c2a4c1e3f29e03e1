//! Error types for partition resolution, image building and flashing

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading the partition table
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// Size or offset text could not be parsed
    #[error("invalid size format: {0:?}")]
    InvalidSizeFormat(String),

    /// A non-comment row has fewer than 5 comma-separated fields
    #[error("malformed partition table row at line {line}: expected at least 5 fields, found {fields}")]
    MalformedRow { line: usize, fields: usize },

    /// No row carries the requested name
    #[error("partition {0:?} not found in partition table")]
    PartitionNotFound(String),

    /// The table file could not be read
    #[error("cannot read partition table: {0}")]
    TableUnreadable(String),

    /// The matched row has an empty size column
    #[error("partition {0:?} has an empty size field")]
    EmptySize(String),
}

/// Errors raised while packing the filesystem image
#[derive(Debug, Error)]
pub enum ImageError {
    /// The packing tool is not on PATH. Not fatal to a flash run.
    #[error("image packing tool `{0}` not found in PATH")]
    ImageToolUnavailable(String),

    /// Copying the data directory into the scratch directory failed
    #[error("failed to stage {path} for packing: {source}")]
    StagingFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The packing tool ran and exited non-zero
    #[error("`{tool}` failed ({status}):\n{output}")]
    PackingFailed {
        tool: String,
        status: String,
        output: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the flash stages
#[derive(Debug, Error)]
pub enum FlashError {
    /// The user is missing one or more required groups
    #[error("user is not a member of required group(s): {}", .missing.join(", "))]
    InsufficientPrivilege { missing: Vec<String> },

    #[error("failed to look up group membership: {0}")]
    GroupLookup(String),

    /// The serial port could not be opened
    #[error("serial device {port} is not available: {reason}")]
    DeviceNotFound { port: String, reason: String },

    /// The SDK root environment variable is not set
    #[error("{var} is not set, source the SDK export script first")]
    SdkRootUnset { var: String },

    /// A toolchain subcommand exited non-zero
    #[error("toolchain `{subcommand}` failed ({status}), log saved to {}:\n{output}", .log.display())]
    ToolchainError {
        subcommand: String,
        status: String,
        log: PathBuf,
        output: String,
    },

    #[error("failed to write build log: {0:#}")]
    BuildLog(anyhow::Error),

    #[error("failed to resolve partition {name:?} from {}: {source}", .table.display())]
    PartitionResolutionError {
        name: String,
        table: PathBuf,
        #[source]
        source: PartitionError,
    },

    #[error(transparent)]
    Image(#[from] ImageError),

    /// The filesystem image is not on disk when the flash step runs
    #[error("filesystem image {} does not exist", .0.display())]
    ImageMissing(PathBuf),

    /// The flash tool exited non-zero
    #[error("flashing {} at {offset:#x} failed ({status}):\n{output}", .image.display())]
    FlashFailed {
        image: PathBuf,
        offset: u64,
        status: String,
        output: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl FlashError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl ImageError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
