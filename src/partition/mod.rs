//! Partition table parsing
//!
//! The table is the CSV format used by ESP-IDF projects:
//!
//! ```text
//! # Name,   Type, SubType, Offset,  Size,    Flags
//! nvs,      data, nvs,     0x9000,  0x5000,
//! factory,  app,  factory, 0x10000, 1M,
//! storage,  data, spiffs,  ,        1M,
//! ```

pub mod size;
pub mod table;

use std::path::Path;

pub use size::parse_size;
pub use table::{PartitionEntry, ResolvedPartition, parse_table, resolve_partition};

use crate::error::{FlashError, PartitionError};

/// Read the table at `path` and resolve `name` from it.
pub fn resolve_from_file(path: &Path, name: &str) -> Result<ResolvedPartition, FlashError> {
    std::fs::read_to_string(path)
        .map_err(|e| PartitionError::TableUnreadable(e.to_string()))
        .and_then(|text| resolve_partition(&text, name))
        .map_err(|source| FlashError::PartitionResolutionError {
            name: name.to_string(),
            table: path.to_path_buf(),
            source,
        })
}
