use serde::Serialize;

use super::size::{parse_offset, parse_size};
use crate::error::PartitionError;

const MIN_FIELDS: usize = 5;

/// One row of the partition table, columns kept as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionEntry {
    /// 1-based line number in the source text
    pub line: usize,
    pub name: String,
    pub kind: String,
    pub subtype: String,
    /// `None` when the column is empty and the offset is inferred
    pub offset: Option<String>,
    pub size: String,
    pub flags: String,
}

impl PartitionEntry {
    pub fn offset_bytes(&self) -> Result<Option<u64>, PartitionError> {
        self.offset.as_deref().map(parse_offset).transpose()
    }

    pub fn size_bytes(&self) -> Result<u64, PartitionError> {
        if self.size.is_empty() {
            return Err(PartitionError::EmptySize(self.name.clone()));
        }
        parse_size(&self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPartition {
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

/// Split partition table text into rows, skipping blank and `#` lines.
pub fn parse_table(text: &str) -> Result<Vec<PartitionEntry>, PartitionError> {
    let mut entries = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < MIN_FIELDS {
            return Err(PartitionError::MalformedRow {
                line: idx + 1,
                fields: fields.len(),
            });
        }

        entries.push(PartitionEntry {
            line: idx + 1,
            name: fields[0].to_string(),
            kind: fields[1].to_string(),
            subtype: fields[2].to_string(),
            offset: Some(fields[3])
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            size: fields[4].to_string(),
            flags: fields.get(5).copied().unwrap_or_default().to_string(),
        });
    }
    Ok(entries)
}

/// Find `name` in the table and work out where it lives in flash.
///
/// A partition without an explicit offset is placed after the rows before
/// it: the last explicit offset seen, plus the sizes of every row from that
/// one onwards. Alignment padding is not modelled; the table is trusted.
pub fn resolve_partition(text: &str, name: &str) -> Result<ResolvedPartition, PartitionError> {
    let entries = parse_table(text)?;
    let pos = entries
        .iter()
        .position(|e| e.name == name)
        .ok_or_else(|| PartitionError::PartitionNotFound(name.to_string()))?;
    let entry = &entries[pos];

    let offset = match entry.offset_bytes()? {
        Some(offset) => offset,
        None => infer_offset(&entries[..pos])?,
    };

    let size = entry.size_bytes()?;
    if size == 0 {
        return Err(PartitionError::InvalidSizeFormat(entry.size.clone()));
    }

    Ok(ResolvedPartition {
        name: entry.name.clone(),
        offset,
        size,
    })
}

fn infer_offset(preceding: &[PartitionEntry]) -> Result<u64, PartitionError> {
    preceding.iter().try_fold(0u64, |acc, e| {
        let base = e.offset_bytes()?.unwrap_or(acc);
        let size = e.size_bytes()?;
        base.checked_add(size)
            .ok_or_else(|| PartitionError::InvalidSizeFormat(e.size.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "nvs,data,nvs,0x9000,0x5000,\n\
                         phy_init,data,phy,0xe000,0x1000,\n\
                         factory,app,factory,0x10000,1M,\n\
                         storage,data,spiffs,,1M,\n";

    #[test]
    fn infers_offset_from_preceding_rows() {
        let part = resolve_partition(TABLE, "storage").unwrap();
        assert_eq!(
            part,
            ResolvedPartition {
                name: "storage".into(),
                offset: 0x110000,
                size: 1_048_576,
            }
        );
    }

    #[test]
    fn explicit_offset_is_used_as_is() {
        let part = resolve_partition(TABLE, "phy_init").unwrap();
        assert_eq!(part.offset, 0xe000);
        assert_eq!(part.size, 0x1000);
    }

    #[test]
    fn auto_offsets_chain_through_several_rows() {
        let table = "# Name, Type, SubType, Offset, Size, Flags\n\
                     \n\
                     nvs,      data, nvs,     0x9000,  24K,\n\
                     phy_init, data, phy,     ,        4K,\n\
                     factory,  app,  factory, ,        1536K,\n\
                     littlefs, data, spiffs,  ,        0x80000, readonly\n";
        let part = resolve_partition(table, "littlefs").unwrap();
        assert_eq!(part.offset, 0x9000 + 24 * 1024 + 4 * 1024 + 1536 * 1024);
        assert_eq!(part.size, 0x80000);
    }

    #[test]
    fn first_row_without_offset_starts_at_zero() {
        let part = resolve_partition("boot,app,factory,,64K,\n", "boot").unwrap();
        assert_eq!(part.offset, 0);
    }

    #[test]
    fn comments_and_indented_comments_are_skipped() {
        let table = "   # indented comment\nnvs,data,nvs,0x9000,0x6000\n";
        let entries = parse_table(table).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, 2);
        assert_eq!(entries[0].flags, "");
    }

    #[test]
    fn missing_partition_is_reported() {
        assert_eq!(
            resolve_partition(TABLE, "otadata"),
            Err(PartitionError::PartitionNotFound("otadata".into()))
        );
    }

    #[test]
    fn short_row_is_malformed_even_after_the_target() {
        let table = "storage,data,spiffs,,1M\nbroken,data,nvs\n";
        assert_eq!(
            resolve_partition(table, "storage"),
            Err(PartitionError::MalformedRow { line: 2, fields: 3 })
        );
    }

    #[test]
    fn empty_size_is_reported() {
        let table = "nvs,data,nvs,0x9000,,\n";
        assert_eq!(
            resolve_partition(table, "nvs"),
            Err(PartitionError::EmptySize("nvs".into()))
        );
    }

    #[test]
    fn bad_size_in_a_preceding_row_fails_inference() {
        let table = "nvs,data,nvs,0x9000,lots,\nstorage,data,spiffs,,1M,\n";
        assert_eq!(
            resolve_partition(table, "storage"),
            Err(PartitionError::InvalidSizeFormat("lots".into()))
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(resolve_partition("nvs,data,nvs,0x9000,0,\n", "nvs").is_err());
    }

    #[test]
    fn first_matching_name_wins() {
        let table = "dup,data,nvs,0x1000,4K,\ndup,data,nvs,0x2000,8K,\n";
        let part = resolve_partition(table, "dup").unwrap();
        assert_eq!((part.offset, part.size), (0x1000, 4096));
    }
}
