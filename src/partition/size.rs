use crate::error::PartitionError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Parse a partition-table size such as `4096`, `0x1000`, `1536K` or `2M`.
///
/// Suffixes are checked before the hex prefix, so `0x10K` is not accepted.
/// The caller is expected to trim surrounding whitespace.
pub fn parse_size(input: &str) -> Result<u64, PartitionError> {
    let invalid = || PartitionError::InvalidSizeFormat(input.to_string());
    if input.is_empty() {
        return Err(invalid());
    }

    if let Some(num) = input.strip_suffix('M') {
        return parse_decimal(num)
            .and_then(|n| n.checked_mul(MIB))
            .ok_or_else(invalid);
    }
    if let Some(num) = input.strip_suffix('K') {
        return parse_decimal(num)
            .and_then(|n| n.checked_mul(KIB))
            .ok_or_else(invalid);
    }
    parse_number(input).ok_or_else(invalid)
}

/// Parse an offset column: `0x` hex or plain decimal, no suffixes.
pub fn parse_offset(input: &str) -> Result<u64, PartitionError> {
    parse_number(input).ok_or_else(|| PartitionError::InvalidSizeFormat(input.to_string()))
}

fn parse_number(s: &str) -> Option<u64> {
    match s.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => parse_decimal(s),
    }
}

fn parse_decimal(s: &str) -> Option<u64> {
    // u64::from_str accepts a leading '+', the table format does not
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
