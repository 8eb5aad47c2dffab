//! Numeric argument parsing
//!
//! Offsets and sizes accept decimal, `0x` hex, `0o` octal and `0b` binary,
//! optionally followed by a `K`, `M` or `G` binary multiplier.

/// Parse an unsigned integer with an optional radix prefix
pub fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();

    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };

    if digits.is_empty() {
        return Err(format!("'{s}' is not a number"));
    }
    u64::from_str_radix(digits, radix).map_err(|e| format!("'{s}' is not a valid number: {e}"))
}

/// Parse a byte count or offset such as `4096`, `0x1000` or `4K`
pub fn parse_size(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (num_str, multiplier) = if let Some(rest) = upper.strip_suffix('K') {
        (rest, 1024u64)
    } else if let Some(rest) = upper.strip_suffix('M') {
        (rest, 1024 * 1024)
    } else if let Some(rest) = upper.strip_suffix('G') {
        (rest, 1024 * 1024 * 1024)
    } else {
        (upper.as_str(), 1)
    };

    let num = parse_number(num_str).map_err(|_| format!("Invalid size '{trimmed}'"))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("Size '{trimmed}' is too large"))
}

/// Parse a fill value; range checking to 0..=15 happens during resolution
pub fn parse_fill(s: &str) -> Result<u8, String> {
    let value = parse_number(s)?;
    u8::try_from(value).map_err(|_| format!("Invalid fill parameter '{s}'. Expected 0<=fill<=15."))
}
