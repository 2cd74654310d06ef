//! Parses memory-size strings like `"8g"` / `"512m"` / `"1.5k"` into a byte
//! count. Grammar: `<number>[.<number>]?\s*<letters>*`, case-insensitive;
//! a bare number means bytes, units are powers of 1024, and any unrecognized
//! trailing letters (`"100pb"`, `"100x"`) are a known shape but an unknown
//! unit rather than a malformed string.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static MEMORY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z]*)\s*$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemorySizeError {
    #[error("Invalid memory size format: {0:?}")]
    InvalidFormat(String),
    #[error("Unknown memory unit in {0:?}")]
    UnknownUnit(String),
}

/// Parses a memory-size string into a byte count, truncating fractional
/// bytes toward zero (matching the source's `int(value * 1024**power)`
/// semantics rather than rounding).
pub fn parse_memory_size(input: &str) -> Result<u64, MemorySizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MemorySizeError::InvalidFormat(input.to_string()));
    }

    let caps = MEMORY_PATTERN
        .captures(trimmed)
        .ok_or_else(|| MemorySizeError::InvalidFormat(input.to_string()))?;

    let number_str = &caps[1];
    let unit = caps[2].to_ascii_lowercase();

    let value: f64 = number_str
        .parse()
        .map_err(|_| MemorySizeError::InvalidFormat(input.to_string()))?;

    let power: u32 = match unit.as_str() {
        "" | "b" => 0,
        "k" | "kb" => 1,
        "m" | "mb" => 2,
        "g" | "gb" => 3,
        "t" | "tb" => 4,
        _ => return Err(MemorySizeError::UnknownUnit(input.to_string())),
    };

    let multiplier = 1024f64.powi(power as i32);
    Ok((value * multiplier) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_without_unit() {
        assert_eq!(parse_memory_size("100").unwrap(), 100);
        assert_eq!(parse_memory_size("1000").unwrap(), 1000);
    }

    #[test]
    fn bytes_with_explicit_unit() {
        assert_eq!(parse_memory_size("100b").unwrap(), 100);
        assert_eq!(parse_memory_size("100B").unwrap(), 100);
    }

    #[test]
    fn powers_of_1024_case_insensitive_with_trailing_b() {
        assert_eq!(parse_memory_size("1k").unwrap(), 1024);
        assert_eq!(parse_memory_size("1K").unwrap(), 1024);
        assert_eq!(parse_memory_size("1kb").unwrap(), 1024);
        assert_eq!(parse_memory_size("1KB").unwrap(), 1024);
        assert_eq!(parse_memory_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_memory_size("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_size("1t").unwrap(), 1024u64.pow(4));
    }

    #[test]
    fn decimal_values_truncate() {
        assert_eq!(parse_memory_size("1.5k").unwrap(), (1.5 * 1024.0) as u64);
        assert_eq!(parse_memory_size("0.5g").unwrap(), (0.5 * 1073741824.0) as u64);
    }

    #[test]
    fn whitespace_is_tolerated() {
        assert_eq!(parse_memory_size("1 k").unwrap(), 1024);
        assert_eq!(parse_memory_size("  1k  ").unwrap(), 1024);
    }

    #[test]
    fn zero_edge_cases() {
        assert_eq!(parse_memory_size("0").unwrap(), 0);
        assert_eq!(parse_memory_size("0.0").unwrap(), 0);
        assert_eq!(parse_memory_size("0.0k").unwrap(), 0);
    }

    #[test]
    fn invalid_format_errors() {
        assert!(matches!(parse_memory_size("abc"), Err(MemorySizeError::InvalidFormat(_))));
        assert!(matches!(parse_memory_size("1.2.3k"), Err(MemorySizeError::InvalidFormat(_))));
        assert!(matches!(parse_memory_size(""), Err(MemorySizeError::InvalidFormat(_))));
    }

    #[test]
    fn unknown_unit_errors() {
        assert!(matches!(parse_memory_size("100x"), Err(MemorySizeError::UnknownUnit(_))));
        assert!(matches!(parse_memory_size("100pb"), Err(MemorySizeError::UnknownUnit(_))));
    }

    #[test]
    fn round_trips_canonical_strings() {
        for (canonical, expected) in [
            ("1b", 1u64),
            ("1k", 1024),
            ("4m", 4 * 1024 * 1024),
            ("2g", 2 * 1024 * 1024 * 1024),
        ] {
            assert_eq!(parse_memory_size(canonical).unwrap(), expected);
        }
    }
}
