//! Human-readable byte quantities
//!
//! Formatting always uses binary units (`KiB`, `MiB`, ...). Parsing accepts
//! both binary (`KiB`) and decimal (`KB`, `K`) units.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{MetricsError, Result};

const UNITS: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Magnitudes above `THRESHOLD >> shift` would print as `1024.00` of the
/// smaller unit after rounding, so they move up to the next unit.
const THRESHOLD: i64 = 0x0fff_cccc_cccc_cccc;

lazy_static! {
    static ref SIZE_PATTERN: Regex =
        Regex::new(r"^([+-]?[0-9]+(?:\.[0-9]+)?) *([a-zA-Z]+)?$").unwrap();
}

/// Format a byte count using 1024-based units with two decimals.
///
/// # Examples
///
/// ```
/// use metrics_harness::bytesize::format;
///
/// assert_eq!(format(512), "512 B");
/// assert_eq!(format(2048), "2.00 KiB");
/// assert_eq!(format(-1_572_864), "-1.50 MiB");
/// ```
pub fn format(bytes: i64) -> String {
    let magnitude = if bytes == i64::MIN {
        i64::MAX
    } else {
        bytes.abs()
    };
    if magnitude < 1024 {
        return format!("{} B", bytes);
    }

    let mut shift: i32 = 40;
    let mut unit = 0;
    let mut value = magnitude;
    while shift >= 0 && magnitude > THRESHOLD >> shift {
        value >>= 10;
        unit += 1;
        shift -= 10;
    }

    let signed = value * bytes.signum();
    format!("{:.2} {}iB", signed as f64 / 1024.0, UNITS[unit])
}

/// Parse a human-readable size such as `12.34 MiB`, `1 KB`, or `512`.
///
/// A unit whose second letter is `i` is binary (1024-based), any other unit is
/// decimal (1000-based). A bare number is a byte count. The result is rounded
/// half away from zero.
///
/// # Examples
///
/// ```
/// use metrics_harness::bytesize::parse;
///
/// assert_eq!(parse("1 KiB").unwrap(), 1024);
/// assert_eq!(parse("1 KB").unwrap(), 1000);
/// assert_eq!(parse("42").unwrap(), 42);
/// assert!(parse("12 parsecs").is_err());
/// ```
pub fn parse(text: &str) -> Result<i64> {
    let captures = SIZE_PATTERN
        .captures(text)
        .ok_or_else(|| MetricsError::parse(text, "expected '<number> [unit]'"))?;

    let mut value: f64 = captures[1]
        .parse()
        .map_err(|_| MetricsError::parse(text, "invalid number"))?;

    if let Some(unit) = captures.get(2) {
        value *= multiplier(text, unit.as_str())?;
    }

    let rounded = value.round();
    // i64::MAX as f64 is 2^63, so exactly 2^63 still saturates to i64::MAX
    if !rounded.is_finite() || rounded.abs() > i64::MAX as f64 {
        return Err(MetricsError::parse(text, "value out of range"));
    }
    Ok(rounded as i64)
}

fn multiplier(text: &str, unit: &str) -> Result<f64> {
    let unit = unit.to_ascii_uppercase();
    let chars: Vec<char> = unit.chars().collect();

    if unit == "B" {
        return Ok(1.0);
    }

    let index = UNITS
        .iter()
        .position(|c| *c == chars[0])
        .ok_or_else(|| MetricsError::parse(text, format!("unknown unit '{}'", unit)))?;

    let base: f64 = match &chars[1..] {
        [] | ['B'] => 1000.0,
        ['I'] | ['I', 'B'] => 1024.0,
        _ => return Err(MetricsError::parse(text, format!("unknown unit '{}'", unit))),
    };
    Ok(base.powi(index as i32 + 1))
}

/// A byte count that displays and parses in human-readable form.
///
/// Used for configuration values such as `diff_max = "1.5 MiB"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteSize(pub i64);

impl ByteSize {
    pub fn bytes(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format(self.0))
    }
}

impl FromStr for ByteSize {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        parse(s).map(ByteSize)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(self.0))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
