//! Human size strings as the daemon reports them ("10.5 GB", "512 MiB").

#![forbid(unsafe_code)]

use once_cell::sync::Lazy;
use regex::Regex;

static SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([A-Za-z]*)\s*$").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SizeParseError {
    #[error("not a size: {0:?}")]
    Malformed(String),
    #[error("unknown size unit {unit:?} in {input:?}")]
    UnknownUnit { input: String, unit: String },
}

fn unit_factor(unit: &str) -> Option<f64> {
    let f = match unit {
        "" | "B" | "b" => 1.0,
        "kB" | "KB" | "k" | "K" => 1e3,
        "MB" | "M" => 1e6,
        "GB" | "G" => 1e9,
        "TB" | "T" => 1e12,
        "PB" | "P" => 1e15,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some(f)
}

/// Parse a daemon size string into bytes. SI suffixes are decimal, IEC binary.
pub fn parse_size(input: &str) -> Result<u64, SizeParseError> {
    let caps = SIZE_RE
        .captures(input)
        .ok_or_else(|| SizeParseError::Malformed(input.to_string()))?;
    let number: f64 = caps[1]
        .parse()
        .map_err(|_| SizeParseError::Malformed(input.to_string()))?;
    let unit = &caps[2];
    let factor = unit_factor(unit).ok_or_else(|| SizeParseError::UnknownUnit {
        input: input.to_string(),
        unit: unit.to_string(),
    })?;
    Ok((number * factor).round() as u64)
}

/// Decimal rendering matching the daemon's own style: "10 GB", "10.5 GB".
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    let mut v = bytes as f64;
    let mut i = 0usize;
    while v >= 1000.0 && i < UNITS.len() - 1 {
        v /= 1000.0;
        i += 1;
    }
    // 999.96 kB prints as 1000 kB otherwise
    if i > 0 && i < UNITS.len() - 1 && (v * 10.0).round() >= 10_000.0 {
        v /= 1000.0;
        i += 1;
    }
    if i == 0 {
        format!("{} B", bytes)
    } else if (v - v.round()).abs() < 0.05 {
        format!("{:.0} {}", v, UNITS[i])
    } else {
        format!("{:.1} {}", v, UNITS[i])
    }
}
