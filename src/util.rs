use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Input date renderings tried in order; a value that parses as none of them
/// passes through verbatim.
pub const DATE_INPUT_FORMATS: &[&str] = &["%d-%b-%y", "%d-%b-%Y", "%d/%m/%Y", "%d-%m-%Y"];

/// Canonical part-code form: separators and whitespace stripped, uppercased.
/// Idempotent by construction.
pub fn normalize_part_code(code: &str) -> String {
    code.chars()
        .filter(|ch| *ch != '-' && !ch.is_whitespace())
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

pub fn reformat_date(value: &str, output_format: &str, upper: bool) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return value.to_string();
    }

    for format in DATE_INPUT_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            let formatted = date.format(output_format).to_string();
            return if upper {
                formatted.to_uppercase()
            } else {
                formatted
            };
        }
    }

    value.to_string()
}

/// Numeric coercion used for quantity comparison: blank or non-numeric values
/// count as zero, decimals truncate.
pub fn coerce_quantity(value: &str) -> i64 {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return 0;
    }

    trimmed.parse::<f64>().map(|v| v as i64).unwrap_or(0)
}

/// Display form of a dataset quantity cell: integers lose their decimal tail,
/// zero and blank collapse to empty, non-numeric values pass through trimmed.
pub fn format_quantity(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed == 0.0 => String::new(),
        Ok(parsed) => (parsed as i64).to_string(),
        Err(_) => trimmed.to_string(),
    }
}

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;

    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file
            .read(&mut buf)
            .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    let mut file = File::create(path)
        .with_context(|| format!("failed to create json file: {}", path.display()))?;
    file.write_all(&data)
        .with_context(|| format!("failed to write json file: {}", path.display()))?;
    file.write_all(b"\n")
        .with_context(|| format!("failed to finalize json file: {}", path.display()))?;

    Ok(())
}
