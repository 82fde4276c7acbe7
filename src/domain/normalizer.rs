use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;
use crate::domain::models::{ColumnInfo, Reading, Row};

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "Timestamp", "TIMESTAMP"];

fn leading_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)")
            .expect("leading number pattern is valid")
    })
}

/// Produces one reading per row, in input order.
pub fn normalize_readings(rows: &[Row], column: &ColumnInfo) -> Vec<Reading> {
    let readings: Vec<Reading> = rows.iter().map(|row| normalize_row(row, column)).collect();
    debug!(
        "Normalized {} readings from column '{}', {} without a numeric value",
        readings.len(),
        column.column,
        readings.iter().filter(|r| r.value.is_none()).count()
    );
    readings
}

pub fn normalize_row(row: &Row, column: &ColumnInfo) -> Reading {
    let original_value = row.get(&column.column).unwrap_or_default().to_string();
    let value = parse_decimal(&original_value);
    Reading {
        timestamp: resolve_timestamp(row),
        original_value,
        value,
        has_error: value.is_none(),
        original_row: Some(row.clone()),
    }
}

/// `timestamp`, `Timestamp`, `TIMESTAMP`, then whatever the first column holds.
/// Empty text does not count as a timestamp.
pub fn resolve_timestamp(row: &Row) -> String {
    TIMESTAMP_KEYS
        .iter()
        .filter_map(|key| row.get(key))
        .find(|value| !value.is_empty())
        .or_else(|| row.first_value())
        .unwrap_or_default()
        .to_string()
}

/// Parses the leading number of `raw` after turning its first comma into a dot.
/// Trailing garbage is ignored, so `"21,5 C"` reads as `21.5`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let normalized = raw.replacen(',', ".", 1);
    let candidate = normalized.trim_start();
    let matched = leading_number().find(candidate)?.as_str();
    let unsigned = matched.trim_start_matches(['+', '-']);
    if unsigned == "Infinity" {
        return Some(if matched.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }
    matched.parse::<f64>().ok()
}
