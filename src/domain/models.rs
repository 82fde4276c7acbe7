use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::str::FromStr;

use crate::domain::error::AuditError;

/// One CSV data line, keyed by header name in header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value.as_str())
    }

    pub fn first_value(&self) -> Option<&str> {
        self.fields.first().map(|(_, value)| value.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Headers and rows produced by the CSV parser.
#[derive(Debug, Clone, Default)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorType {
    #[serde(rename = "temperatura")]
    Temperature,
    #[serde(rename = "humedad")]
    Humidity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub column: String,
    pub index: usize,
    pub sensor_type: SensorType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub timestamp: String,
    pub original_value: String,
    pub value: Option<f64>,
    pub has_error: bool,
    #[serde(skip)]
    pub original_row: Option<Row>,
}

/// What a labeling pass decided, measured on the realized fault set.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LabelOutcome {
    pub error_count: usize,
    pub error_rate: f64,
    /// Target count drawn by the simulated labeler; equals `error_count` for the deterministic one.
    pub requested_count: usize,
    /// Indices marked by contiguous clusters before isolated faults were added.
    pub cluster_marked: usize,
}

impl LabelOutcome {
    pub fn from_count(error_count: usize, total: usize) -> Self {
        Self {
            error_count,
            error_rate: ratio(error_count, total),
            requested_count: error_count,
            cluster_marked: 0,
        }
    }
}

pub(crate) fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub sensor_type: SensorType,
    pub total_readings: usize,
    pub errors: usize,
    pub error_rate: String,
    pub data: Vec<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_readings: Option<Vec<Reading>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Both renderings of one processed upload, as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedReport {
    pub report: Report,
    pub csv: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ReportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(AuditError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// An upload after transport decoding.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        Row::new(vec![
            ("Fecha".to_string(), "2024-01-01".to_string()),
            ("Temperatura_C".to_string(), "21,5".to_string()),
        ])
    }

    #[test]
    fn row_lookup_is_exact() {
        let row = row();
        assert_eq!(row.get("Temperatura_C"), Some("21,5"));
        assert_eq!(row.get("temperatura_c"), None);
        assert_eq!(row.first_value(), Some("2024-01-01"));
        assert_eq!(row.values().collect::<Vec<_>>(), vec!["2024-01-01", "21,5"]);
    }

    #[test]
    fn row_serializes_in_header_order() {
        let json = serde_json::to_string(&row()).unwrap();
        assert_eq!(json, r#"{"Fecha":"2024-01-01","Temperatura_C":"21,5"}"#);
    }

    #[test]
    fn reading_serializes_with_client_field_names() {
        let reading = Reading {
            timestamp: "t0".to_string(),
            original_value: "abc".to_string(),
            value: None,
            has_error: true,
            original_row: Some(row()),
        };
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "timestamp": "t0",
                "originalValue": "abc",
                "value": null,
                "hasError": true
            })
        );
    }

    #[test]
    fn sensor_type_uses_wire_names() {
        assert_eq!(serde_json::to_string(&SensorType::Temperature).unwrap(), "\"temperatura\"");
        assert_eq!(serde_json::to_string(&SensorType::Humidity).unwrap(), "\"humedad\"");
    }

    #[test]
    fn report_format_parsing() {
        assert_eq!("".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("csv".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert!(matches!(
            "xml".parse::<ReportFormat>(),
            Err(AuditError::UnsupportedFormat(f)) if f == "xml"
        ));
    }

    #[test]
    fn ratio_handles_empty_total() {
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(ratio(1, 4), 0.25);
    }
}
