use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::debug;
use crate::domain::{
    error::AuditError,
    models::{ratio, ColumnInfo, Reading, Report},
};

pub const STATUS_HEADER: &str = "Estado";
pub const FAULT_MARKER: &str = "FALLA";
const OUTPUT_DELIMITER: u8 = b';';

/// Optional parts of the JSON summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub include_error_readings: bool,
    pub include_message: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_error_readings: true,
            include_message: false,
        }
    }
}

pub fn build_report(column: &ColumnInfo, readings: Vec<Reading>, options: &ReportOptions) -> Report {
    let errors = readings.iter().filter(|r| r.has_error).count();
    let total = readings.len();
    let error_readings = options
        .include_error_readings
        .then(|| readings.iter().filter(|r| r.has_error).cloned().collect());
    let message = options.include_message.then(|| records_found_message(total));

    debug!("Report summary: {} readings, {} errors", total, errors);
    Report {
        sensor_type: column.sensor_type,
        total_readings: total,
        errors,
        error_rate: format_error_rate(errors, total),
        data: readings,
        error_readings,
        message,
    }
}

/// `"<n> registros encontrados."`, the record count line shown by upload clients.
pub fn records_found_message(total: usize) -> String {
    format!("{} registros encontrados.", total)
}

/// Percentage with two decimals, e.g. `"4.17%"`.
pub fn format_error_rate(errors: usize, total: usize) -> String {
    format!("{:.2}%", ratio(errors, total) * 100.0)
}

/// Copies the original rows with a status column right after the sensor column.
pub fn render_csv(headers: &[String], column: &ColumnInfo, readings: &[Reading]) -> Result<String, AuditError> {
    let status_at = column.index + 1;
    let mut writer = WriterBuilder::new()
        .delimiter(OUTPUT_DELIMITER)
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    let mut header_record: Vec<&str> = headers.iter().map(String::as_str).collect();
    header_record.insert(status_at.min(header_record.len()), STATUS_HEADER);
    writer.write_record(&header_record)?;

    for reading in readings {
        let mut fields: Vec<&str> = reading
            .original_row
            .as_ref()
            .map(|row| row.values().collect())
            .unwrap_or_default();
        let status = if reading.has_error { FAULT_MARKER } else { "" };
        fields.insert(status_at.min(fields.len()), status);
        writer.write_record(&fields)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AuditError::Internal(format!("failed to flush CSV report: {}", e)))?;
    let mut text = String::from_utf8(bytes)
        .map_err(|e| AuditError::Internal(format!("CSV report is not UTF-8: {}", e)))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Row, SensorType};

    fn column() -> ColumnInfo {
        ColumnInfo {
            column: "Temperatura_C".to_string(),
            index: 1,
            sensor_type: SensorType::Temperature,
        }
    }

    fn headers() -> Vec<String> {
        vec!["Fecha".to_string(), "Temperatura_C".to_string(), "Sensor".to_string()]
    }

    fn reading(ts: &str, raw: &str, value: Option<f64>, has_error: bool) -> Reading {
        Reading {
            timestamp: ts.to_string(),
            original_value: raw.to_string(),
            value,
            has_error,
            original_row: Some(Row::new(vec![
                ("Fecha".to_string(), ts.to_string()),
                ("Temperatura_C".to_string(), raw.to_string()),
                ("Sensor".to_string(), "S1".to_string()),
            ])),
        }
    }

    #[test]
    fn summary_counts_and_rate() {
        let readings = vec![
            reading("t1", "20", Some(20.0), false),
            reading("t2", "x", None, true),
            reading("t3", "21", Some(21.0), false),
        ];
        let report = build_report(&column(), readings, &ReportOptions::default());
        assert_eq!(report.sensor_type, SensorType::Temperature);
        assert_eq!(report.total_readings, 3);
        assert_eq!(report.errors, 1);
        assert_eq!(report.error_rate, "33.33%");
        assert_eq!(report.data.len(), 3);
        let error_readings = report.error_readings.unwrap();
        assert_eq!(error_readings.len(), 1);
        assert_eq!(error_readings[0].timestamp, "t2");
    }

    #[test]
    fn error_readings_can_be_left_out() {
        let options = ReportOptions {
            include_error_readings: false,
            include_message: false,
        };
        let report = build_report(&column(), vec![reading("t1", "x", None, true)], &options);
        assert!(report.error_readings.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("errorReadings").is_none());
        assert!(json.get("message").is_none());
        assert_eq!(json["errorRate"], "100.00%");
        assert_eq!(json["sensorType"], "temperatura");
    }

    #[test]
    fn record_count_message_when_enabled() {
        let options = ReportOptions {
            include_error_readings: true,
            include_message: true,
        };
        let readings = vec![
            reading("t1", "20", Some(20.0), false),
            reading("t2", "21", Some(21.0), false),
        ];
        let report = build_report(&column(), readings, &options);
        assert_eq!(report.message.as_deref(), Some("2 registros encontrados."));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["message"], "2 registros encontrados.");
    }

    #[test]
    fn error_rate_formatting() {
        assert_eq!(format_error_rate(0, 0), "0.00%");
        assert_eq!(format_error_rate(0, 10), "0.00%");
        assert_eq!(format_error_rate(1, 24), "4.17%");
        assert_eq!(format_error_rate(10, 10), "100.00%");
    }

    #[test]
    fn status_column_follows_sensor_column() {
        let readings = vec![
            reading("t1", "20,5", Some(20.5), false),
            reading("t2", "ERR", None, true),
        ];
        let csv = render_csv(&headers(), &column(), &readings).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines, vec![
            "Fecha;Temperatura_C;Estado;Sensor",
            "t1;20,5;;S1",
            "t2;ERR;FALLA;S1",
        ]);
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn status_column_can_be_last() {
        let headers = vec!["Fecha".to_string(), "Humedad_%".to_string()];
        let column = ColumnInfo {
            column: "Humedad_%".to_string(),
            index: 1,
            sensor_type: SensorType::Humidity,
        };
        let row = Row::new(vec![
            ("Fecha".to_string(), "t1".to_string()),
            ("Humedad_%".to_string(), "55".to_string()),
        ]);
        let readings = vec![Reading {
            timestamp: "t1".to_string(),
            original_value: "55".to_string(),
            value: Some(55.0),
            has_error: true,
            original_row: Some(row),
        }];
        let csv = render_csv(&headers, &column, &readings).unwrap();
        assert_eq!(csv, "Fecha;Humedad_%;Estado\nt1;55;FALLA");
    }

    #[test]
    fn fields_with_delimiter_are_quoted() {
        let mut r = reading("t1", "20", Some(20.0), false);
        r.original_row = Some(Row::new(vec![
            ("Fecha".to_string(), "t1".to_string()),
            ("Temperatura_C".to_string(), "20".to_string()),
            ("Sensor".to_string(), "lab;north".to_string()),
        ]));
        let csv = render_csv(&headers(), &column(), &[r]).unwrap();
        assert_eq!(csv.lines().nth(1), Some("t1;20;;\"lab;north\""));
    }
}
