use tracing::{debug, warn};
use crate::domain::models::{ColumnInfo, SensorType};

const TEMPERATURE_MARKERS: &[&str] = &["Temperatura", "Temperature"];
const TEMPERATURE_EXACT: &str = "Temperatura_C";
const HUMIDITY_MARKERS: &[&str] = &["Humedad", "Humidity"];
const HUMIDITY_EXACT: &str = "Humedad_%";

/// Finds the sensor data column. Temperature wins over humidity whenever both are present.
pub fn detect_column<S: AsRef<str>>(headers: &[S]) -> Option<ColumnInfo> {
    let found = find_matching(headers, TEMPERATURE_MARKERS, TEMPERATURE_EXACT)
        .map(|(index, column)| (index, column, SensorType::Temperature))
        .or_else(|| {
            find_matching(headers, HUMIDITY_MARKERS, HUMIDITY_EXACT)
                .map(|(index, column)| (index, column, SensorType::Humidity))
        });

    match found {
        Some((index, column, sensor_type)) => {
            debug!("Detected {:?} column '{}' at position {}", sensor_type, column, index);
            Some(ColumnInfo {
                column: column.to_string(),
                index,
                sensor_type,
            })
        }
        None => {
            warn!(
                "No sensor column among headers: {:?}",
                headers.iter().map(AsRef::<str>::as_ref).collect::<Vec<_>>()
            );
            None
        }
    }
}

fn find_matching<'a, S: AsRef<str>>(
    headers: &'a [S],
    markers: &[&str],
    exact: &str,
) -> Option<(usize, &'a str)> {
    headers
        .iter()
        .map(AsRef::<str>::as_ref)
        .enumerate()
        .find(|(_, header)| markers.iter().any(|m| header.contains(m)) || *header == exact)
}
