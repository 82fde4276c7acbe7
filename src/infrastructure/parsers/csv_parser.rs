use csv::ReaderBuilder;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info, warn};
use crate::domain::{
    error::AuditError,
    models::{ParsedCsv, Row},
};

const SNIFF_CANDIDATES: &[u8] = b";,\t|";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Delimiter {
    /// Pick the candidate occurring most often in the header line.
    #[default]
    Auto,
    Fixed(u8),
}

impl Delimiter {
    pub fn resolve(&self, text: &str) -> u8 {
        match self {
            Delimiter::Fixed(byte) => *byte,
            Delimiter::Auto => sniff_delimiter(text),
        }
    }
}

impl FromStr for Delimiter {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Delimiter::Auto),
            "," | "comma" => Ok(Delimiter::Fixed(b',')),
            ";" | "semicolon" => Ok(Delimiter::Fixed(b';')),
            "\t" | "tab" => Ok(Delimiter::Fixed(b'\t')),
            "|" | "pipe" => Ok(Delimiter::Fixed(b'|')),
            other => Err(AuditError::Config(format!("unsupported delimiter '{}'", other))),
        }
    }
}

impl TryFrom<String> for Delimiter {
    type Error = AuditError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delimiter::Auto => write!(f, "auto"),
            Delimiter::Fixed(b'\t') => write!(f, "tab"),
            Delimiter::Fixed(byte) => write!(f, "{}", *byte as char),
        }
    }
}

/// What to do with a record the tokenizer rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    #[default]
    Skip,
    Abort,
    /// Like `Skip`, and rows whose sensor value has no numeric prefix are dropped before labeling.
    #[serde(rename = "drop-unparsable")]
    DropUnparsable,
}

impl RowPolicy {
    pub fn drops_unparsable(&self) -> bool {
        matches!(self, RowPolicy::DropUnparsable)
    }
}

impl FromStr for RowPolicy {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(RowPolicy::Skip),
            "abort" => Ok(RowPolicy::Abort),
            "drop-unparsable" | "drop_unparsable" => Ok(RowPolicy::DropUnparsable),
            other => Err(AuditError::Config(format!("unsupported row policy '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: Delimiter,
    pub row_policy: RowPolicy,
}

pub fn sniff_delimiter(text: &str) -> u8 {
    let header_line = text.lines().find(|line| !line.trim().is_empty()).unwrap_or("");
    let mut best = (b',', 0);
    for &candidate in SNIFF_CANDIDATES {
        let count = header_line.bytes().filter(|&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    debug!("Sniffed delimiter {:?} ({} occurrences in header)", best.0 as char, best.1);
    best.0
}

pub fn parse_csv(text: &str, options: &CsvOptions) -> Result<ParsedCsv, AuditError> {
    let delimiter = options.delimiter.resolve(text);
    debug!("Creating CSV reader with headers enabled, delimiter {:?}", delimiter as char);
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| {
            error!("Failed to read CSV headers: {}", e);
            AuditError::Parse(e.to_string())
        })?
        .iter()
        .map(str::to_string)
        .collect();

    debug!("CSV headers: {:?}", headers);
    info!("Found {} columns in CSV", headers.len());

    let mut rows = Vec::new();
    let mut skipped_rows = 0;

    for (i, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => match options.row_policy {
                RowPolicy::Skip | RowPolicy::DropUnparsable => {
                    warn!("Skipping malformed CSV record at row {}: {}", i + 1, e);
                    skipped_rows += 1;
                    continue;
                }
                RowPolicy::Abort => {
                    error!("Failed to read CSV record at row {}: {}", i + 1, e);
                    return Err(AuditError::Parse(e.to_string()));
                }
            },
        };

        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(header, field)| (header.clone(), field.to_string()))
            .collect();
        rows.push(Row::new(fields));

        if rows.len() % 1000 == 0 {
            debug!("Processed {} CSV rows", rows.len());
        }
    }

    info!("Parsed {} rows from CSV ({} skipped)", rows.len(), skipped_rows);
    Ok(ParsedCsv {
        headers,
        rows,
        skipped_rows,
    })
}
