use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no file was uploaded")]
    MissingPayload,

    #[error("invalid upload payload: {0}")]
    InvalidPayload(String),

    #[error("no valid data found in the uploaded file")]
    EmptyDataset,

    #[error("no temperature or humidity column found")]
    NoSensorColumn,

    #[error("unsupported report format: {0}")]
    UnsupportedFormat(String),

    #[error("CSV parse error: {0}")]
    Parse(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AuditError {
    /// Errors caused by what the client sent, as opposed to failures while processing it.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuditError::MissingPayload
                | AuditError::InvalidPayload(_)
                | AuditError::EmptyDataset
                | AuditError::NoSensorColumn
                | AuditError::UnsupportedFormat(_)
        )
    }
}

impl From<csv::Error> for AuditError {
    fn from(e: csv::Error) -> Self {
        AuditError::Parse(e.to_string())
    }
}
