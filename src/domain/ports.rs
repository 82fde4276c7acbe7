use async_trait::async_trait;
use crate::domain::{
    error::AuditError,
    models::{CachedReport, LabelOutcome, ParsedCsv, Reading},
};

#[async_trait]
pub trait DataParser: Send + Sync {
    async fn parse(&self, text: &str) -> Result<ParsedCsv, AuditError>;
}

/// Assigns the `has_error` flag of every reading.
pub trait FaultLabeler: Send + Sync {
    fn label(&self, readings: &mut [Reading]) -> LabelOutcome;
}

#[async_trait]
pub trait ReportCache: Send + Sync {
    async fn get(&self, digest: &str) -> Option<CachedReport>;
    async fn put(&self, digest: &str, entry: CachedReport);
}
