use async_trait::async_trait;
use tracing::debug;
use crate::domain::{error::AuditError, models::ParsedCsv, ports::DataParser};
use crate::infrastructure::parsers::csv_parser::{parse_csv, CsvOptions};

pub struct ParserAdapter {
    options: CsvOptions,
}

impl ParserAdapter {
    pub fn new(options: CsvOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl DataParser for ParserAdapter {
    async fn parse(&self, text: &str) -> Result<ParsedCsv, AuditError> {
        debug!(
            "Parsing {} bytes of CSV (delimiter: {}, row policy: {:?})",
            text.len(),
            self.options.delimiter,
            self.options.row_policy
        );
        parse_csv(text, &self.options)
    }
}
