use std::sync::Arc;
use tracing::{info, debug, error, warn};
use crate::domain::{
    column::detect_column,
    error::AuditError,
    models::{CachedReport, UploadedFile},
    normalizer::normalize_readings,
    ports::{DataParser, FaultLabeler, ReportCache},
    report::{build_report, render_csv, ReportOptions},
};
use crate::infrastructure::cache::digest::content_digest;

const UTF8_BOM: char = '\u{feff}';

/// Result of auditing one upload.
#[derive(Debug, Clone)]
pub struct AuditOutcome {
    pub digest: String,
    pub entry: CachedReport,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditOptions {
    /// Discard readings without a numeric value before labeling.
    pub drop_unparsable: bool,
    pub report: ReportOptions,
}

pub struct AuditService {
    data_parser: Arc<dyn DataParser>,
    labeler: Arc<dyn FaultLabeler>,
    cache: Option<Arc<dyn ReportCache>>,
    options: AuditOptions,
}

impl AuditService {
    pub fn new(
        data_parser: Arc<dyn DataParser>,
        labeler: Arc<dyn FaultLabeler>,
        cache: Option<Arc<dyn ReportCache>>,
        options: AuditOptions,
    ) -> Self {
        Self {
            data_parser,
            labeler,
            cache,
            options,
        }
    }

    pub async fn process_upload(&self, upload: UploadedFile) -> Result<AuditOutcome, AuditError> {
        let name = upload.file_name.as_deref().unwrap_or("<body>");
        info!("Starting upload processing: {} ({} bytes)", name, upload.bytes.len());

        if upload.bytes.is_empty() {
            warn!("Upload {} carried no content", name);
            return Err(AuditError::MissingPayload);
        }

        // Step 1: Cache lookup
        let digest = content_digest(&upload.bytes);
        debug!("Step 1: Content digest {}", digest);
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.get(&digest).await {
                info!("Serving cached report for {} (digest {})", name, digest);
                return Ok(AuditOutcome {
                    digest,
                    entry,
                    cache_hit: true,
                });
            }
        }

        // Step 2: Decode text
        let text = String::from_utf8_lossy(&upload.bytes);
        let text = text.strip_prefix(UTF8_BOM).unwrap_or(&text);
        debug!("Step 2: Decoded {} characters", text.chars().count());

        // Step 3: Parse CSV
        debug!("Step 3: Parsing CSV content");
        let parsed = self.data_parser.parse(text).await
            .map_err(|e| {
                error!("Failed to parse upload {}: {}", name, e);
                e
            })?;
        info!("Parsed {} rows with {} columns", parsed.rows.len(), parsed.headers.len());
        if parsed.skipped_rows > 0 {
            warn!("{} malformed rows were dropped from {}", parsed.skipped_rows, name);
        }

        if parsed.rows.is_empty() {
            warn!("Upload {} has no data rows", name);
            return Err(AuditError::EmptyDataset);
        }

        // Step 4: Detect sensor column
        debug!("Step 4: Detecting sensor column among {:?}", parsed.headers);
        let column = detect_column(&parsed.headers).ok_or(AuditError::NoSensorColumn)?;
        info!("Using column '{}' as {:?} data", column.column, column.sensor_type);

        // Step 5: Normalize readings
        debug!("Step 5: Normalizing {} rows", parsed.rows.len());
        let mut readings = normalize_readings(&parsed.rows, &column);
        if self.options.drop_unparsable {
            let before = readings.len();
            readings.retain(|r| r.value.is_some());
            info!("Dropped {} unparsable readings, {} remain", before - readings.len(), readings.len());
            if readings.is_empty() {
                warn!("Upload {} has no parsable readings", name);
                return Err(AuditError::EmptyDataset);
            }
        }

        // Step 6: Label faults
        debug!("Step 6: Labeling faults");
        let outcome = self.labeler.label(&mut readings);
        info!(
            "Labeled {} of {} readings as faulty ({:.2}%)",
            outcome.error_count,
            readings.len(),
            outcome.error_rate * 100.0
        );

        // Step 7: Build both report renderings
        debug!("Step 7: Rendering reports");
        let csv = render_csv(&parsed.headers, &column, &readings)
            .map_err(|e| {
                error!("Failed to render CSV report for {}: {}", name, e);
                e
            })?;
        let report = build_report(&column, readings, &self.options.report);
        let entry = CachedReport { report, csv };

        // Step 8: Store in cache
        if let Some(cache) = &self.cache {
            debug!("Step 8: Caching report under digest {}", digest);
            cache.put(&digest, entry.clone()).await;
        }

        info!(
            "✅ Processed upload {} - {} readings, {} errors ({})",
            name, entry.report.total_readings, entry.report.errors, entry.report.error_rate
        );
        Ok(AuditOutcome {
            digest,
            entry,
            cache_hit: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::labeler::{ParseFailureLabeler, SimulatedFaultLabeler, SimulationSettings};
    use crate::domain::models::SensorType;
    use crate::infrastructure::cache::memory::InMemoryReportCache;
    use crate::infrastructure::parser_adapter::ParserAdapter;
    use crate::infrastructure::parsers::csv_parser::CsvOptions;

    const SAMPLE: &str = "Fecha;Temperatura_C;Humedad_%\n\
        2024-01-01 00:00;21,5;40\n\
        2024-01-01 01:00;ERR;41\n\
        2024-01-01 02:00;22,1;42\n\
        2024-01-01 03:00;;43\n";

    fn upload(text: &str) -> UploadedFile {
        UploadedFile {
            file_name: Some("lecturas.csv".to_string()),
            bytes: text.as_bytes().to_vec(),
        }
    }

    fn service(cache: Option<Arc<dyn ReportCache>>) -> AuditService {
        AuditService::new(
            Arc::new(ParserAdapter::new(CsvOptions::default())),
            Arc::new(ParseFailureLabeler),
            cache,
            AuditOptions::default(),
        )
    }

    fn dropping_service(labeler: Arc<dyn FaultLabeler>) -> AuditService {
        AuditService::new(
            Arc::new(ParserAdapter::new(CsvOptions::default())),
            labeler,
            None,
            AuditOptions {
                drop_unparsable: true,
                report: ReportOptions {
                    include_error_readings: true,
                    include_message: true,
                },
            },
        )
    }

    #[tokio::test]
    async fn deterministic_pipeline_end_to_end() {
        let outcome = service(None).process_upload(upload(SAMPLE)).await.unwrap();
        let report = &outcome.entry.report;

        assert!(!outcome.cache_hit);
        assert_eq!(report.sensor_type, SensorType::Temperature);
        assert_eq!(report.total_readings, 4);
        assert_eq!(report.errors, 2);
        assert_eq!(report.error_rate, "50.00%");
        assert_eq!(report.data[0].value, Some(21.5));
        assert_eq!(report.data[0].timestamp, "2024-01-01 00:00");
        assert!(report.data[1].has_error);
        assert_eq!(report.error_readings.as_ref().unwrap().len(), 2);

        let lines: Vec<&str> = outcome.entry.csv.lines().collect();
        assert_eq!(lines[0], "Fecha;Temperatura_C;Estado;Humedad_%");
        assert_eq!(lines[1], "2024-01-01 00:00;21,5;;40");
        assert_eq!(lines[2], "2024-01-01 01:00;ERR;FALLA;41");
    }

    #[tokio::test]
    async fn identical_uploads_hit_the_cache() {
        let cache = Arc::new(InMemoryReportCache::new());
        let service = service(Some(cache.clone()));

        let first = service.process_upload(upload(SAMPLE)).await.unwrap();
        let second = service.process_upload(upload(SAMPLE)).await.unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.entry, second.entry);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn cache_freezes_simulated_labels() {
        let cache: Arc<dyn ReportCache> = Arc::new(InMemoryReportCache::new());
        let service = AuditService::new(
            Arc::new(ParserAdapter::new(CsvOptions::default())),
            Arc::new(SimulatedFaultLabeler::from_entropy(SimulationSettings::default())),
            Some(cache),
            AuditOptions::default(),
        );
        let mut text = String::from("timestamp,Humidity\n");
        for i in 0..200 {
            text.push_str(&format!("t{},{}\n", i, 40 + i % 10));
        }

        let first = service.process_upload(upload(&text)).await.unwrap();
        let second = service.process_upload(upload(&text)).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(first.entry, second.entry);
        assert_eq!(first.entry.report.sensor_type, SensorType::Humidity);
    }

    #[tokio::test]
    async fn different_bytes_miss_the_cache() {
        let cache = Arc::new(InMemoryReportCache::new());
        let service = service(Some(cache.clone()));
        service.process_upload(upload(SAMPLE)).await.unwrap();
        let other = service
            .process_upload(upload(&SAMPLE.replace("21,5", "21,6")))
            .await
            .unwrap();
        assert!(!other.cache_hit);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn header_only_upload_is_an_empty_dataset() {
        let err = service(None)
            .process_upload(upload("Fecha;Temperatura_C\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::EmptyDataset));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn empty_upload_is_missing_payload() {
        let err = service(None).process_upload(upload("")).await.unwrap_err();
        assert!(matches!(err, AuditError::MissingPayload));
    }

    #[tokio::test]
    async fn unknown_columns_fail_closed() {
        let err = service(None)
            .process_upload(upload("Fecha;Presion\nt1;1013\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::NoSensorColumn));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = Arc::new(InMemoryReportCache::new());
        let service = service(Some(cache.clone()));
        let _ = service.process_upload(upload("Fecha;Presion\nt1;1013\n")).await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn byte_order_mark_is_ignored() {
        let text = format!("{}Timestamp,Temperature\nt1,20\n", UTF8_BOM);
        let outcome = service(None).process_upload(upload(&text)).await.unwrap();
        assert_eq!(outcome.entry.report.data[0].timestamp, "t1");
    }

    #[tokio::test]
    async fn unparsable_rows_are_dropped_before_simulated_labeling() {
        let settings = SimulationSettings {
            min_error_rate: 0.0,
            max_error_rate: 0.1,
            ..SimulationSettings::default()
        };
        let service = dropping_service(Arc::new(SimulatedFaultLabeler::from_entropy(settings)));
        let outcome = service
            .process_upload(upload("Fecha;Temperatura_C\nt1;20\nt2;ERR\nt3;21\n"))
            .await
            .unwrap();
        let report = &outcome.entry.report;

        assert_eq!(report.total_readings, 2);
        let values: Vec<Option<f64>> = report.data.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Some(20.0), Some(21.0)]);
        assert_eq!(report.message.as_deref(), Some("2 registros encontrados."));
        assert!(!outcome.entry.csv.contains("ERR"));
        assert_eq!(outcome.entry.csv.lines().count(), 3);
    }

    #[tokio::test]
    async fn dropping_every_row_is_an_empty_dataset() {
        let err = dropping_service(Arc::new(ParseFailureLabeler))
            .process_upload(upload("Fecha;Temperatura_C\nt1;ERR\nt2;\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::EmptyDataset));
    }

    #[tokio::test]
    async fn unparsable_rows_are_kept_by_default() {
        let outcome = service(None).process_upload(upload(SAMPLE)).await.unwrap();
        assert_eq!(outcome.entry.report.total_readings, 4);
        assert!(outcome.entry.report.message.is_none());
    }
}
