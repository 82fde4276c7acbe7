use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    application::audit_service::{AuditOptions, AuditService},
    config::{BodyEncoding, HttpConfig, LabelingMode, ServiceConfig},
    domain::{
        error::AuditError,
        labeler::{ParseFailureLabeler, SimulatedFaultLabeler},
        models::{ReportFormat, UploadedFile},
        ports::{FaultLabeler, ReportCache},
        report::ReportOptions,
    },
    infrastructure::{cache::memory::InMemoryReportCache, parser_adapter::ParserAdapter},
};

const FILE_FIELD: &str = "file";
const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const CSV_DISPOSITION: &str = "attachment; filename=\"sensor_report.csv\"";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuditService>,
    pub body_encoding: BodyEncoding,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AuditError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected upload: {}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub struct HttpService {
    router: Router,
    address: String,
}

impl HttpService {
    pub fn new(config: &ServiceConfig) -> Self {
        debug!("Initializing HTTP service");

        let parser = Arc::new(ParserAdapter::new(config.csv));
        let labeler: Arc<dyn FaultLabeler> = match config.labeling.mode {
            LabelingMode::Deterministic => {
                info!("Labeling faults from parse failures");
                Arc::new(ParseFailureLabeler)
            }
            LabelingMode::Simulated => {
                let settings = config.labeling.simulation_settings();
                info!(
                    "Labeling faults by simulation: rate [{}, {}], {:?} neighbors",
                    settings.min_error_rate, settings.max_error_rate, settings.neighbor_mode
                );
                Arc::new(SimulatedFaultLabeler::from_entropy(settings))
            }
        };
        let cache: Option<Arc<dyn ReportCache>> = if config.cache_enabled {
            info!("Upload cache enabled");
            Some(Arc::new(InMemoryReportCache::new()))
        } else {
            info!("Upload cache disabled");
            None
        };

        let options = AuditOptions {
            drop_unparsable: config.csv.row_policy.drops_unparsable(),
            report: ReportOptions {
                include_error_readings: config.include_error_readings,
                include_message: config.include_message,
            },
        };
        if options.drop_unparsable {
            info!("Readings without a numeric value are dropped before labeling");
        }
        let service = AuditService::new(parser, labeler, cache, options);
        let state = AppState {
            service: Arc::new(service),
            body_encoding: config.http.body_encoding,
        };
        debug!("HTTP service initialization complete");

        Self {
            router: build_router(state, &config.http),
            address: format!("{}:{}", config.host, config.port),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.address).await
            .map_err(|e| {
                error!("Failed to bind {}: {}", self.address, e);
                e
            })?;
        info!("Listening on http://{}", self.address);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("HTTP service stopped");
        Ok(())
    }
}

pub fn build_router(state: AppState, http: &HttpConfig) -> Router {
    let router = Router::new()
        .route(
            "/upload",
            post(upload_file_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .route(
            "/api",
            post(upload_body_handler)
                .options(preflight_handler)
                .fallback(method_not_allowed_handler),
        )
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(http.max_upload_bytes))
        .layer(middleware::from_fn(trace_request))
        .with_state(state);

    if http.cors_enabled {
        router.layer(middleware::map_response(add_cors_headers))
    } else {
        router
    }
}

/// Handles POST /upload: multipart form with a `file` field.
pub async fn upload_file_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AuditError> {
    let format = requested_format(&query)?;
    let mut multipart = multipart.map_err(|e| AuditError::InvalidPayload(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AuditError::InvalidPayload(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AuditError::InvalidPayload(e.to_string()))?;
        upload = Some(UploadedFile {
            file_name,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or(AuditError::MissingPayload)?;
    respond(&state, upload, format).await
}

/// Handles POST /api: the CSV is the request body, optionally base64-encoded.
pub async fn upload_body_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<Response, AuditError> {
    let format = requested_format(&query)?;
    let bytes = decode_body(&body, state.body_encoding)?;
    respond(
        &state,
        UploadedFile {
            file_name: None,
            bytes,
        },
        format,
    )
    .await
}

async fn respond(state: &AppState, upload: UploadedFile, format: ReportFormat) -> Result<Response, AuditError> {
    let outcome = state.service.process_upload(upload).await?;
    debug!("Responding with {:?} (cache hit: {})", format, outcome.cache_hit);

    let response = match format {
        ReportFormat::Json => Json(outcome.entry.report).into_response(),
        ReportFormat::Csv => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, CSV_CONTENT_TYPE),
                (header::CONTENT_DISPOSITION, CSV_DISPOSITION),
            ],
            outcome.entry.csv,
        )
            .into_response(),
    };
    Ok(response)
}

fn requested_format(query: &HashMap<String, String>) -> Result<ReportFormat, AuditError> {
    query
        .get("format")
        .map(|f| f.parse())
        .transpose()
        .map(Option::unwrap_or_default)
}

pub fn decode_body(body: &[u8], encoding: BodyEncoding) -> Result<Vec<u8>, AuditError> {
    match encoding {
        BodyEncoding::Raw => Ok(body.to_vec()),
        BodyEncoding::Base64 => {
            let compact: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(&compact)
                .map_err(|e| AuditError::InvalidPayload(format!("body is not valid base64: {}", e)))
        }
    }
}

async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed_handler(method: Method) -> Response {
    warn!("Rejected {} request to an upload route", method);
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            error: "Method not allowed. Use POST.".to_string(),
        }),
    )
        .into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn trace_request(request: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %uuid::Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    );
    async move {
        let response = next.run(request).await;
        info!(status = response.status().as_u16(), "request finished");
        response
    }
    .instrument(span)
    .await
}

async fn add_cors_headers(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
