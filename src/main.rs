use sensor_audit::config::ServiceConfig;
use sensor_audit::http_service::HttpService;
use tracing::{info, debug};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env()
            .add_directive("sensor_audit=debug".parse()?)
            .add_directive("hyper=warn".parse()?))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting sensor audit service");
    debug!("Environment variables: SENSOR_AUDIT_CONFIG={}, PORT={}, SENSOR_AUDIT_LABELING_MODE={}",
        std::env::var("SENSOR_AUDIT_CONFIG").unwrap_or_else(|_| "not set".to_string()),
        std::env::var("PORT").unwrap_or_else(|_| "not set".to_string()),
        std::env::var("SENSOR_AUDIT_LABELING_MODE").unwrap_or_else(|_| "not set".to_string())
    );

    let config = ServiceConfig::from_env()?;
    debug!("Loaded configuration: {:?}", config);

    let service = HttpService::new(&config);
    info!("HTTP service initialized successfully");

    service.run().await
}
