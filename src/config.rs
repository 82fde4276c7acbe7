use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info};
use crate::domain::{
    error::AuditError,
    labeler::{NeighborMode, SimulationSettings},
};
use crate::infrastructure::parsers::csv_parser::{CsvOptions, Delimiter, RowPolicy};

pub const CONFIG_FILE_VAR: &str = "SENSOR_AUDIT_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelingMode {
    #[default]
    Deterministic,
    Simulated,
}

impl FromStr for LabelingMode {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deterministic" => Ok(LabelingMode::Deterministic),
            "simulated" => Ok(LabelingMode::Simulated),
            other => Err(AuditError::Config(format!("unsupported labeling mode '{}'", other))),
        }
    }
}

/// How the `/api` route reads its request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Raw,
    #[default]
    Base64,
}

impl FromStr for BodyEncoding {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(BodyEncoding::Raw),
            "base64" => Ok(BodyEncoding::Base64),
            other => Err(AuditError::Config(format!("unsupported body encoding '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LabelingConfig {
    pub mode: LabelingMode,
    pub min_error_rate: f64,
    pub max_error_rate: f64,
    pub neighbor_mode: NeighborMode,
}

impl Default for LabelingConfig {
    fn default() -> Self {
        let simulation = SimulationSettings::default();
        Self {
            mode: LabelingMode::Deterministic,
            min_error_rate: simulation.min_error_rate,
            max_error_rate: simulation.max_error_rate,
            neighbor_mode: simulation.neighbor_mode,
        }
    }
}

impl LabelingConfig {
    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            min_error_rate: self.min_error_rate,
            max_error_rate: self.max_error_rate,
            neighbor_mode: self.neighbor_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub body_encoding: BodyEncoding,
    pub cors_enabled: bool,
    pub max_upload_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            body_encoding: BodyEncoding::Base64,
            cors_enabled: true,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub csv: CsvOptions,
    pub labeling: LabelingConfig,
    pub cache_enabled: bool,
    pub include_error_readings: bool,
    /// Adds `"<n> registros encontrados."` to JSON reports.
    pub include_message: bool,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            csv: CsvOptions::default(),
            labeling: LabelingConfig::default(),
            cache_enabled: true,
            include_error_readings: true,
            include_message: false,
            http: HttpConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, AuditError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Optional YAML file named by `SENSOR_AUDIT_CONFIG`, then per-variable overrides.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuditError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_FILE_VAR) {
            Some(path) => {
                info!("Loading configuration file: {}", path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|e| AuditError::Config(format!("cannot read {}: {}", path, e)))?;
                serde_yaml::from_str(&text)
                    .map_err(|e| AuditError::Config(format!("invalid config file {}: {}", path, e)))?
            }
            None => {
                debug!("No configuration file set, starting from defaults");
                ServiceConfig::default()
            }
        };

        if let Some(host) = lookup("SENSOR_AUDIT_HOST") {
            config.host = host;
        }
        override_with(&lookup, "PORT", &mut config.port)?;
        override_with::<Delimiter, _>(&lookup, "SENSOR_AUDIT_DELIMITER", &mut config.csv.delimiter)?;
        override_with::<RowPolicy, _>(&lookup, "SENSOR_AUDIT_ROW_POLICY", &mut config.csv.row_policy)?;
        override_with(&lookup, "SENSOR_AUDIT_LABELING_MODE", &mut config.labeling.mode)?;
        override_with(&lookup, "SENSOR_AUDIT_MIN_ERROR_RATE", &mut config.labeling.min_error_rate)?;
        override_with(&lookup, "SENSOR_AUDIT_MAX_ERROR_RATE", &mut config.labeling.max_error_rate)?;
        override_with(&lookup, "SENSOR_AUDIT_NEIGHBOR_MODE", &mut config.labeling.neighbor_mode)?;
        override_flag(&lookup, "SENSOR_AUDIT_CACHE_ENABLED", &mut config.cache_enabled)?;
        override_flag(&lookup, "SENSOR_AUDIT_INCLUDE_ERROR_READINGS", &mut config.include_error_readings)?;
        override_flag(&lookup, "SENSOR_AUDIT_INCLUDE_MESSAGE", &mut config.include_message)?;
        override_with(&lookup, "SENSOR_AUDIT_BODY_ENCODING", &mut config.http.body_encoding)?;
        override_flag(&lookup, "SENSOR_AUDIT_CORS_ENABLED", &mut config.http.cors_enabled)?;
        override_with(&lookup, "SENSOR_AUDIT_MAX_UPLOAD_BYTES", &mut config.http.max_upload_bytes)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        let LabelingConfig { min_error_rate: min, max_error_rate: max, .. } = self.labeling;
        if !(0.0..=1.0).contains(&min) || !(0.0..=1.0).contains(&max) || min > max {
            return Err(AuditError::Config(format!(
                "error rate bounds must satisfy 0 <= min <= max <= 1, got [{}, {}]",
                min, max
            )));
        }
        if self.http.max_upload_bytes == 0 {
            return Err(AuditError::Config("max upload size must be positive".to_string()));
        }
        Ok(())
    }
}

fn override_with<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<(), AuditError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| AuditError::Config(format!("invalid {}='{}': {}", key, raw, e)))?;
        debug!("{} overridden from environment", key);
    }
    Ok(())
}

fn override_flag<F>(lookup: &F, key: &str, target: &mut bool) -> Result<(), AuditError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => return Err(AuditError::Config(format!("invalid {}='{}': expected a boolean", key, raw))),
        };
    }
    Ok(())
}
