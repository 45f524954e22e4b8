//! Tracer configuration
//!
//! [`TracerConfig`] is loaded from a TOML or YAML file, then overridden from
//! `BIZCTX_*` and standard `OTEL_*` environment variables, then validated.
//! Every field has a default, so an empty file is a valid configuration.
//!
//! ```toml
//! service_name = "card-service"
//! failure_alert_threshold = 50
//!
//! [backend]
//! type = "otel"
//! endpoint = "http://collector:4317"
//!
//! [logging]
//! log_dir = "/var/log/card-service"
//! ```

use crate::telemetry::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, env, fs, path::Path, time::Duration};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable parsing error: {0}")]
    EnvVarParse(String),
    #[error("File parsing error: {0}")]
    FileParse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level configuration of the tracing layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Reported as `service.name` and `business.service.name`
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    /// When false every span goes to a no-op backend
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Warn every N swallowed backend failures; 0 disables the alert
    #[serde(default = "default_failure_alert_threshold")]
    pub failure_alert_threshold: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which tracing backend to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-process recording backend, exported on flush
    Recording {
        /// Print flushed spans to stdout as OTLP JSON
        #[serde(default)]
        stdout: bool,
    },
    /// OpenTelemetry SDK pipeline
    Otel(OtelConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Recording { stdout: false }
    }
}

/// OTLP transport protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// OpenTelemetry pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtelConfig {
    /// OTLP collector endpoint
    pub endpoint: Option<String>,
    #[serde(default)]
    pub protocol: OtlpProtocol,
    /// Also print spans to stdout
    #[serde(default)]
    pub console_export: bool,
    /// Export timeout in seconds
    #[serde(with = "duration_seconds", default = "default_export_timeout")]
    pub export_timeout: Duration,
    /// Extra resource attributes, e.g. `deployment.environment`
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            protocol: OtlpProtocol::default(),
            console_export: false,
            export_timeout: default_export_timeout(),
            resource_attributes: HashMap::new(),
        }
    }
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_version: default_service_version(),
            enabled: true,
            backend: BackendConfig::default(),
            failure_alert_threshold: default_failure_alert_threshold(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TracerConfig {
    /// Load configuration from a file (supports TOML and YAML)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path.extension().and_then(|s| s.to_str());

        match extension {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            _ => Err(ConfigError::FileParse(
                "Unsupported file format. Use .toml, .yaml or .yml".to_string(),
            )),
        }
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_with_env()
    }

    /// Load a file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (environment takes precedence)
    pub fn merge_with_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(service_name) = env::var("OTEL_SERVICE_NAME") {
            self.service_name = service_name;
        }
        if let Ok(version) = env::var("BIZCTX_SERVICE_VERSION") {
            self.service_version = version;
        }
        if let Ok(enabled) = env::var("BIZCTX_TRACING_ENABLED") {
            self.enabled = enabled.parse().map_err(|e| {
                ConfigError::EnvVarParse(format!("BIZCTX_TRACING_ENABLED: {}", e))
            })?;
        }
        if let Ok(threshold) = env::var("BIZCTX_FAILURE_ALERT_THRESHOLD") {
            self.failure_alert_threshold = threshold.parse().map_err(|e| {
                ConfigError::EnvVarParse(format!("BIZCTX_FAILURE_ALERT_THRESHOLD: {}", e))
            })?;
        }

        // An OTLP endpoint in the environment switches to the OpenTelemetry backend
        if let Ok(endpoint) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            let mut otel = match self.backend {
                BackendConfig::Otel(otel) => otel,
                BackendConfig::Recording { .. } => OtelConfig::default(),
            };
            otel.endpoint = Some(endpoint);
            self.backend = BackendConfig::Otel(otel);
        }
        if let Ok(protocol) = env::var("OTEL_EXPORTER_OTLP_PROTOCOL") {
            if let BackendConfig::Otel(otel) = &mut self.backend {
                otel.protocol = parse_protocol(&protocol)?;
            }
        }
        if let Ok(attrs) = env::var("OTEL_RESOURCE_ATTRIBUTES") {
            if let BackendConfig::Otel(otel) = &mut self.backend {
                otel.resource_attributes.extend(parse_key_value_list(&attrs)?);
            }
        }

        self.logging.apply_env();
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Service name cannot be empty".to_string(),
            ));
        }
        if let BackendConfig::Otel(otel) = &self.backend {
            if otel.endpoint.is_none() && !otel.console_export {
                return Err(ConfigError::Validation(
                    "OpenTelemetry backend needs an endpoint or console_export".to_string(),
                ));
            }
            if let Some(endpoint) = &otel.endpoint {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(ConfigError::Validation(format!(
                        "OTLP endpoint must be an http(s) URL: {}",
                        endpoint
                    )));
                }
            }
            if otel.export_timeout.as_secs() == 0 {
                return Err(ConfigError::Validation(
                    "Export timeout must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_protocol(raw: &str) -> Result<OtlpProtocol, ConfigError> {
    match raw.trim() {
        "grpc" => Ok(OtlpProtocol::Grpc),
        "http/protobuf" | "http/json" | "http" => Ok(OtlpProtocol::Http),
        other => Err(ConfigError::EnvVarParse(format!(
            "OTEL_EXPORTER_OTLP_PROTOCOL: unsupported protocol {}",
            other
        ))),
    }
}

/// Parse `key1=value1,key2=value2`
fn parse_key_value_list(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut pairs = HashMap::new();

    for pair in raw.split(',').filter(|p| !p.trim().is_empty()) {
        match pair.trim().split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                pairs.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(ConfigError::EnvVarParse(format!(
                    "Invalid key=value pair: {}",
                    pair
                )))
            }
        }
    }

    Ok(pairs)
}

/// Custom serialization for Duration as seconds
mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Default value functions for serde
fn default_service_name() -> String {
    "bizctx-service".to_string()
}

fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

fn default_failure_alert_threshold() -> u64 {
    crate::telemetry::recorder::DEFAULT_FAILURE_ALERT_THRESHOLD
}

fn default_export_timeout() -> Duration {
    Duration::from_secs(10)
}
