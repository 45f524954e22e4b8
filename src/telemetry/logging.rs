//! Log subscriber setup
//!
//! Installs a `tracing` subscriber with an optional stderr console layer and
//! an optional daily-rolling file layer (JSON or plain text). Log lines
//! emitted inside a request carry the `correlation_id` field of the
//! enclosing request span.

use crate::error::BizctxError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

/// Crates whose chatter is capped at `warn`
const NOISY_TARGETS: &[&str] = &["tokio", "hyper", "h2", "tonic", "reqwest", "opentelemetry"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f UTC";

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling log files; no file logging when unset
    pub log_dir: Option<PathBuf>,
    /// Log file name prefix
    pub file_prefix: String,
    /// Log level for file output
    pub file_log_level: String,
    /// Log level for console output
    pub console_log_level: String,
    pub console_enabled: bool,
    /// JSON lines instead of plain text in the log file
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_prefix: "bizctx.log".to_string(),
            file_log_level: "info".to_string(),
            console_log_level: "warn".to_string(),
            console_enabled: true,
            json_format: true,
        }
    }
}

impl LoggingConfig {
    /// Apply `BIZCTX_LOG_*` environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub(crate) fn apply_env(&mut self) {
        if let Ok(log_dir) = std::env::var("BIZCTX_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(log_dir));
        }
        if let Ok(level) = std::env::var("BIZCTX_FILE_LOG_LEVEL") {
            self.file_log_level = level;
        }
        if let Ok(level) = std::env::var("BIZCTX_CONSOLE_LOG_LEVEL") {
            self.console_log_level = level;
        }
        if let Ok(enabled) = std::env::var("BIZCTX_CONSOLE_LOGGING") {
            self.console_enabled = enabled.parse().unwrap_or(true);
        }
        if let Ok(json) = std::env::var("BIZCTX_JSON_LOGS") {
            self.json_format = json.parse().unwrap_or(true);
        }
    }
}

/// Guard that must be kept alive for the duration of the application
/// to ensure proper log flushing
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file_logging", &self._file_guard.is_some())
            .finish()
    }
}

/// Level filter with noisy dependency targets capped at `warn`
pub(crate) fn build_filter(level: &str, fallback: &str) -> Result<EnvFilter, BizctxError> {
    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(fallback));
    for target in NOISY_TARGETS {
        let directive = format!("{}=warn", target).parse().map_err(|e| {
            BizctxError::configuration_error(format!("Invalid log directive: {}", e))
        })?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize the global log subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingGuard, BizctxError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir).map_err(|e| {
            BizctxError::configuration_error(format!("Failed to create log directory: {}", e))
        })?;

        let file_appender = tracing_appender::rolling::daily(log_dir, &config.file_prefix);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
        file_guard = Some(guard);

        let file_filter = build_filter(&config.file_log_level, "info")?;
        let base = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(
                TIMESTAMP_FORMAT.to_string(),
            ))
            .with_file(true)
            .with_line_number(true)
            .with_target(true);

        let file_layer = if config.json_format {
            base.json()
                .with_current_span(true)
                .with_span_list(true)
                .with_filter(file_filter)
                .boxed()
        } else {
            base.with_filter(file_filter).boxed()
        };
        layers.push(file_layer);
    }

    if config.console_enabled {
        let console_filter = build_filter(&config.console_log_level, "warn")?;
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_span_events(FmtSpan::NONE)
            .with_target(true)
            .with_filter(console_filter)
            .boxed();
        layers.push(console_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| {
            BizctxError::configuration_error(format!("Failed to install log subscriber: {}", e))
        })?;

    tracing::info!(
        log_dir = ?config.log_dir,
        json_format = config.json_format,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
