//! Error handling for the bizctx tracing layer
//!
//! Two families of errors live here and they follow opposite propagation
//! rules:
//!
//! - [`BizctxError`] covers the layer's own *setup* operations (loading
//!   configuration, installing a logging subscriber, building an
//!   OpenTelemetry pipeline). These happen once at process start and are
//!   returned to the caller like any other error.
//! - Business failures (entity not found, persistence errors, validation)
//!   belong to the calling service. The tracer only *observes* them through
//!   the [`BusinessFailure`] trait, which describes an error as an
//!   `errorCode` / `errorCategory` pair, and then hands the original error
//!   back unchanged.
//!
//! Failures of the tracing backend itself never surface as errors at all;
//! see [`crate::telemetry::backend::BackendError`].
//!
//! # Describing a business error
//!
//! ```rust
//! use std::borrow::Cow;
//! use bizctx::error::{BusinessFailure, ErrorCategory};
//!
//! #[derive(Debug, thiserror::Error)]
//! enum CardError {
//!     #[error("card {0} not found")]
//!     NotFound(String),
//! }
//!
//! impl BusinessFailure for CardError {
//!     fn error_code(&self) -> Cow<'_, str> {
//!         Cow::Borrowed("CARD_NOT_FOUND")
//!     }
//!
//!     fn error_category(&self) -> ErrorCategory {
//!         ErrorCategory::NotFound
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

/// Main error type for the bizctx library
#[derive(Error, Debug, Clone)]
pub enum BizctxError {
    /// Configuration errors (file parsing, validation, environment)
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Tracing backend could not be constructed
    #[error("Backend error: {message}")]
    BackendError { message: String },

    /// Span export failed during an explicit flush
    #[error("Export error: {message}")]
    ExportError { message: String },
}

impl BizctxError {
    /// Create a simple ConfigurationError
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a simple BackendError
    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    /// Create a simple ExportError
    pub fn export_error(message: impl Into<String>) -> Self {
        Self::ExportError {
            message: message.into(),
        }
    }

    /// Check if this error was caused by caller-provided configuration
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::ConfigurationError { .. })
    }

    /// Check if this error originated in the telemetry pipeline
    pub fn is_telemetry_error(&self) -> bool {
        matches!(self, Self::BackendError { .. } | Self::ExportError { .. })
    }
}

impl From<crate::config::ConfigError> for BizctxError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::configuration_error(err.to_string())
    }
}

impl From<crate::telemetry::exporter::ExportError> for BizctxError {
    fn from(err: crate::telemetry::exporter::ExportError) -> Self {
        Self::export_error(err.to_string())
    }
}

/// Coarse classification of a business failure, attached as `errorCategory`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Requested entity does not exist
    NotFound,
    /// Input failed business validation
    Validation,
    /// Entity already exists or state transition is not allowed
    Conflict,
    /// Storage layer failure
    Persistence,
    /// Downstream service call failed
    Integration,
    /// Anything else
    Internal,
}

impl ErrorCategory {
    /// Attribute value for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Persistence => "persistence",
            Self::Integration => "integration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A business error that can describe itself as span attributes
///
/// Implemented by the error types of traced services so that a failing
/// operation's span carries a stable `errorCode` / `errorCategory` pair.
pub trait BusinessFailure: fmt::Display {
    /// Stable machine-readable code, e.g. `CARD_NOT_FOUND`
    fn error_code(&self) -> Cow<'_, str>;

    /// Coarse category used for dashboards and alerting
    fn error_category(&self) -> ErrorCategory {
        ErrorCategory::Internal
    }
}

impl BusinessFailure for anyhow::Error {
    fn error_code(&self) -> Cow<'_, str> {
        Cow::Borrowed("UNEXPECTED_ERROR")
    }
}

impl BusinessFailure for Box<dyn std::error::Error + Send + Sync> {
    fn error_code(&self) -> Cow<'_, str> {
        Cow::Borrowed("UNEXPECTED_ERROR")
    }
}

impl BusinessFailure for std::io::Error {
    fn error_code(&self) -> Cow<'_, str> {
        match self.kind() {
            std::io::ErrorKind::NotFound => Cow::Borrowed("IO_NOT_FOUND"),
            std::io::ErrorKind::TimedOut => Cow::Borrowed("IO_TIMEOUT"),
            _ => Cow::Borrowed("IO_ERROR"),
        }
    }

    fn error_category(&self) -> ErrorCategory {
        match self.kind() {
            std::io::ErrorKind::NotFound => ErrorCategory::NotFound,
            _ => ErrorCategory::Persistence,
        }
    }
}

impl BusinessFailure for BizctxError {
    fn error_code(&self) -> Cow<'_, str> {
        Cow::Borrowed(match self {
            Self::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            Self::BackendError { .. } => "BACKEND_ERROR",
            Self::ExportError { .. } => "EXPORT_ERROR",
        })
    }

    fn error_category(&self) -> ErrorCategory {
        match self {
            Self::BackendError { .. } | Self::ExportError { .. } => ErrorCategory::Integration,
            _ => ErrorCategory::Internal,
        }
    }
}
