//! Error types for the Integration Monitor
//!
//! Setup and registry failures propagate to the caller. Probe and collaborator
//! failures are recovered inside the cycle and only surface in logs.

use std::time::Duration;
use thiserror::Error;

use crate::contracts::ProbeKind;
use crate::telemetry::TelemetryError;

/// Main error type for monitor operations
#[derive(Error, Debug)]
pub enum MonitorError {
    /// `start()` called while the loop is running or stopping
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// `stop()` called while idle
    #[error("Monitor is not running")]
    NotRunning,

    /// Registry could not supply the active integration set
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid monitor configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Configuration parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Metrics registry error
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl MonitorError {
    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        MonitorError::ConfigError(msg.into())
    }

    /// Lifecycle misuse rather than an operational failure
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(self, MonitorError::AlreadyRunning | MonitorError::NotRunning)
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for MonitorError {
    fn from(err: serde_yaml::Error) -> Self {
        MonitorError::ParseError(format!("YAML error: {}", err))
    }
}

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors raised by an integration registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry parse error: {0}")]
    Parse(String),

    #[error("Invalid registry entry: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

/// Errors raised by a prober when the probe itself could not complete
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("No prober supports {0:?} integrations")]
    Unsupported(ProbeKind),
}

impl ProbeError {
    /// Short machine-readable kind for metadata and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Connection(_) => "connection",
            ProbeError::Http(_) => "http",
            ProbeError::Unsupported(_) => "unsupported",
        }
    }
}

/// Errors raised by failover, alert and persistence collaborators
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        CollaboratorError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        CollaboratorError::Request(err.to_string())
    }
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MonitorError::AlreadyRunning;
        assert_eq!(err.to_string(), "Monitor is already running");

        let err = MonitorError::from(RegistryError::Unavailable("connection refused".to_string()));
        assert_eq!(
            err.to_string(),
            "Registry error: Registry unavailable: connection refused"
        );
    }

    #[test]
    fn test_is_lifecycle_error() {
        assert!(MonitorError::AlreadyRunning.is_lifecycle_error());
        assert!(MonitorError::NotRunning.is_lifecycle_error());
        assert!(!MonitorError::config_error("bad cadence").is_lifecycle_error());
    }

    #[test]
    fn test_probe_error_kind() {
        assert_eq!(ProbeError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(ProbeError::Connection("refused".into()).kind(), "connection");
        assert_eq!(ProbeError::Unsupported(ProbeKind::Custom).kind(), "unsupported");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RegistryError = io.into();
        assert!(matches!(err, RegistryError::Unavailable(_)));
    }
}
