//! Telemetry for the Integration Monitor
//!
//! Prometheus metrics for cycles, probes and decisions. The registry is
//! exposed over `/metrics` by the status API and fed through
//! `PrometheusRecorder`, which plugs into the recorder fan-out like any other
//! persistence collaborator.

pub mod metrics;

pub use metrics::{CycleTimer, MonitorMetrics, MonitorMetricsRegistry, PrometheusRecorder};

use thiserror::Error;

/// Telemetry errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
