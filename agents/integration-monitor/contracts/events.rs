//! Alerts, broadcast events and engine status
//!
//! Everything the engine emits outward: alerts to the dispatcher, health
//! updates to subscribers and status for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{HealthStatus, IntegrationHealth, MonitoringMetrics};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub id: Uuid,

    /// Alert severity
    pub severity: AlertSeverity,

    /// Integration the alert concerns
    pub integration: String,

    /// Human readable message
    pub message: String,

    /// Metric and threshold detail
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,

    /// Alert timestamp
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        integration: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let integration = integration.into();
        let mut details = HashMap::new();
        details.insert(
            "integration".to_string(),
            serde_json::Value::String(integration.clone()),
        );

        Self {
            id: Uuid::new_v4(),
            severity,
            integration,
            message: message.into(),
            details,
            timestamp: Utc::now(),
        }
    }

    /// Add a detail entry
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Attach the metric/threshold pair that triggered the alert
    pub fn with_breach(self, metric: &str, value: f64, threshold: f64) -> Self {
        self.with_detail("metric", serde_json::json!(metric))
            .with_detail("value", serde_json::json!(value))
            .with_detail("threshold", serde_json::json!(threshold))
    }
}

/// Events pushed to real-time subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Full state after a cycle
    HealthUpdate {
        timestamp: DateTime<Utc>,
        integrations: BTreeMap<String, IntegrationHealth>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metrics: Option<MonitoringMetrics>,
    },
}

/// Lifecycle state of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Running,
    Stopping,
}

/// Engine performance stats exposed by the status API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Whether the cycle loop is running
    pub running: bool,

    /// Lifecycle state
    pub state: MonitorState,

    /// Seconds since the loop was started
    pub uptime_seconds: u64,

    /// Checks performed across all cycles
    pub total_checks: u64,

    /// Completed cycles
    pub cycle_count: u64,

    /// Cycles skipped because the registry could not be read
    pub failed_cycles: u64,

    /// Mean checks per completed cycle
    pub checks_per_cycle: f64,

    /// Mean cycle duration in milliseconds
    pub avg_cycle_duration_ms: f64,

    /// Integrations in the state store
    pub integrations_monitored: usize,

    /// Completion time of the last cycle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
}

/// Summary of one completed cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    /// Cycle sequence number
    pub cycle: u64,

    /// Cycle start timestamp
    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds
    pub duration_ms: u64,

    /// Integrations probed
    pub integrations_checked: usize,

    /// Resulting status per integration
    pub statuses: BTreeMap<String, HealthStatus>,

    /// Integrations a failover was triggered for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failovers: Vec<String>,

    /// Alerts raised during the cycle
    pub alerts_raised: usize,

    /// Whether the metrics aggregate was recomputed
    pub metrics_refreshed: bool,

    /// Whether a health update was delivered to subscribers
    pub broadcast: bool,
}

impl CycleReport {
    /// Count of integrations in the given status
    pub fn count(&self, status: HealthStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }
}
