//! Integration Monitor Contracts
//!
//! Data model shared by the engine, the status API and the collaborators.

mod events;
mod integrations;

pub use events::*;
pub use integrations::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Point-in-time health record for a single integration
///
/// Overwritten every cycle. The record is derived from the most recent probe,
/// except for the rolling `error_rate`/`uptime` fractions and the failure streak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationHealth {
    /// Integration name (registry key)
    pub name: String,

    /// Health status
    pub status: HealthStatus,

    /// Most recent probe latency in seconds
    pub response_time: f64,

    /// Fraction of failed checks over the short window (0.0-1.0)
    pub error_rate: f64,

    /// Fraction of available checks over the long window (0.0-1.0)
    pub uptime: f64,

    /// Back-to-back unhealthy cycles
    pub consecutive_failures: u32,

    /// Composite score of the current probe (0.0-100.0)
    pub health_score: f64,

    /// Spend attributed to this integration today
    pub cost_today: f64,

    /// Fraction of the provider rate limit in use
    pub rate_limit_usage: f64,

    /// Record creation timestamp
    pub last_check: DateTime<Utc>,

    /// Informational next check timestamp
    pub next_check: DateTime<Utc>,

    /// Probe metadata, including error text on failure
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl IntegrationHealth {
    /// Whether the integration is currently serving traffic
    pub fn is_available(&self) -> bool {
        self.status.is_available()
    }

    /// Error text carried from a failed probe, if any
    pub fn error(&self) -> Option<&str> {
        self.metadata.get("error").and_then(|v| v.as_str())
    }
}

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Operational with issues
    Degraded,
    /// Not operational
    Unhealthy,
    /// Probe could not complete
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }

    /// Healthy and degraded integrations count toward uptime
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate view over every monitored integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringMetrics {
    /// Integrations in the state store
    pub total_integrations: u32,

    /// Healthy integration count
    pub healthy_count: u32,

    /// Degraded integration count
    pub degraded_count: u32,

    /// Unhealthy integration count
    pub unhealthy_count: u32,

    /// Unknown integration count
    pub unknown_count: u32,

    /// Mean response time in seconds
    pub avg_response_time: f64,

    /// Mean error rate
    pub avg_error_rate: f64,

    /// Mean uptime
    pub avg_uptime: f64,

    /// Alert conditions currently firing
    pub active_alerts: u32,

    /// Failovers triggered since UTC midnight
    pub failovers_today: u32,

    /// Summed spend across integrations
    pub cost_today: f64,

    /// Aggregation timestamp
    pub timestamp: DateTime<Utc>,
}

impl MonitoringMetrics {
    /// Aggregate a set of health records
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a IntegrationHealth>,
        active_alerts: u32,
        failovers_today: u32,
    ) -> Self {
        let records: Vec<&IntegrationHealth> = records.into_iter().collect();
        let total = records.len() as u32;
        let count = |status: HealthStatus| records.iter().filter(|r| r.status == status).count() as u32;

        let mean = |f: fn(&IntegrationHealth) -> f64| {
            if records.is_empty() {
                0.0
            } else {
                records.iter().map(|r| f(r)).sum::<f64>() / records.len() as f64
            }
        };

        Self {
            total_integrations: total,
            healthy_count: count(HealthStatus::Healthy),
            degraded_count: count(HealthStatus::Degraded),
            unhealthy_count: count(HealthStatus::Unhealthy),
            unknown_count: count(HealthStatus::Unknown),
            avg_response_time: mean(|r| r.response_time),
            avg_error_rate: mean(|r| r.error_rate),
            avg_uptime: mean(|r| r.uptime),
            active_alerts,
            failovers_today,
            cost_today: records.iter().map(|r| r.cost_today).sum(),
            timestamp: Utc::now(),
        }
    }

    /// Count for a given status
    pub fn count(&self, status: HealthStatus) -> u32 {
        match status {
            HealthStatus::Healthy => self.healthy_count,
            HealthStatus::Degraded => self.degraded_count,
            HealthStatus::Unhealthy => self.unhealthy_count,
            HealthStatus::Unknown => self.unknown_count,
        }
    }

    /// True when no integration is unhealthy or unknown
    pub fn all_available(&self) -> bool {
        self.unhealthy_count == 0 && self.unknown_count == 0
    }
}
