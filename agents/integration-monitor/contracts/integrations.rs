//! Integration configuration and probe results
//!
//! Defines what the registry supplies for each monitored integration and what
//! a prober hands back.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Registry entry for a monitored integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Unique integration name
    pub name: String,

    /// How to reach the integration
    pub probe: ProbeConfig,

    /// Response and error thresholds
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Informational check interval in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Consecutive unhealthy cycles before failover
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,

    /// Daily spend above which a cost alert fires
    #[serde(default = "default_cost_alert_threshold")]
    pub cost_alert_threshold: f64,

    /// Spend estimate used when the probe reports no usage
    #[serde(default)]
    pub cost_model: CostModel,

    /// Disabled entries are not returned as active
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl IntegrationConfig {
    /// Create a config with default thresholds
    pub fn new(name: impl Into<String>, probe: ProbeConfig) -> Self {
        Self {
            name: name.into(),
            probe,
            thresholds: Thresholds::default(),
            check_interval_secs: default_check_interval(),
            failover_threshold: default_failover_threshold(),
            cost_alert_threshold: default_cost_alert_threshold(),
            cost_model: CostModel::default(),
            enabled: true,
        }
    }

    /// HTTP integration preset
    pub fn http(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, ProbeConfig::http(endpoint))
    }

    /// TCP integration preset
    pub fn tcp(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self::new(name, ProbeConfig::tcp(endpoint))
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_failover_threshold(mut self, threshold: u32) -> Self {
        self.failover_threshold = threshold;
        self
    }

    pub fn with_cost_model(mut self, cost_model: CostModel, alert_threshold: f64) -> Self {
        self.cost_model = cost_model;
        self.cost_alert_threshold = alert_threshold;
        self
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

fn default_check_interval() -> u64 {
    30
}

fn default_failover_threshold() -> u32 {
    3
}

fn default_cost_alert_threshold() -> f64 {
    100.0
}

fn default_enabled() -> bool {
    true
}

/// Probe target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probe transport
    pub kind: ProbeKind,

    /// Connection endpoint
    pub endpoint: String,

    /// Custom health check path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,

    /// Probe timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl ProbeConfig {
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self::new(ProbeKind::Http, endpoint)
    }

    pub fn tcp(endpoint: impl Into<String>) -> Self {
        Self::new(ProbeKind::Tcp, endpoint)
    }

    fn new(kind: ProbeKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            health_path: None,
            timeout_secs: default_timeout_secs(),
            headers: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: f64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Timeout as a `Duration`, negative or NaN values collapse to zero
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }
}

fn default_timeout_secs() -> f64 {
    10.0
}

/// Supported probe transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// HTTP(S) GET against a health path
    Http,
    /// Plain TCP connect
    Tcp,
    /// Handled by a caller-supplied prober
    Custom,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Tcp => "tcp",
            Self::Custom => "custom",
        }
    }

    /// Get default health check path
    pub fn default_health_path(&self) -> Option<&'static str> {
        match self {
            Self::Http => Some("/health"),
            _ => None,
        }
    }
}

impl std::str::FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "https" => Ok(Self::Http),
            "tcp" => Ok(Self::Tcp),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown probe kind: {}", other)),
        }
    }
}

/// Per-integration thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Response time (seconds) above which the integration is degraded
    pub response_warning: f64,

    /// Response time (seconds) above which the integration is unhealthy
    pub response_critical: f64,

    /// Error rate above which a HIGH alert fires
    pub error_rate_critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            response_warning: 0.5,
            response_critical: 2.0,
            error_rate_critical: 0.1,
        }
    }
}

impl Thresholds {
    pub fn new(response_warning: f64, response_critical: f64, error_rate_critical: f64) -> Self {
        Self {
            response_warning,
            response_critical,
            error_rate_critical,
        }
    }
}

/// Spend estimate for integrations that do not report usage themselves
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostModel {
    /// No attributable spend
    #[default]
    Free,
    /// Fixed price per check
    PerCheck { usd: f64 },
    /// Flat daily price
    DailyFlat { usd: f64 },
}

impl CostModel {
    /// Estimated spend after `checks_today` checks
    pub fn estimate(&self, checks_today: u64) -> f64 {
        match self {
            Self::Free => 0.0,
            Self::PerCheck { usd } => usd * checks_today as f64,
            Self::DailyFlat { usd } => *usd,
        }
    }
}

/// Raw result of a single probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the probe considers the call successful
    pub success: bool,

    /// Protocol status code, 0 when the transport has none
    pub status_code: u16,

    /// Probe latency in seconds
    pub response_time: f64,

    /// Probe metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Usage gauges reported by the integration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageReport>,
}

impl ProbeOutcome {
    /// Create successful outcome
    pub fn ok(status_code: u16, response_time: f64) -> Self {
        Self {
            success: true,
            status_code,
            response_time,
            metadata: HashMap::new(),
            usage: None,
        }
    }

    /// Create failed outcome
    pub fn failed(status_code: u16, response_time: f64, reason: impl Into<String>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), serde_json::Value::String(reason.into()));
        Self {
            success: false,
            status_code,
            response_time,
            metadata,
            usage: None,
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach usage gauges
    pub fn with_usage(mut self, usage: UsageReport) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Usage gauges reported by an integration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageReport {
    pub cost_today: f64,
    pub rate_limit_usage: f64,
}
