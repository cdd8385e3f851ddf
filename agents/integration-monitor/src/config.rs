//! Monitor configuration
//!
//! Loaded from defaults, `MONITOR_*` environment variables or a YAML/JSON file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MonitorError, Result};

/// When repeated failover calls are made for a persisting failure streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverPolicy {
    /// Invoke the controller on every cycle the streak is at or above threshold
    #[default]
    EveryCycle,
    /// Invoke the controller once per streak, re-armed when the streak resets
    OncePerStreak,
}

impl std::str::FromStr for FailoverPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "every_cycle" => Ok(Self::EveryCycle),
            "once_per_streak" => Ok(Self::OncePerStreak),
            other => Err(format!("unknown failover policy: {}", other)),
        }
    }
}

/// Scheduler and engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Target interval between cycle starts in milliseconds
    pub cadence_ms: u64,

    /// Minimum interval between metrics aggregations in milliseconds
    pub metrics_window_ms: u64,

    /// Maximum probes in flight within one cycle
    pub max_concurrent_probes: usize,

    /// Flat delay used for `next_check` after a probe error, in milliseconds
    pub retry_delay_ms: u64,

    /// Upper bound on any single collaborator call in milliseconds
    pub collaborator_timeout_ms: u64,

    /// Repeat-failover behaviour
    pub failover_policy: FailoverPolicy,

    /// Buffered health updates per subscriber
    pub broadcast_capacity: usize,

    /// Rolling window for `error_rate` in seconds
    pub error_rate_window_secs: u64,

    /// Rolling window for `uptime` in seconds
    pub uptime_window_secs: u64,

    /// Minimum samples kept per integration, raised to cover the longest
    /// rolling window at the configured cadence
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cadence_ms: 30_000,
            metrics_window_ms: 60_000,
            max_concurrent_probes: 32,
            retry_delay_ms: 60_000,
            collaborator_timeout_ms: 10_000,
            failover_policy: FailoverPolicy::EveryCycle,
            broadcast_capacity: 64,
            error_rate_window_secs: 3_600,
            uptime_window_secs: 86_400,
            history_capacity: 2_880,
        }
    }
}

impl MonitorConfig {
    /// Create a new config builder
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::new()
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cadence_ms: env_or("MONITOR_CADENCE_MS", defaults.cadence_ms),
            metrics_window_ms: env_or("MONITOR_METRICS_WINDOW_MS", defaults.metrics_window_ms),
            max_concurrent_probes: env_or(
                "MONITOR_MAX_CONCURRENT_PROBES",
                defaults.max_concurrent_probes,
            ),
            retry_delay_ms: env_or("MONITOR_RETRY_DELAY_MS", defaults.retry_delay_ms),
            collaborator_timeout_ms: env_or(
                "MONITOR_COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout_ms,
            ),
            failover_policy: env_or("MONITOR_FAILOVER_POLICY", defaults.failover_policy),
            broadcast_capacity: env_or("MONITOR_BROADCAST_CAPACITY", defaults.broadcast_capacity),
            error_rate_window_secs: env_or(
                "MONITOR_ERROR_RATE_WINDOW_SECS",
                defaults.error_rate_window_secs,
            ),
            uptime_window_secs: env_or("MONITOR_UPTIME_WINDOW_SECS", defaults.uptime_window_secs),
            history_capacity: env_or("MONITOR_HISTORY_CAPACITY", defaults.history_capacity),
        }
    }

    /// Load config from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cadence_ms == 0 {
            return Err(MonitorError::config_error("cadence_ms must be greater than zero"));
        }
        if self.metrics_window_ms == 0 {
            return Err(MonitorError::config_error(
                "metrics_window_ms must be greater than zero",
            ));
        }
        if self.max_concurrent_probes == 0 {
            return Err(MonitorError::config_error(
                "max_concurrent_probes must be greater than zero",
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(MonitorError::config_error(
                "broadcast_capacity must be greater than zero",
            ));
        }
        if self.error_rate_window_secs == 0 || self.uptime_window_secs == 0 {
            return Err(MonitorError::config_error("rolling windows must be non-empty"));
        }
        if self.history_capacity == 0 {
            return Err(MonitorError::config_error(
                "history_capacity must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_millis(self.cadence_ms)
    }

    pub fn metrics_window(&self) -> Duration {
        Duration::from_millis(self.metrics_window_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }

    pub fn error_rate_window(&self) -> Duration {
        Duration::from_secs(self.error_rate_window_secs)
    }

    pub fn uptime_window(&self) -> Duration {
        Duration::from_secs(self.uptime_window_secs)
    }

    /// Per-integration sample bound for the check history
    ///
    /// One sample is taken per cycle, so the longest window needs
    /// `window / cadence` samples plus the one being recorded.
    pub fn history_samples(&self) -> usize {
        let window_ms = self
            .uptime_window_secs
            .max(self.error_rate_window_secs)
            .saturating_mul(1_000);
        let needed = window_ms.div_ceil(self.cadence_ms.max(1)).saturating_add(1);
        usize::try_from(needed)
            .unwrap_or(usize::MAX)
            .max(self.history_capacity)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Builder for MonitorConfig
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }

    /// Set the cycle cadence
    pub fn cadence(mut self, cadence: Duration) -> Self {
        self.config.cadence_ms = cadence.as_millis() as u64;
        self
    }

    /// Set the metrics aggregation window
    pub fn metrics_window(mut self, window: Duration) -> Self {
        self.config.metrics_window_ms = window.as_millis() as u64;
        self
    }

    /// Set the probe concurrency cap
    pub fn max_concurrent_probes(mut self, max: usize) -> Self {
        self.config.max_concurrent_probes = max;
        self
    }

    /// Set the flat retry delay
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the collaborator call timeout
    pub fn collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.config.collaborator_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the failover policy
    pub fn failover_policy(mut self, policy: FailoverPolicy) -> Self {
        self.config.failover_policy = policy;
        self
    }

    /// Set the broadcast buffer size
    pub fn broadcast_capacity(mut self, capacity: usize) -> Self {
        self.config.broadcast_capacity = capacity;
        self
    }

    /// Set both rolling windows
    pub fn windows(mut self, error_rate: Duration, uptime: Duration) -> Self {
        self.config.error_rate_window_secs = error_rate.as_secs();
        self.config.uptime_window_secs = uptime.as_secs();
        self
    }

    /// Build the configuration
    pub fn build(self) -> MonitorConfig {
        self.config
    }
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.cadence(), Duration::from_secs(30));
        assert_eq!(config.metrics_window(), Duration::from_secs(60));
        assert_eq!(config.retry_delay(), Duration::from_secs(60));
        assert_eq!(config.failover_policy, FailoverPolicy::EveryCycle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = MonitorConfig::builder()
            .cadence(Duration::from_millis(250))
            .metrics_window(Duration::from_secs(5))
            .max_concurrent_probes(4)
            .failover_policy(FailoverPolicy::OncePerStreak)
            .collaborator_timeout(Duration::from_millis(100))
            .build();

        assert_eq!(config.cadence_ms, 250);
        assert_eq!(config.metrics_window_ms, 5_000);
        assert_eq!(config.max_concurrent_probes, 4);
        assert_eq!(config.failover_policy, FailoverPolicy::OncePerStreak);
        assert_eq!(config.collaborator_timeout_ms, 100);
    }

    #[test]
    fn test_history_samples_cover_longest_window() {
        let config = MonitorConfig::builder()
            .cadence(Duration::from_secs(1))
            .windows(Duration::from_secs(3_600), Duration::from_secs(86_400))
            .build();
        assert_eq!(config.history_samples(), 86_401);

        // slow cadence keeps the configured floor
        let config = MonitorConfig::builder()
            .cadence(Duration::from_secs(60))
            .build();
        assert_eq!(config.history_samples(), 2_880);
    }

    #[test]
    fn test_validate_rejects_zero_cadence() {
        let config = MonitorConfig::builder().cadence(Duration::ZERO).build();
        assert!(matches!(config.validate(), Err(MonitorError::ConfigError(_))));
    }

    #[test]
    fn test_from_yaml_file_with_partial_fields() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "cadence_ms: 5000\nfailover_policy: once_per_streak").unwrap();

        let config = MonitorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cadence_ms, 5_000);
        assert_eq!(config.failover_policy, FailoverPolicy::OncePerStreak);
        assert_eq!(config.max_concurrent_probes, 32);
    }

    #[test]
    fn test_failover_policy_from_str() {
        assert_eq!("every_cycle".parse::<FailoverPolicy>(), Ok(FailoverPolicy::EveryCycle));
        assert!("sometimes".parse::<FailoverPolicy>().is_err());
    }
}
