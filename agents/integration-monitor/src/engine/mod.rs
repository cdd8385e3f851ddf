//! Health evaluation engine
//!
//! Turns one probe attempt into one `IntegrationHealth` record. Score and
//! status depend only on the current probe; the failure streak depends on the
//! previous record; the rolling fractions come from the check history.

mod checkers;

pub use checkers::*;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::collaborators::{HealthHistory, Prober};
use crate::config::MonitorConfig;
use crate::contracts::*;
use crate::error::ProbeError;

const RESPONSE_CRITICAL_PENALTY: f64 = 50.0;
const RESPONSE_WARNING_PENALTY: f64 = 20.0;
const SERVER_ERROR_PENALTY: f64 = 40.0;
const CLIENT_ERROR_PENALTY: f64 = 20.0;
const FAILURE_PENALTY: f64 = 30.0;

/// Composite 0-100 score of a single probe result
pub fn health_score(
    success: bool,
    status_code: u16,
    response_time: f64,
    thresholds: &Thresholds,
) -> f64 {
    let mut score = 100.0;

    if response_time > thresholds.response_critical {
        score -= RESPONSE_CRITICAL_PENALTY;
    } else if response_time > thresholds.response_warning {
        score -= RESPONSE_WARNING_PENALTY;
    }

    if status_code >= 500 {
        score -= SERVER_ERROR_PENALTY;
    } else if status_code >= 400 {
        score -= CLIENT_ERROR_PENALTY;
    }

    if !success {
        score -= FAILURE_PENALTY;
    }

    f64::max(0.0, score)
}

/// Status of a single probe result
pub fn classify_status(
    success: bool,
    status_code: u16,
    response_time: f64,
    thresholds: &Thresholds,
) -> HealthStatus {
    if !success || status_code >= 500 || response_time > thresholds.response_critical {
        HealthStatus::Unhealthy
    } else if status_code >= 400 || response_time > thresholds.response_warning {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Failure streak after a result with `status`
pub fn next_failure_streak(previous: Option<&IntegrationHealth>, status: HealthStatus) -> u32 {
    match (status, previous) {
        (HealthStatus::Unhealthy, Some(prev)) if prev.status == HealthStatus::Unhealthy => {
            prev.consecutive_failures.saturating_add(1)
        }
        (HealthStatus::Unhealthy, _) => 1,
        _ => 0,
    }
}

/// Converts probe attempts into health records
pub struct HealthEvaluator {
    history: Arc<dyn HealthHistory>,
    error_rate_window: Duration,
    uptime_window: Duration,
    retry_delay: Duration,
}

impl HealthEvaluator {
    /// Create evaluator over a check history
    pub fn new(history: Arc<dyn HealthHistory>, config: &MonitorConfig) -> Self {
        Self {
            history,
            error_rate_window: config.error_rate_window(),
            uptime_window: config.uptime_window(),
            retry_delay: config.retry_delay(),
        }
    }

    /// Probe one integration and evaluate the result. Never fails.
    pub async fn probe_and_evaluate(
        &self,
        prober: &dyn Prober,
        integration: &IntegrationConfig,
        previous: Option<&IntegrationHealth>,
    ) -> IntegrationHealth {
        let probe_timeout = integration.probe.timeout();
        let start = Instant::now();

        let result = match timeout(probe_timeout, prober.check(integration)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(probe_timeout)),
        };

        match result {
            Ok(outcome) => self.evaluate(integration, outcome, previous),
            Err(error) => {
                tracing::debug!(
                    integration = %integration.name,
                    error = %error,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Probe failed"
                );
                self.evaluate_failure(integration, &error, previous)
            }
        }
    }

    /// Evaluate a completed probe
    pub fn evaluate(
        &self,
        integration: &IntegrationConfig,
        outcome: ProbeOutcome,
        previous: Option<&IntegrationHealth>,
    ) -> IntegrationHealth {
        let now = Utc::now();
        let thresholds = &integration.thresholds;
        let response_time = outcome.response_time.max(0.0);

        let status = classify_status(outcome.success, outcome.status_code, response_time, thresholds);
        let score = health_score(outcome.success, outcome.status_code, response_time, thresholds);
        let failed_now = !status.is_available();

        let error_counts = self
            .history
            .counts_since(&integration.name, window_start(now, self.error_rate_window));
        let uptime_counts = self
            .history
            .counts_since(&integration.name, window_start(now, self.uptime_window));

        let error_rate =
            (error_counts.failed + failed_now as u64) as f64 / (error_counts.total + 1) as f64;
        let uptime =
            (uptime_counts.available() + !failed_now as u64) as f64 / (uptime_counts.total + 1) as f64;

        let (cost_today, rate_limit_usage) = match outcome.usage {
            Some(usage) => (usage.cost_today, usage.rate_limit_usage),
            None => {
                let checks_today = self
                    .history
                    .counts_since(&integration.name, start_of_day(now))
                    .total;
                (integration.cost_model.estimate(checks_today + 1), 0.0)
            }
        };

        let mut metadata = outcome.metadata;
        metadata.insert("status_code".to_string(), serde_json::json!(outcome.status_code));

        IntegrationHealth {
            name: integration.name.clone(),
            status,
            response_time,
            error_rate,
            uptime,
            consecutive_failures: next_failure_streak(previous, status),
            health_score: score,
            cost_today,
            rate_limit_usage,
            last_check: now,
            next_check: now + to_chrono(integration.check_interval()),
            metadata,
        }
    }

    /// Synthesize a record for a probe that could not complete
    pub fn evaluate_failure(
        &self,
        integration: &IntegrationConfig,
        error: &ProbeError,
        previous: Option<&IntegrationHealth>,
    ) -> IntegrationHealth {
        let now = Utc::now();

        let mut metadata = HashMap::new();
        metadata.insert("error".to_string(), serde_json::json!(error.to_string()));
        metadata.insert("error_kind".to_string(), serde_json::json!(error.kind()));

        IntegrationHealth {
            name: integration.name.clone(),
            status: HealthStatus::Unknown,
            response_time: integration.probe.timeout().as_secs_f64(),
            error_rate: 1.0,
            uptime: 0.0,
            consecutive_failures: 1,
            health_score: 0.0,
            cost_today: previous.map_or(0.0, |p| p.cost_today),
            rate_limit_usage: previous.map_or(0.0, |p| p.rate_limit_usage),
            last_check: now,
            next_check: now + to_chrono(self.retry_delay),
            metadata,
        }
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or_else(|_| ChronoDuration::zero())
}

fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now - to_chrono(window)
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}
