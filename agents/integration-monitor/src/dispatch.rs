//! Decision dispatcher
//!
//! Runs once per integration per cycle after the record is committed. Decides
//! whether to fail over and which alerts fire, then calls the collaborators.
//! Collaborator errors and stalls are logged here and go no further.

use chrono::{NaiveDate, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::collaborators::{AlertDispatcher, FailoverController};
use crate::config::FailoverPolicy;
use crate::contracts::*;
use crate::error::{CollaboratorError, CollaboratorResult};
use crate::telemetry::MonitorMetricsRegistry;

/// What fired for one integration in one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// The failover controller was invoked
    pub failover_triggered: bool,
    /// Severities of the alerts raised, in evaluation order
    pub alerts: Vec<AlertSeverity>,
}

/// Alert conditions met by a record
///
/// Each condition is independent; any subset may fire together.
pub fn evaluate_alerts(integration: &IntegrationConfig, record: &IntegrationHealth) -> Vec<Alert> {
    let thresholds = &integration.thresholds;
    let mut alerts = Vec::new();

    if record.status == HealthStatus::Unhealthy {
        alerts.push(
            Alert::new(
                AlertSeverity::Critical,
                &record.name,
                format!("Integration {} is unhealthy", record.name),
            )
            .with_detail("status", serde_json::json!(record.status))
            .with_detail("health_score", serde_json::json!(record.health_score))
            .with_detail(
                "consecutive_failures",
                serde_json::json!(record.consecutive_failures),
            ),
        );
    }

    if record.response_time > thresholds.response_critical {
        alerts.push(
            Alert::new(
                AlertSeverity::High,
                &record.name,
                format!(
                    "Integration {} response time {:.3}s exceeds {:.3}s",
                    record.name, record.response_time, thresholds.response_critical
                ),
            )
            .with_breach(
                "response_time",
                record.response_time,
                thresholds.response_critical,
            ),
        );
    }

    if record.error_rate > thresholds.error_rate_critical {
        alerts.push(
            Alert::new(
                AlertSeverity::High,
                &record.name,
                format!(
                    "Integration {} error rate {:.1}% exceeds {:.1}%",
                    record.name,
                    record.error_rate * 100.0,
                    thresholds.error_rate_critical * 100.0
                ),
            )
            .with_breach("error_rate", record.error_rate, thresholds.error_rate_critical),
        );
    }

    if record.cost_today > integration.cost_alert_threshold {
        alerts.push(
            Alert::new(
                AlertSeverity::Medium,
                &record.name,
                format!(
                    "Integration {} spend ${:.2} exceeds ${:.2}",
                    record.name, record.cost_today, integration.cost_alert_threshold
                ),
            )
            .with_breach("cost_today", record.cost_today, integration.cost_alert_threshold),
        );
    }

    alerts
}

#[derive(Debug)]
struct DailyCounter {
    day: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn today() -> Self {
        Self {
            day: Utc::now().date_naive(),
            count: 0,
        }
    }

    fn roll(&mut self) {
        let today = Utc::now().date_naive();
        if self.day != today {
            self.day = today;
            self.count = 0;
        }
    }
}

pub struct DecisionDispatcher {
    failover: Arc<dyn FailoverController>,
    alerts: Arc<dyn AlertDispatcher>,
    policy: FailoverPolicy,
    call_timeout: Duration,
    failed_over: DashSet<String>,
    active_alerts: DashMap<String, u32>,
    failovers: Mutex<DailyCounter>,
    telemetry: Option<Arc<MonitorMetricsRegistry>>,
}

impl DecisionDispatcher {
    pub fn new(
        failover: Arc<dyn FailoverController>,
        alerts: Arc<dyn AlertDispatcher>,
        policy: FailoverPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            failover,
            alerts,
            policy,
            call_timeout,
            failed_over: DashSet::new(),
            active_alerts: DashMap::new(),
            failovers: Mutex::new(DailyCounter::today()),
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<MonitorMetricsRegistry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Evaluate failover and alert conditions for a committed record
    pub async fn dispatch(
        &self,
        integration: &IntegrationConfig,
        record: &IntegrationHealth,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        if self.should_fail_over(integration, record) {
            outcome.failover_triggered = true;
            self.count_failover(&record.name);

            info!(
                integration = %record.name,
                consecutive_failures = record.consecutive_failures,
                threshold = integration.failover_threshold,
                "Triggering failover"
            );

            let result = self
                .bounded(self.failover.trigger_failover(&record.name, record))
                .await;
            if let Err(e) = result {
                warn!(integration = %record.name, error = %e, "Failover controller failed");
            }
        }

        let alerts = evaluate_alerts(integration, record);
        self.active_alerts
            .insert(record.name.clone(), alerts.len() as u32);

        for alert in &alerts {
            outcome.alerts.push(alert.severity);
            if let Some(telemetry) = &self.telemetry {
                telemetry.monitor().record_alert(alert.severity);
            }

            if let Err(e) = self.bounded(self.alerts.send_alert(alert)).await {
                warn!(
                    integration = %record.name,
                    severity = %alert.severity,
                    error = %e,
                    "Alert dispatch failed"
                );
            }
        }

        outcome
    }

    fn should_fail_over(&self, integration: &IntegrationConfig, record: &IntegrationHealth) -> bool {
        let at_threshold = record.consecutive_failures >= integration.failover_threshold;

        match self.policy {
            FailoverPolicy::EveryCycle => at_threshold,
            FailoverPolicy::OncePerStreak => {
                // a streak below threshold is a new streak
                if !at_threshold {
                    self.failed_over.remove(&record.name);
                    return false;
                }
                self.failed_over.insert(record.name.clone())
            }
        }
    }

    fn count_failover(&self, name: &str) {
        {
            let mut failovers = self.failovers.lock();
            failovers.roll();
            failovers.count += 1;
        }
        if let Some(telemetry) = &self.telemetry {
            telemetry.monitor().record_failover(name);
        }
    }

    async fn bounded<F>(&self, call: F) -> CollaboratorResult<()>
    where
        F: Future<Output = CollaboratorResult<()>>,
    {
        match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(self.call_timeout)),
        }
    }

    /// Alert conditions firing as of each integration's latest record
    pub fn active_alerts(&self) -> u32 {
        self.active_alerts.iter().map(|entry| *entry.value()).sum()
    }

    /// Failovers triggered since UTC midnight
    pub fn failovers_today(&self) -> u32 {
        let mut failovers = self.failovers.lock();
        failovers.roll();
        failovers.count
    }

    /// Drop per-integration state for an integration that left the registry
    pub fn forget(&self, name: &str) {
        self.failed_over.remove(name);
        self.active_alerts.remove(name);
    }
}
