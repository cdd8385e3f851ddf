//! Collaborator traits
//!
//! The engine only decides. Everything it talks to (the registry, the prober,
//! the failover controller, the alert dispatcher and persistence) sits behind
//! one of these traits and is held as `Arc<dyn …>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::contracts::*;
use crate::error::{CollaboratorResult, ProbeError, RegistryError};

/// Source of the active integration set
#[async_trait]
pub trait IntegrationRegistry: Send + Sync {
    /// Enabled integrations, with unique names
    async fn get_active_integrations(&self) -> Result<Vec<IntegrationConfig>, RegistryError>;
}

/// Performs the network call for one integration
///
/// An `Err` means the probe itself could not complete. Completed probes
/// against a failing integration return `Ok` with `success = false`.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn check(&self, integration: &IntegrationConfig) -> Result<ProbeOutcome, ProbeError>;
}

/// Switches traffic away from a failing integration
///
/// Under `FailoverPolicy::EveryCycle` this is called on every cycle while the
/// failure streak stays at or above threshold, so implementations must be
/// idempotent.
#[async_trait]
pub trait FailoverController: Send + Sync {
    async fn trigger_failover(&self, name: &str, record: &IntegrationHealth)
        -> CollaboratorResult<()>;
}

/// Delivers operator alerts
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send_alert(&self, alert: &Alert) -> CollaboratorResult<()>;
}

/// Metrics store and durable persistence
#[async_trait]
pub trait HealthRecorder: Send + Sync {
    /// Mirror one committed record
    async fn record_health_check(&self, record: &IntegrationHealth) -> CollaboratorResult<()>;

    /// Publish a fresh aggregate
    async fn update_system_metrics(&self, metrics: &MonitoringMetrics) -> CollaboratorResult<()> {
        let _ = metrics;
        Ok(())
    }
}

/// Check counts for one integration over a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowCounts {
    /// Checks recorded in the window
    pub total: u64,
    /// Checks that ended unhealthy or unknown
    pub failed: u64,
}

impl WindowCounts {
    /// Checks that ended healthy or degraded
    pub fn available(&self) -> u64 {
        self.total.saturating_sub(self.failed)
    }
}

/// Read side of the rolling check history
pub trait HealthHistory: Send + Sync {
    fn counts_since(&self, name: &str, since: DateTime<Utc>) -> WindowCounts;
}

/// Alert dispatcher that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertDispatcher;

#[async_trait]
impl AlertDispatcher for LogAlertDispatcher {
    async fn send_alert(&self, alert: &Alert) -> CollaboratorResult<()> {
        warn!(
            alert_id = %alert.id,
            severity = %alert.severity,
            integration = %alert.integration,
            details = ?alert.details,
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// Failover controller that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailoverController;

#[async_trait]
impl FailoverController for LogFailoverController {
    async fn trigger_failover(
        &self,
        name: &str,
        record: &IntegrationHealth,
    ) -> CollaboratorResult<()> {
        info!(
            integration = %name,
            consecutive_failures = record.consecutive_failures,
            status = %record.status,
            "Failover requested"
        );
        Ok(())
    }
}

/// Forwards to several recorders
///
/// Every recorder is called even when an earlier one fails. The first error
/// is returned.
#[derive(Default, Clone)]
pub struct FanoutRecorder {
    recorders: Vec<Arc<dyn HealthRecorder>>,
}

impl FanoutRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, recorder: Arc<dyn HealthRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }

    pub fn push(&mut self, recorder: Arc<dyn HealthRecorder>) {
        self.recorders.push(recorder);
    }

    pub fn len(&self) -> usize {
        self.recorders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorders.is_empty()
    }
}

#[async_trait]
impl HealthRecorder for FanoutRecorder {
    async fn record_health_check(&self, record: &IntegrationHealth) -> CollaboratorResult<()> {
        let mut first_error = None;
        for recorder in &self.recorders {
            if let Err(e) = recorder.record_health_check(record).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn update_system_metrics(&self, metrics: &MonitoringMetrics) -> CollaboratorResult<()> {
        let mut first_error = None;
        for recorder in &self.recorders {
            if let Err(e) = recorder.update_system_metrics(metrics).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRecorder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl HealthRecorder for CountingRecorder {
        async fn record_health_check(&self, _record: &IntegrationHealth) -> CollaboratorResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(CollaboratorError::Io("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn record() -> IntegrationHealth {
        IntegrationHealth {
            name: "payments".to_string(),
            status: HealthStatus::Healthy,
            response_time: 0.1,
            error_rate: 0.0,
            uptime: 1.0,
            consecutive_failures: 0,
            health_score: 100.0,
            cost_today: 0.0,
            rate_limit_usage: 0.0,
            last_check: Utc::now(),
            next_check: Utc::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_fanout_calls_every_recorder_after_failure() {
        let failing = Arc::new(CountingRecorder {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let healthy = Arc::new(CountingRecorder {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let fanout = FanoutRecorder::new()
            .with(failing.clone())
            .with(healthy.clone());

        let result = fanout.record_health_check(&record()).await;

        assert!(matches!(result, Err(CollaboratorError::Io(_))));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_log_collaborators_succeed() {
        let alert = Alert::new(AlertSeverity::High, "payments", "slow");
        tokio_test::assert_ok!(LogAlertDispatcher.send_alert(&alert).await);
        tokio_test::assert_ok!(
            LogFailoverController
                .trigger_failover("payments", &record())
                .await
        );
    }

    #[test]
    fn test_window_counts_available() {
        let counts = WindowCounts { total: 10, failed: 3 };
        assert_eq!(counts.available(), 7);
    }
}
