//! Integration tests for the Integration Monitor

use async_trait::async_trait;
use integration_monitor::collaborators::*;
use integration_monitor::contracts::*;
use integration_monitor::error::{CollaboratorError, CollaboratorResult, ProbeError, RegistryError};
use integration_monitor::registry::StaticRegistry;
use integration_monitor::{FailoverPolicy, MonitorConfig, MonitorError, MonitorScheduler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Prober driven by a per-integration script of responses
#[derive(Default)]
struct ScriptedProber {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    in_flight: AtomicUsize,
}

#[derive(Clone)]
enum Step {
    Status(u16),
    Hang,
    Fail,
}

impl ScriptedProber {
    fn script(self, name: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().insert(name.to_string(), steps);
        self
    }

    fn next_step(&self, name: &str) -> Step {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(name) {
            Some(steps) if steps.len() > 1 => steps.remove(0),
            Some(steps) => steps.first().cloned().unwrap_or(Step::Status(200)),
            None => Step::Status(200),
        }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn check(&self, integration: &IntegrationConfig) -> Result<ProbeOutcome, ProbeError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let step = self.next_step(&integration.name);

        let result = match step {
            Step::Status(code) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(ProbeOutcome::ok(code, 0.05))
            }
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(ProbeOutcome::ok(200, 30.0))
            }
            Step::Fail => Err(ProbeError::Connection("connection refused".to_string())),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
struct RecordingFailover {
    calls: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl FailoverController for RecordingFailover {
    async fn trigger_failover(&self, name: &str, record: &IntegrationHealth) -> CollaboratorResult<()> {
        self.calls
            .lock()
            .push((name.to_string(), record.consecutive_failures));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingAlerts {
    alerts: Mutex<Vec<Alert>>,
}

#[async_trait]
impl AlertDispatcher for RecordingAlerts {
    async fn send_alert(&self, alert: &Alert) -> CollaboratorResult<()> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}

struct FailingRecorder;

#[async_trait]
impl HealthRecorder for FailingRecorder {
    async fn record_health_check(&self, _record: &IntegrationHealth) -> CollaboratorResult<()> {
        Err(CollaboratorError::Io("database unavailable".to_string()))
    }
}

/// Registry that checks no probes are in flight when a cycle begins
struct OverlapCheckingRegistry {
    inner: StaticRegistry,
    prober: Arc<ScriptedProber>,
    overlap_seen: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl IntegrationRegistry for OverlapCheckingRegistry {
    async fn get_active_integrations(&self) -> Result<Vec<IntegrationConfig>, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.prober.in_flight.load(Ordering::SeqCst) != 0 {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        self.inner.get_active_integrations().await
    }
}

struct UnavailableRegistry;

#[async_trait]
impl IntegrationRegistry for UnavailableRegistry {
    async fn get_active_integrations(&self) -> Result<Vec<IntegrationConfig>, RegistryError> {
        Err(RegistryError::Unavailable("connection refused".to_string()))
    }
}

fn integration(name: &str) -> IntegrationConfig {
    IntegrationConfig::http(name, format!("http://{}.internal", name))
        .with_thresholds(Thresholds::new(0.5, 2.0, 0.1))
        .with_failover_threshold(3)
}

struct Harness {
    scheduler: MonitorScheduler,
    failover: Arc<RecordingFailover>,
    alerts: Arc<RecordingAlerts>,
}

fn harness(
    integrations: Vec<IntegrationConfig>,
    prober: ScriptedProber,
    config: MonitorConfig,
) -> Harness {
    let failover = Arc::new(RecordingFailover::default());
    let alerts = Arc::new(RecordingAlerts::default());
    let scheduler = MonitorScheduler::builder()
        .config(config)
        .registry(Arc::new(StaticRegistry::new(integrations)))
        .prober(Arc::new(prober))
        .failover(failover.clone())
        .alerts(alerts.clone())
        .build()
        .unwrap();

    Harness {
        scheduler,
        failover,
        alerts,
    }
}

fn fast_config() -> MonitorConfig {
    MonitorConfig::builder()
        .cadence(Duration::from_millis(30))
        .collaborator_timeout(Duration::from_secs(2))
        .build()
}

#[tokio::test]
async fn test_healthy_integration_scores_full() {
    let h = harness(vec![integration("openai")], ScriptedProber::default(), fast_config());

    h.scheduler.run_cycle().await.unwrap();
    let record = h.scheduler.get("openai").unwrap();

    assert_eq!(record.health_score, 100.0);
    assert_eq!(record.status, HealthStatus::Healthy);
    assert_eq!(record.consecutive_failures, 0);
    assert!(h.alerts.alerts.lock().is_empty());
}

#[tokio::test]
async fn test_server_error_is_unhealthy() {
    let prober = ScriptedProber::default().script("openai", vec![Step::Status(503)]);
    let h = harness(vec![integration("openai")], prober, fast_config());

    h.scheduler.run_cycle().await.unwrap();
    let record = h.scheduler.get("openai").unwrap();

    assert_eq!(record.health_score, 60.0);
    assert_eq!(record.status, HealthStatus::Unhealthy);

    let alerts = h.alerts.alerts.lock();
    assert!(alerts
        .iter()
        .any(|a| a.severity == AlertSeverity::Critical && a.integration == "openai"));
}

#[tokio::test]
async fn test_failover_starts_at_threshold_and_repeats() {
    let prober = ScriptedProber::default().script("openai", vec![Step::Status(503)]);
    let h = harness(vec![integration("openai")], prober, fast_config());

    for _ in 0..2 {
        h.scheduler.run_cycle().await.unwrap();
    }
    assert!(h.failover.calls.lock().is_empty());

    let third = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(third.failovers, vec!["openai".to_string()]);

    h.scheduler.run_cycle().await.unwrap();
    assert_eq!(
        *h.failover.calls.lock(),
        vec![("openai".to_string(), 3), ("openai".to_string(), 4)]
    );
}

#[tokio::test]
async fn test_zero_failover_threshold_never_fails_over_healthy_integration() {
    let h = harness(
        vec![integration("svc").with_failover_threshold(0)],
        ScriptedProber::default(),
        fast_config(),
    );

    let err = tokio_test::assert_err!(h.scheduler.run_cycle().await);
    assert!(matches!(err, MonitorError::Registry(RegistryError::Invalid(_))));
    assert!(h.failover.calls.lock().is_empty());
    assert!(h.scheduler.get("svc").is_none());
}

#[tokio::test]
async fn test_failover_once_per_streak() {
    let prober = ScriptedProber::default().script(
        "openai",
        vec![
            Step::Status(503),
            Step::Status(503),
            Step::Status(503),
            Step::Status(503),
            Step::Status(200),
            Step::Status(503),
            Step::Status(503),
            Step::Status(503),
        ],
    );
    let config = MonitorConfig::builder()
        .failover_policy(FailoverPolicy::OncePerStreak)
        .build();
    let h = harness(vec![integration("openai")], prober, config);

    for _ in 0..8 {
        h.scheduler.run_cycle().await.unwrap();
    }

    assert_eq!(
        *h.failover.calls.lock(),
        vec![("openai".to_string(), 3), ("openai".to_string(), 3)]
    );
}

#[tokio::test]
async fn test_probe_timeout_does_not_affect_others() {
    let prober = ScriptedProber::default().script("slow", vec![Step::Hang]);
    let mut slow = integration("slow");
    slow.probe = slow.probe.with_timeout(0.1);
    let h = harness(vec![slow, integration("fast")], prober, fast_config());

    let report = h.scheduler.run_cycle().await.unwrap();
    assert_eq!(report.integrations_checked, 2);

    let slow = h.scheduler.get("slow").unwrap();
    assert_eq!(slow.status, HealthStatus::Unknown);
    assert_eq!(slow.health_score, 0.0);
    assert_eq!(slow.consecutive_failures, 1);
    assert!(slow.error().unwrap().contains("timed out"));

    let fast = h.scheduler.get("fast").unwrap();
    assert_eq!(fast.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_probe_error_does_not_affect_others() {
    let prober = ScriptedProber::default().script("broken", vec![Step::Fail]);
    let h = harness(
        vec![integration("broken"), integration("fine")],
        prober,
        fast_config(),
    );

    h.scheduler.run_cycle().await.unwrap();

    let broken = h.scheduler.get("broken").unwrap();
    assert_eq!(broken.status, HealthStatus::Unknown);
    assert_eq!(broken.error(), Some("Connection failed: connection refused"));
    assert_eq!(h.scheduler.get("fine").unwrap().status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_recovery_resets_streak() {
    let prober = ScriptedProber::default().script(
        "openai",
        vec![Step::Status(503), Step::Status(503), Step::Status(200)],
    );
    let h = harness(vec![integration("openai")], prober, fast_config());

    h.scheduler.run_cycle().await.unwrap();
    h.scheduler.run_cycle().await.unwrap();
    assert_eq!(h.scheduler.get("openai").unwrap().consecutive_failures, 2);

    h.scheduler.run_cycle().await.unwrap();
    let record = h.scheduler.get("openai").unwrap();
    assert_eq!(record.consecutive_failures, 0);
    assert_eq!(record.status, HealthStatus::Healthy);
    // two failures and one success in the window
    assert!((record.error_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!((record.uptime - 1.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_metrics_aggregated_once_per_window() {
    let config = MonitorConfig::builder()
        .metrics_window(Duration::from_secs(3600))
        .build();
    let h = harness(vec![integration("openai")], ScriptedProber::default(), config);

    let first = h.scheduler.run_cycle().await.unwrap();
    assert!(first.metrics_refreshed);
    let stamp = h.scheduler.aggregator().last_aggregated_at();
    assert!(stamp.is_some());

    for _ in 0..3 {
        let report = h.scheduler.run_cycle().await.unwrap();
        assert!(!report.metrics_refreshed);
    }
    assert_eq!(h.scheduler.aggregator().last_aggregated_at(), stamp);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let h = harness(vec![integration("openai")], ScriptedProber::default(), fast_config());

    h.scheduler.start().await.unwrap();
    assert!(matches!(
        h.scheduler.start().await,
        Err(MonitorError::AlreadyRunning)
    ));

    h.scheduler.stop().await.unwrap();
    assert_eq!(h.scheduler.state(), MonitorState::Idle);
}

#[tokio::test]
async fn test_stop_when_idle_is_rejected() {
    let h = harness(vec![integration("openai")], ScriptedProber::default(), fast_config());
    assert!(matches!(
        h.scheduler.stop().await,
        Err(MonitorError::NotRunning)
    ));
}

#[tokio::test]
async fn test_start_with_failing_registry_stays_idle() {
    let scheduler = MonitorScheduler::builder()
        .registry(Arc::new(UnavailableRegistry))
        .prober(Arc::new(ScriptedProber::default()))
        .build()
        .unwrap();

    let err = tokio_test::assert_err!(scheduler.start().await);
    assert!(matches!(err, MonitorError::Registry(RegistryError::Unavailable(_))));
    assert_eq!(scheduler.state(), MonitorState::Idle);
    assert!(!scheduler.status().running);
}

#[tokio::test]
async fn test_cycles_never_overlap() {
    let prober = Arc::new(ScriptedProber::default());
    let registry = Arc::new(OverlapCheckingRegistry {
        inner: StaticRegistry::new((0..10).map(|i| integration(&format!("svc-{}", i))).collect()),
        prober: prober.clone(),
        overlap_seen: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });

    // cadence shorter than a cycle forces back-to-back cycles
    let config = MonitorConfig::builder()
        .cadence(Duration::from_millis(1))
        .max_concurrent_probes(2)
        .build();
    let scheduler = MonitorScheduler::builder()
        .config(config)
        .registry(registry.clone())
        .prober(prober.clone())
        .build()
        .unwrap();

    scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    scheduler.stop().await.unwrap();

    assert!(registry.calls.load(Ordering::SeqCst) >= 2);
    assert!(!registry.overlap_seen.load(Ordering::SeqCst));
    assert_eq!(prober.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_run_cycle_loads_registry_after_previous_cycle() {
    let prober = Arc::new(ScriptedProber::default());
    let registry = Arc::new(OverlapCheckingRegistry {
        inner: StaticRegistry::new((0..5).map(|i| integration(&format!("svc-{}", i))).collect()),
        prober: prober.clone(),
        overlap_seen: AtomicBool::new(false),
        calls: AtomicUsize::new(0),
    });

    let scheduler = MonitorScheduler::builder()
        .config(MonitorConfig::builder().max_concurrent_probes(1).build())
        .registry(registry.clone())
        .prober(prober.clone())
        .build()
        .unwrap();

    let (first, second) = tokio::join!(scheduler.run_cycle(), scheduler.run_cycle());
    tokio_test::assert_ok!(first);
    tokio_test::assert_ok!(second);

    assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    assert!(!registry.overlap_seen.load(Ordering::SeqCst));
    assert_eq!(scheduler.status().cycle_count, 2);
}

#[tokio::test]
async fn test_stop_interrupts_cadence_sleep() {
    let h = harness(
        vec![integration("a"), integration("b")],
        ScriptedProber::default(),
        MonitorConfig::builder()
            .cadence(Duration::from_secs(60))
            .build(),
    );

    h.scheduler.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.scheduler.status().cycle_count == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(5), h.scheduler.stop())
        .await
        .unwrap()
        .unwrap();

    let status = h.scheduler.status();
    assert_eq!(status.state, MonitorState::Idle);
    assert_eq!(status.cycle_count, 1);
    assert_eq!(status.uptime_seconds, 0);
    assert_eq!(h.scheduler.snapshot().len(), 2);
}

#[tokio::test]
async fn test_broadcast_only_with_subscribers() {
    let h = harness(vec![integration("openai")], ScriptedProber::default(), fast_config());

    let report = h.scheduler.run_cycle().await.unwrap();
    assert!(!report.broadcast);

    let mut rx = h.scheduler.subscribe();
    let report = h.scheduler.run_cycle().await.unwrap();
    assert!(report.broadcast);

    let MonitorEvent::HealthUpdate {
        integrations,
        metrics,
        ..
    } = rx.recv().await.unwrap();
    assert_eq!(integrations["openai"].status, HealthStatus::Healthy);
    assert!(metrics.is_some());
}

#[tokio::test]
async fn test_failing_recorder_keeps_record_readable() {
    let scheduler = MonitorScheduler::builder()
        .registry(Arc::new(StaticRegistry::new(vec![integration("openai")])))
        .prober(Arc::new(ScriptedProber::default()))
        .recorder(Arc::new(FailingRecorder))
        .build()
        .unwrap();

    scheduler.run_cycle().await.unwrap();

    assert!(scheduler.get("openai").is_some());
    assert_eq!(scheduler.store().persistence_failures(), 1);
}

#[tokio::test]
async fn test_status_reports_engine_stats() {
    let h = harness(
        vec![integration("a"), integration("b"), integration("c")],
        ScriptedProber::default(),
        fast_config(),
    );

    h.scheduler.run_cycle().await.unwrap();
    h.scheduler.run_cycle().await.unwrap();

    let status = h.scheduler.status();
    assert_eq!(status.cycle_count, 2);
    assert_eq!(status.total_checks, 6);
    assert_eq!(status.checks_per_cycle, 3.0);
    assert_eq!(status.integrations_monitored, 3);
    assert!(status.last_cycle_at.is_some());
}
