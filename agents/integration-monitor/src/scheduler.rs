//! Monitor scheduler
//!
//! Owns the Idle/Running/Stopping lifecycle and the fixed-cadence loop. One
//! spawned task drives cycles; within a cycle every integration is probed,
//! evaluated, committed and dispatched concurrently, capped by a semaphore.
//! Cycles never overlap: the loop awaits the full fan-out before sleeping and
//! `run_cycle` takes the same cycle lock.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::aggregate::MetricsAggregator;
use crate::broadcast::HealthBroadcaster;
use crate::collaborators::*;
use crate::config::MonitorConfig;
use crate::contracts::*;
use crate::dispatch::{DecisionDispatcher, DispatchOutcome};
use crate::engine::{HealthEvaluator, ProbeRouter};
use crate::error::{MonitorError, RegistryError, Result};
use crate::history::InMemoryHistory;
use crate::store::StateStore;
use crate::telemetry::{MonitorMetricsRegistry, PrometheusRecorder};

#[derive(Debug, Default)]
struct Stats {
    started_at: Option<Instant>,
    total_checks: u64,
    cycle_count: u64,
    failed_cycles: u64,
    total_cycle_ms: f64,
    last_cycle_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Lifecycle {
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<watch::Sender<bool>>,
}

struct Inner {
    config: MonitorConfig,
    registry: Arc<dyn IntegrationRegistry>,
    prober: Arc<dyn Prober>,
    evaluator: HealthEvaluator,
    history: Arc<InMemoryHistory>,
    recorder: Arc<FanoutRecorder>,
    store: StateStore,
    dispatcher: DecisionDispatcher,
    aggregator: MetricsAggregator,
    broadcaster: HealthBroadcaster,
    telemetry: Option<Arc<MonitorMetricsRegistry>>,
    state: RwLock<MonitorState>,
    lifecycle: AsyncMutex<Lifecycle>,
    cycle_lock: AsyncMutex<()>,
    probe_permits: Semaphore,
    stats: Mutex<Stats>,
}

/// Cyclic integration monitor
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct MonitorScheduler {
    inner: Arc<Inner>,
}

impl MonitorScheduler {
    pub fn builder() -> MonitorSchedulerBuilder {
        MonitorSchedulerBuilder::new()
    }

    /// Transition Idle -> Running
    ///
    /// Fails with `AlreadyRunning` unless idle. A registry error during setup
    /// propagates and leaves the engine idle.
    pub async fn start(&self) -> Result<()> {
        if self.state() != MonitorState::Idle {
            return Err(MonitorError::AlreadyRunning);
        }

        let mut lifecycle = self.inner.lifecycle.lock().await;
        if self.state() != MonitorState::Idle {
            return Err(MonitorError::AlreadyRunning);
        }

        let initial = self.inner.fetch_integrations().await?;
        let integration_count = initial.len();

        let (stop_tx, stop_rx) = watch::channel(false);
        *self.inner.state.write() = MonitorState::Running;
        self.inner.stats.lock().started_at = Some(Instant::now());

        let inner = Arc::clone(&self.inner);
        lifecycle.handle = Some(tokio::spawn(inner.run_loop(initial, stop_rx)));
        lifecycle.stop_tx = Some(stop_tx);

        info!(
            integrations = integration_count,
            cadence_ms = self.inner.config.cadence_ms,
            "Integration monitor started"
        );
        Ok(())
    }

    /// Transition Running -> Stopping -> Idle
    ///
    /// An in-flight cycle finishes its probes first. Returns once the loop
    /// has exited.
    pub async fn stop(&self) -> Result<()> {
        let (handle, stop_tx) = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            if self.state() != MonitorState::Running {
                return Err(MonitorError::NotRunning);
            }

            *self.inner.state.write() = MonitorState::Stopping;
            (lifecycle.handle.take(), lifecycle.stop_tx.take())
        };

        if let Some(stop_tx) = &stop_tx {
            let _ = stop_tx.send(true);
        }

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Monitor loop terminated abnormally");
            }
        }

        *self.inner.state.write() = MonitorState::Idle;
        self.inner.stats.lock().started_at = None;
        info!("Integration monitor stopped");
        Ok(())
    }

    /// Run exactly one cycle outside the loop
    ///
    /// Waits for any in-flight cycle to finish first.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _cycle = self.inner.cycle_lock.lock().await;
        let integrations = self.inner.fetch_integrations().await?;
        Ok(self.inner.execute_cycle(integrations).await)
    }

    pub fn state(&self) -> MonitorState {
        *self.inner.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Engine performance stats
    pub fn status(&self) -> MonitorStatus {
        let state = self.state();
        let stats = self.inner.stats.lock();

        let checks_per_cycle = if stats.cycle_count > 0 {
            stats.total_checks as f64 / stats.cycle_count as f64
        } else {
            0.0
        };
        let avg_cycle_duration_ms = if stats.cycle_count > 0 {
            stats.total_cycle_ms / stats.cycle_count as f64
        } else {
            0.0
        };

        MonitorStatus {
            running: state == MonitorState::Running,
            state,
            uptime_seconds: stats.started_at.map_or(0, |t| t.elapsed().as_secs()),
            total_checks: stats.total_checks,
            cycle_count: stats.cycle_count,
            failed_cycles: stats.failed_cycles,
            checks_per_cycle,
            avg_cycle_duration_ms,
            integrations_monitored: self.inner.store.len(),
            last_cycle_at: stats.last_cycle_at,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn snapshot(&self) -> BTreeMap<String, IntegrationHealth> {
        self.inner.store.snapshot()
    }

    pub fn get(&self, name: &str) -> Option<IntegrationHealth> {
        self.inner.store.get(name)
    }

    /// Latest aggregate, or a fresh one when nothing was aggregated yet
    ///
    /// The fresh computation does not reset the aggregation window.
    pub fn metrics(&self) -> MonitoringMetrics {
        self.inner.aggregator.latest().unwrap_or_else(|| {
            MonitoringMetrics::from_records(
                self.inner.store.snapshot().values(),
                self.inner.dispatcher.active_alerts(),
                self.inner.dispatcher.failovers_today(),
            )
        })
    }

    pub fn aggregator(&self) -> &MetricsAggregator {
        &self.inner.aggregator
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MonitorEvent> {
        self.inner.broadcaster.subscribe()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn telemetry(&self) -> Option<Arc<MonitorMetricsRegistry>> {
        self.inner.telemetry.clone()
    }
}

impl Inner {
    async fn run_loop(
        self: Arc<Self>,
        initial: Vec<IntegrationConfig>,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let cadence = self.config.cadence();
        let mut prefetched = Some(initial);

        loop {
            if *stop_rx.borrow() {
                break;
            }

            let cycle_start = Instant::now();
            {
                let _cycle = self.cycle_lock.lock().await;
                let integrations = match prefetched.take() {
                    Some(list) => Ok(list),
                    None => self.fetch_integrations().await,
                };

                match integrations {
                    Ok(list) => {
                        self.execute_cycle(list).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to load integrations, skipping cycle");
                        self.stats.lock().failed_cycles += 1;
                        if let Some(telemetry) = &self.telemetry {
                            telemetry.monitor().record_failed_cycle();
                        }
                    }
                }
            }

            if *stop_rx.borrow() {
                break;
            }

            let elapsed = cycle_start.elapsed();
            if elapsed > cadence {
                warn!(
                    cycle_ms = elapsed.as_millis() as u64,
                    cadence_ms = cadence.as_millis() as u64,
                    "Cycle overran cadence, starting next cycle immediately"
                );
                if let Some(telemetry) = &self.telemetry {
                    telemetry.monitor().record_overrun();
                }
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(cadence - elapsed) => {}
                _ = stop_rx.changed() => {}
            }
        }

        debug!("Monitor loop exited");
    }

    async fn fetch_integrations(&self) -> std::result::Result<Vec<IntegrationConfig>, RegistryError> {
        let limit = self.config.collaborator_timeout();
        match timeout(limit, self.registry.get_active_integrations()).await {
            Ok(result) => result,
            Err(_) => Err(RegistryError::Unavailable(format!(
                "registry timed out after {:?}",
                limit
            ))),
        }
    }

    /// Caller must hold `cycle_lock`
    async fn execute_cycle(&self, integrations: Vec<IntegrationConfig>) -> CycleReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let _timer = self
            .telemetry
            .as_ref()
            .map(|t| t.monitor().start_cycle_timer());

        self.prune(&integrations);

        let results = join_all(
            integrations
                .iter()
                .map(|integration| self.process_integration(integration)),
        )
        .await;

        let mut statuses = BTreeMap::new();
        let mut failovers = Vec::new();
        let mut alerts_raised = 0;
        for (record, outcome) in &results {
            statuses.insert(record.name.clone(), record.status);
            if outcome.failover_triggered {
                failovers.push(record.name.clone());
            }
            alerts_raised += outcome.alerts.len();
        }

        let snapshot = self.store.snapshot();
        let fresh = self.aggregator.maybe_aggregate(
            &snapshot,
            self.dispatcher.active_alerts(),
            self.dispatcher.failovers_today(),
        );
        if let Some(metrics) = &fresh {
            self.publish_metrics(metrics).await;
        }

        let broadcast = self
            .broadcaster
            .publish(snapshot, self.aggregator.latest());

        let duration = start.elapsed();
        let cycle = {
            let mut stats = self.stats.lock();
            stats.cycle_count += 1;
            stats.total_checks += results.len() as u64;
            stats.total_cycle_ms += duration.as_secs_f64() * 1000.0;
            stats.last_cycle_at = Some(Utc::now());
            stats.cycle_count
        };

        debug!(
            cycle,
            integrations = results.len(),
            unhealthy = statuses
                .values()
                .filter(|s| **s == HealthStatus::Unhealthy)
                .count(),
            failovers = failovers.len(),
            alerts = alerts_raised,
            duration_ms = duration.as_millis() as u64,
            "Cycle complete"
        );

        CycleReport {
            cycle,
            started_at,
            duration_ms: duration.as_millis() as u64,
            integrations_checked: results.len(),
            statuses,
            failovers,
            alerts_raised,
            metrics_refreshed: fresh.is_some(),
            broadcast,
        }
    }

    async fn process_integration(
        &self,
        integration: &IntegrationConfig,
    ) -> (IntegrationHealth, DispatchOutcome) {
        let previous = self.store.get(&integration.name);

        let record = {
            let _permit = self.probe_permits.acquire().await.ok();
            self.evaluator
                .probe_and_evaluate(self.prober.as_ref(), integration, previous.as_ref())
                .await
        };

        self.store.commit(record.clone()).await;
        let outcome = self.dispatcher.dispatch(integration, &record).await;
        (record, outcome)
    }

    /// Forget integrations that left the registry
    fn prune(&self, integrations: &[IntegrationConfig]) {
        let registered: HashSet<String> = integrations.iter().map(|i| i.name.clone()).collect();

        for name in self.store.retain_registered(&registered) {
            self.dispatcher.forget(&name);
            self.history.forget(&name);
            if let Some(telemetry) = &self.telemetry {
                telemetry.monitor().remove_integration(&name);
            }
            info!(integration = %name, "Integration removed from registry");
        }
    }

    async fn publish_metrics(&self, metrics: &MonitoringMetrics) {
        let limit = self.config.collaborator_timeout();
        match timeout(limit, self.recorder.update_system_metrics(metrics)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to publish system metrics"),
            Err(_) => warn!(timeout_ms = limit.as_millis() as u64, "System metrics publish timed out"),
        }
    }
}

/// Builder for MonitorScheduler
pub struct MonitorSchedulerBuilder {
    config: MonitorConfig,
    registry: Option<Arc<dyn IntegrationRegistry>>,
    prober: Option<Arc<dyn Prober>>,
    failover: Option<Arc<dyn FailoverController>>,
    alerts: Option<Arc<dyn AlertDispatcher>>,
    recorders: Vec<Arc<dyn HealthRecorder>>,
    telemetry: Option<Arc<MonitorMetricsRegistry>>,
}

impl MonitorSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
            registry: None,
            prober: None,
            failover: None,
            alerts: None,
            recorders: Vec::new(),
            telemetry: None,
        }
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Integration source (required)
    pub fn registry(mut self, registry: Arc<dyn IntegrationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Prober, defaults to `ProbeRouter` with HTTP and TCP handlers
    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Failover controller, defaults to `LogFailoverController`
    pub fn failover(mut self, failover: Arc<dyn FailoverController>) -> Self {
        self.failover = Some(failover);
        self
    }

    /// Alert dispatcher, defaults to `LogAlertDispatcher`
    pub fn alerts(mut self, alerts: Arc<dyn AlertDispatcher>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Add a persistence or metrics recorder
    pub fn recorder(mut self, recorder: Arc<dyn HealthRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }

    /// Export Prometheus metrics to this registry
    pub fn telemetry(mut self, telemetry: Arc<MonitorMetricsRegistry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn build(self) -> Result<MonitorScheduler> {
        self.config.validate()?;
        let config = self.config;

        let registry = self
            .registry
            .ok_or_else(|| MonitorError::config_error("an integration registry is required"))?;
        let prober = self
            .prober
            .unwrap_or_else(|| Arc::new(ProbeRouter::default()));
        let failover = self
            .failover
            .unwrap_or_else(|| Arc::new(LogFailoverController));
        let alerts = self
            .alerts
            .unwrap_or_else(|| Arc::new(LogAlertDispatcher));

        let history = Arc::new(InMemoryHistory::new(
            config.uptime_window(),
            config.history_samples(),
        ));

        // history first so the next evaluation sees this commit
        let mut fanout = FanoutRecorder::new().with(history.clone());
        if let Some(telemetry) = &self.telemetry {
            fanout.push(Arc::new(PrometheusRecorder::new(Arc::clone(telemetry))));
        }
        for recorder in self.recorders {
            fanout.push(recorder);
        }
        let recorder = Arc::new(fanout);

        let mut dispatcher = DecisionDispatcher::new(
            failover,
            alerts,
            config.failover_policy,
            config.collaborator_timeout(),
        );
        if let Some(telemetry) = &self.telemetry {
            dispatcher = dispatcher.with_telemetry(Arc::clone(telemetry));
        }

        let inner = Inner {
            evaluator: HealthEvaluator::new(history.clone(), &config),
            store: StateStore::with_recorder(recorder.clone(), config.collaborator_timeout()),
            aggregator: MetricsAggregator::new(config.metrics_window()),
            broadcaster: HealthBroadcaster::new(config.broadcast_capacity),
            probe_permits: Semaphore::new(config.max_concurrent_probes),
            registry,
            prober,
            history,
            recorder,
            dispatcher,
            telemetry: self.telemetry,
            state: RwLock::new(MonitorState::Idle),
            lifecycle: AsyncMutex::new(Lifecycle::default()),
            cycle_lock: AsyncMutex::new(()),
            stats: Mutex::new(Stats::default()),
            config,
        };

        Ok(MonitorScheduler {
            inner: Arc::new(inner),
        })
    }
}

impl Default for MonitorSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
