//! Prometheus metrics for the Integration Monitor
//!
//! All metrics live under the `integration_monitor` namespace:
//! - `checks_total` (counter) - Health checks by integration and status
//! - `probe_duration_seconds` (histogram) - Probe latency by integration
//! - `health_score` / `consecutive_failures` (gauges) - Latest record per integration
//! - `cycle_duration_seconds` (histogram) - Full cycle duration
//! - `cycles_total` / `cycle_overruns_total` / `failed_cycles_total` (counters)
//! - `failovers_total` / `alerts_total` (counters) - Decisions taken
//! - `integrations`, `mean_*`, `cost_today` (gauges) - Latest aggregate

use async_trait::async_trait;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};
use std::sync::Arc;
use std::time::Instant;

use super::{Result, TelemetryError};
use crate::collaborators::HealthRecorder;
use crate::contracts::{AlertSeverity, HealthStatus, IntegrationHealth, MonitoringMetrics};
use crate::error::CollaboratorResult;

const NAMESPACE: &str = "integration_monitor";

const STATUSES: [HealthStatus; 4] = [
    HealthStatus::Healthy,
    HealthStatus::Degraded,
    HealthStatus::Unhealthy,
    HealthStatus::Unknown,
];

/// Monitor metrics for Prometheus
pub struct MonitorMetrics {
    checks_total: CounterVec,
    probe_duration_seconds: HistogramVec,
    health_score: GaugeVec,
    consecutive_failures: GaugeVec,
    cycle_duration_seconds: Histogram,
    cycles_total: Counter,
    cycle_overruns_total: Counter,
    failed_cycles_total: Counter,
    failovers_total: CounterVec,
    alerts_total: CounterVec,
    integrations: GaugeVec,
    mean_response_time_seconds: Gauge,
    mean_error_rate: Gauge,
    mean_uptime: Gauge,
    cost_today: Gauge,
}

impl MonitorMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let checks_total = CounterVec::new(
            Opts::new("checks_total", "Health checks performed").namespace(NAMESPACE),
            &["integration", "status"],
        )?;

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new("probe_duration_seconds", "Probe latency in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
            &["integration"],
        )?;

        let health_score = GaugeVec::new(
            Opts::new("health_score", "Latest health score (0 - 100)").namespace(NAMESPACE),
            &["integration"],
        )?;

        let consecutive_failures = GaugeVec::new(
            Opts::new("consecutive_failures", "Current unhealthy streak").namespace(NAMESPACE),
            &["integration"],
        )?;

        let cycle_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("cycle_duration_seconds", "Monitoring cycle duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let cycles_total = Counter::with_opts(
            Opts::new("cycles_total", "Completed monitoring cycles").namespace(NAMESPACE),
        )?;

        let cycle_overruns_total = Counter::with_opts(
            Opts::new("cycle_overruns_total", "Cycles that took longer than the cadence")
                .namespace(NAMESPACE),
        )?;

        let failed_cycles_total = Counter::with_opts(
            Opts::new("failed_cycles_total", "Cycles skipped on registry errors")
                .namespace(NAMESPACE),
        )?;

        let failovers_total = CounterVec::new(
            Opts::new("failovers_total", "Failovers triggered").namespace(NAMESPACE),
            &["integration"],
        )?;

        let alerts_total = CounterVec::new(
            Opts::new("alerts_total", "Alerts raised").namespace(NAMESPACE),
            &["severity"],
        )?;

        let integrations = GaugeVec::new(
            Opts::new("integrations", "Integrations by status").namespace(NAMESPACE),
            &["status"],
        )?;

        let mean_response_time_seconds = Gauge::with_opts(
            Opts::new("mean_response_time_seconds", "Mean response time across integrations")
                .namespace(NAMESPACE),
        )?;

        let mean_error_rate = Gauge::with_opts(
            Opts::new("mean_error_rate", "Mean error rate across integrations")
                .namespace(NAMESPACE),
        )?;

        let mean_uptime = Gauge::with_opts(
            Opts::new("mean_uptime", "Mean uptime across integrations").namespace(NAMESPACE),
        )?;

        let cost_today = Gauge::with_opts(
            Opts::new("cost_today", "Summed integration spend today").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(checks_total.clone()))?;
        registry.register(Box::new(probe_duration_seconds.clone()))?;
        registry.register(Box::new(health_score.clone()))?;
        registry.register(Box::new(consecutive_failures.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(cycle_overruns_total.clone()))?;
        registry.register(Box::new(failed_cycles_total.clone()))?;
        registry.register(Box::new(failovers_total.clone()))?;
        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(integrations.clone()))?;
        registry.register(Box::new(mean_response_time_seconds.clone()))?;
        registry.register(Box::new(mean_error_rate.clone()))?;
        registry.register(Box::new(mean_uptime.clone()))?;
        registry.register(Box::new(cost_today.clone()))?;

        Ok(Self {
            checks_total,
            probe_duration_seconds,
            health_score,
            consecutive_failures,
            cycle_duration_seconds,
            cycles_total,
            cycle_overruns_total,
            failed_cycles_total,
            failovers_total,
            alerts_total,
            integrations,
            mean_response_time_seconds,
            mean_error_rate,
            mean_uptime,
            cost_today,
        })
    }

    /// Record one committed health record
    pub fn record_check(&self, record: &IntegrationHealth) {
        let name = record.name.as_str();
        self.checks_total
            .with_label_values(&[name, record.status.as_str()])
            .inc();
        self.probe_duration_seconds
            .with_label_values(&[name])
            .observe(record.response_time);
        self.health_score
            .with_label_values(&[name])
            .set(record.health_score);
        self.consecutive_failures
            .with_label_values(&[name])
            .set(record.consecutive_failures as f64);
    }

    /// Drop every series labelled with an integration that left the registry
    pub fn remove_integration(&self, name: &str) {
        for status in STATUSES {
            let _ = self.checks_total.remove_label_values(&[name, status.as_str()]);
        }
        let _ = self.probe_duration_seconds.remove_label_values(&[name]);
        let _ = self.health_score.remove_label_values(&[name]);
        let _ = self.consecutive_failures.remove_label_values(&[name]);
        let _ = self.failovers_total.remove_label_values(&[name]);
    }

    pub fn observe_cycle(&self, duration_secs: f64) {
        self.cycle_duration_seconds.observe(duration_secs);
        self.cycles_total.inc();
    }

    pub fn record_overrun(&self) {
        self.cycle_overruns_total.inc();
    }

    pub fn record_failed_cycle(&self) {
        self.failed_cycles_total.inc();
    }

    pub fn record_failover(&self, integration: &str) {
        self.failovers_total.with_label_values(&[integration]).inc();
    }

    pub fn record_alert(&self, severity: AlertSeverity) {
        self.alerts_total
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    /// Publish the latest aggregate
    pub fn set_aggregate(&self, metrics: &MonitoringMetrics) {
        for status in STATUSES {
            self.integrations
                .with_label_values(&[status.as_str()])
                .set(metrics.count(status) as f64);
        }
        self.mean_response_time_seconds.set(metrics.avg_response_time);
        self.mean_error_rate.set(metrics.avg_error_rate);
        self.mean_uptime.set(metrics.avg_uptime);
        self.cost_today.set(metrics.cost_today);
    }

    /// Start a cycle timer (records the cycle on drop)
    pub fn start_cycle_timer(&self) -> CycleTimer<'_> {
        CycleTimer {
            start: Instant::now(),
            metrics: self,
        }
    }
}

/// RAII guard for timing cycles
pub struct CycleTimer<'a> {
    start: Instant,
    metrics: &'a MonitorMetrics,
}

impl CycleTimer<'_> {
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for CycleTimer<'_> {
    fn drop(&mut self) {
        self.metrics.observe_cycle(self.start.elapsed().as_secs_f64());
    }
}

/// Registry for all monitor metrics
pub struct MonitorMetricsRegistry {
    registry: Arc<Registry>,
    monitor: MonitorMetrics,
}

impl MonitorMetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create with an existing Prometheus registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let monitor = MonitorMetrics::new(&registry)?;
        Ok(Self { registry, monitor })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn monitor(&self) -> &MonitorMetrics {
        &self.monitor
    }

    /// Encode metrics as text for scraping
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::EncodingError(e.to_string()))
    }
}

/// Mirrors health records and aggregates into Prometheus
#[derive(Clone)]
pub struct PrometheusRecorder {
    metrics: Arc<MonitorMetricsRegistry>,
}

impl PrometheusRecorder {
    pub fn new(metrics: Arc<MonitorMetricsRegistry>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl HealthRecorder for PrometheusRecorder {
    async fn record_health_check(&self, record: &IntegrationHealth) -> CollaboratorResult<()> {
        self.metrics.monitor().record_check(record);
        Ok(())
    }

    async fn update_system_metrics(&self, metrics: &MonitoringMetrics) -> CollaboratorResult<()> {
        self.metrics.monitor().set_aggregate(metrics);
        Ok(())
    }
}
