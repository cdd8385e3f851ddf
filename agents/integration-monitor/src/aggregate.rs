//! Rate-limited metrics aggregation

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::contracts::{IntegrationHealth, MonitoringMetrics};

#[derive(Debug, Default)]
struct AggregateState {
    last_run: Option<Instant>,
    latest: Option<MonitoringMetrics>,
}

/// Recomputes `MonitoringMetrics` at most once per window
#[derive(Debug)]
pub struct MetricsAggregator {
    window: Duration,
    state: Mutex<AggregateState>,
}

impl MetricsAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(AggregateState::default()),
        }
    }

    /// Aggregate if the window elapsed since the last run, or on first call
    pub fn maybe_aggregate(
        &self,
        snapshot: &BTreeMap<String, IntegrationHealth>,
        active_alerts: u32,
        failovers_today: u32,
    ) -> Option<MonitoringMetrics> {
        self.maybe_aggregate_at(Instant::now(), snapshot, active_alerts, failovers_today)
    }

    pub fn maybe_aggregate_at(
        &self,
        now: Instant,
        snapshot: &BTreeMap<String, IntegrationHealth>,
        active_alerts: u32,
        failovers_today: u32,
    ) -> Option<MonitoringMetrics> {
        let mut state = self.state.lock();

        let due = state
            .last_run
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if !due {
            return None;
        }

        let metrics =
            MonitoringMetrics::from_records(snapshot.values(), active_alerts, failovers_today);
        state.last_run = Some(now);
        state.latest = Some(metrics.clone());
        Some(metrics)
    }

    /// Last computed aggregate
    pub fn latest(&self) -> Option<MonitoringMetrics> {
        self.state.lock().latest.clone()
    }

    /// Timestamp of the last computed aggregate
    pub fn last_aggregated_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().latest.as_ref().map(|m| m.timestamp)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
