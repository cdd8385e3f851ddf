//! Check history
//!
//! `InMemoryHistory` keeps a bounded sample deque per integration and answers
//! the rolling-window queries the evaluator needs. `JsonlRecorder` appends
//! every record to a JSON-lines file for durable history.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::collaborators::{HealthHistory, HealthRecorder, WindowCounts};
use crate::contracts::{IntegrationHealth, MonitoringMetrics};
use crate::error::CollaboratorResult;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    failed: bool,
}

/// Bounded rolling history of check outcomes
pub struct InMemoryHistory {
    samples: DashMap<String, VecDeque<Sample>>,
    retention: ChronoDuration,
    capacity: usize,
}

impl InMemoryHistory {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            samples: DashMap::new(),
            retention: ChronoDuration::from_std(retention).unwrap_or_else(|_| ChronoDuration::days(1)),
            capacity: capacity.max(1),
        }
    }

    /// Record one check outcome
    pub fn record(&self, name: &str, at: DateTime<Utc>, failed: bool) {
        let mut samples = self.samples.entry(name.to_string()).or_default();
        samples.push_back(Sample { at, failed });

        let cutoff = at - self.retention;
        while samples.front().is_some_and(|s| s.at < cutoff) || samples.len() > self.capacity {
            samples.pop_front();
        }
    }

    /// Samples held for an integration
    pub fn sample_count(&self, name: &str) -> usize {
        self.samples.get(name).map_or(0, |s| s.len())
    }

    /// Drop all samples for an integration
    pub fn forget(&self, name: &str) {
        self.samples.remove(name);
    }
}

impl HealthHistory for InMemoryHistory {
    fn counts_since(&self, name: &str, since: DateTime<Utc>) -> WindowCounts {
        let Some(samples) = self.samples.get(name) else {
            return WindowCounts::default();
        };

        samples
            .iter()
            .rev()
            .take_while(|s| s.at >= since)
            .fold(WindowCounts::default(), |mut counts, s| {
                counts.total += 1;
                counts.failed += s.failed as u64;
                counts
            })
    }
}

#[async_trait]
impl HealthRecorder for InMemoryHistory {
    async fn record_health_check(&self, record: &IntegrationHealth) -> CollaboratorResult<()> {
        self.record(&record.name, record.last_check, !record.is_available());
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum HistoryLine<'a> {
    HealthCheck { record: &'a IntegrationHealth },
    SystemMetrics { metrics: &'a MonitoringMetrics },
}

/// Appends records and aggregates to a JSON-lines file
pub struct JsonlRecorder {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlRecorder {
    /// Open `path` for appending, creating it if needed
    pub async fn open(path: impl AsRef<Path>) -> CollaboratorResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &HistoryLine<'_>) -> CollaboratorResult<()> {
        let mut bytes = serde_json::to_vec(line)?;
        bytes.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl HealthRecorder for JsonlRecorder {
    async fn record_health_check(&self, record: &IntegrationHealth) -> CollaboratorResult<()> {
        self.append(&HistoryLine::HealthCheck { record }).await
    }

    async fn update_system_metrics(&self, metrics: &MonitoringMetrics) -> CollaboratorResult<()> {
        self.append(&HistoryLine::SystemMetrics { metrics }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::HealthStatus;

    fn record(name: &str, status: HealthStatus) -> IntegrationHealth {
        IntegrationHealth {
            name: name.to_string(),
            status,
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

    #[test]
    fn test_counts_respect_window() {
        let history = InMemoryHistory::new(Duration::from_secs(86_400), 100);
        let now = Utc::now();

        history.record("a", now - ChronoDuration::hours(2), true);
        history.record("a", now - ChronoDuration::minutes(30), true);
        history.record("a", now - ChronoDuration::minutes(10), false);

        let hour = history.counts_since("a", now - ChronoDuration::hours(1));
        assert_eq!(hour, WindowCounts { total: 2, failed: 1 });

        let day = history.counts_since("a", now - ChronoDuration::days(1));
        assert_eq!(day, WindowCounts { total: 3, failed: 2 });

        assert_eq!(history.counts_since("b", now), WindowCounts::default());
    }

    #[test]
    fn test_capacity_and_retention_prune() {
        let history = InMemoryHistory::new(Duration::from_secs(3_600), 3);
        let now = Utc::now();

        history.record("a", now - ChronoDuration::hours(3), false);
        history.record("a", now, false);
        assert_eq!(history.sample_count("a"), 1);

        for _ in 0..5 {
            history.record("a", now, false);
        }
        assert_eq!(history.sample_count("a"), 3);

        history.forget("a");
        assert_eq!(history.sample_count("a"), 0);
    }

    #[tokio::test]
    async fn test_recorder_classifies_failures() {
        let history = InMemoryHistory::new(Duration::from_secs(3_600), 10);
        history
            .record_health_check(&record("a", HealthStatus::Degraded))
            .await
            .unwrap();
        history
            .record_health_check(&record("a", HealthStatus::Unknown))
            .await
            .unwrap();

        let counts = history.counts_since("a", Utc::now() - ChronoDuration::minutes(1));
        assert_eq!(counts, WindowCounts { total: 2, failed: 1 });
    }

    #[tokio::test]
    async fn test_jsonl_recorder_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let recorder = JsonlRecorder::open(&path).await.unwrap();

        recorder
            .record_health_check(&record("a", HealthStatus::Healthy))
            .await
            .unwrap();
        let metrics = MonitoringMetrics::from_records(&[record("a", HealthStatus::Healthy)], 0, 0);
        recorder.update_system_metrics(&metrics).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "health_check");
        assert_eq!(lines[0]["record"]["name"], "a");
        assert_eq!(lines[1]["kind"], "system_metrics");
        assert_eq!(lines[1]["metrics"]["total_integrations"], 1);
    }
}
