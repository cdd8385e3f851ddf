//! State store
//!
//! Current health record per integration. Writes go to the sharded map first
//! and are then mirrored to the recorder; a failing recorder never undoes or
//! delays the in-memory commit beyond the collaborator timeout.

use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::collaborators::HealthRecorder;
use crate::contracts::IntegrationHealth;

pub struct StateStore {
    records: DashMap<String, IntegrationHealth>,
    recorder: Option<Arc<dyn HealthRecorder>>,
    persist_timeout: Duration,
    persistence_failures: AtomicU64,
}

impl StateStore {
    /// Store without persistence mirroring
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            recorder: None,
            persist_timeout: Duration::from_secs(10),
            persistence_failures: AtomicU64::new(0),
        }
    }

    /// Store that mirrors every commit to `recorder`
    pub fn with_recorder(recorder: Arc<dyn HealthRecorder>, persist_timeout: Duration) -> Self {
        Self {
            recorder: Some(recorder),
            persist_timeout,
            ..Self::new()
        }
    }

    /// Upsert a record by name, then mirror it
    pub async fn commit(&self, record: IntegrationHealth) {
        self.records.insert(record.name.clone(), record.clone());

        let Some(recorder) = &self.recorder else {
            return;
        };

        let failure = match timeout(self.persist_timeout, recorder.record_health_check(&record)).await
        {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.persist_timeout),
        };

        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            integration = %record.name,
            error = %failure,
            "Failed to persist health check"
        );
    }

    pub fn get(&self, name: &str) -> Option<IntegrationHealth> {
        self.records.get(name).map(|r| r.value().clone())
    }

    /// Copy of every record, ordered by name
    pub fn snapshot(&self) -> BTreeMap<String, IntegrationHealth> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Drop records for integrations no longer registered, returns their names
    pub fn retain_registered(&self, registered: &HashSet<String>) -> Vec<String> {
        let mut removed = Vec::new();
        self.records.retain(|name, _| {
            let keep = registered.contains(name);
            if !keep {
                removed.push(name.clone());
            }
            keep
        });
        removed.sort();
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Commits whose mirroring failed or timed out
    pub fn persistence_failures(&self) -> u64 {
        self.persistence_failures.load(Ordering::Relaxed)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::HealthStatus;
    use crate::error::{CollaboratorError, CollaboratorResult};
    use async_trait::async_trait;
    use chrono::Utc;

    struct FailingRecorder;

    #[async_trait]
    impl HealthRecorder for FailingRecorder {
        async fn record_health_check(&self, _record: &IntegrationHealth) -> CollaboratorResult<()> {
            Err(CollaboratorError::Io("disk full".to_string()))
        }
    }

    struct StalledRecorder;

    #[async_trait]
    impl HealthRecorder for StalledRecorder {
        async fn record_health_check(&self, _record: &IntegrationHealth) -> CollaboratorResult<()> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

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

    #[tokio::test]
    async fn test_commit_replaces_by_name() {
        let store = StateStore::new();
        store.commit(record("a", HealthStatus::Healthy)).await;
        store.commit(record("a", HealthStatus::Degraded)).await;
        store.commit(record("b", HealthStatus::Healthy)).await;

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().status, HealthStatus::Degraded);
        assert!(store.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let store = StateStore::new();
        store.commit(record("a", HealthStatus::Healthy)).await;

        let snapshot = store.snapshot();
        store.commit(record("a", HealthStatus::Unhealthy)).await;

        assert_eq!(snapshot["a"].status, HealthStatus::Healthy);
        assert_eq!(store.get("a").unwrap().status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_record() {
        let store = StateStore::with_recorder(Arc::new(FailingRecorder), Duration::from_secs(1));
        store.commit(record("a", HealthStatus::Healthy)).await;

        assert!(store.get("a").is_some());
        assert_eq!(store.persistence_failures(), 1);
    }

    #[tokio::test]
    async fn test_stalled_recorder_is_bounded() {
        let store =
            StateStore::with_recorder(Arc::new(StalledRecorder), Duration::from_millis(20));
        store.commit(record("a", HealthStatus::Healthy)).await;

        assert!(store.get("a").is_some());
        assert_eq!(store.persistence_failures(), 1);
    }

    #[tokio::test]
    async fn test_retain_registered() {
        let store = StateStore::new();
        for name in ["a", "b", "c"] {
            store.commit(record(name, HealthStatus::Healthy)).await;
        }

        let registered: HashSet<String> = ["b".to_string()].into_iter().collect();
        let removed = store.retain_registered(&registered);

        assert_eq!(removed, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_commits_to_different_keys() {
        let store = Arc::new(StateStore::new());
        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .commit(record(&format!("integration-{}", i), HealthStatus::Healthy))
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len(), 50);
    }
}
