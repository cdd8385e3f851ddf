//! Real-time health updates
//!
//! Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and skip
//! old events rather than holding up the cycle.

use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::contracts::{IntegrationHealth, MonitorEvent, MonitoringMetrics};

#[derive(Debug, Clone)]
pub struct HealthBroadcaster {
    sender: broadcast::Sender<MonitorEvent>,
}

impl HealthBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publish a health update; returns false when nobody is listening
    pub fn publish(
        &self,
        integrations: BTreeMap<String, IntegrationHealth>,
        metrics: Option<MonitoringMetrics>,
    ) -> bool {
        if self.sender.receiver_count() == 0 {
            return false;
        }

        let event = MonitorEvent::HealthUpdate {
            timestamp: Utc::now(),
            integrations,
            metrics,
        };
        self.sender.send(event).is_ok()
    }
}
