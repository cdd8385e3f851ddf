//! Webhook client for failover and alert delivery
//!
//! POSTs JSON to operator-supplied endpoints. Non-2xx responses are errors;
//! the dispatcher logs them and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::collaborators::{AlertDispatcher, FailoverController};
use crate::contracts::*;
use crate::error::{CollaboratorError, CollaboratorResult};

/// Failover request body
#[derive(Debug, Serialize)]
pub struct FailoverRequest<'a> {
    pub integration: &'a str,
    pub consecutive_failures: u32,
    pub record: &'a IntegrationHealth,
    pub requested_at: DateTime<Utc>,
}

/// Webhook-backed failover controller and alert dispatcher
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    failover_url: Option<String>,
    alert_url: Option<String>,
    timeout: Duration,
}

impl WebhookClient {
    /// Create new client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            failover_url: None,
            alert_url: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// Endpoint receiving failover requests
    pub fn with_failover_url(mut self, url: impl Into<String>) -> Self {
        self.failover_url = Some(url.into());
        self
    }

    /// Endpoint receiving alerts
    pub fn with_alert_url(mut self, url: impl Into<String>) -> Self {
        self.alert_url = Some(url.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> CollaboratorResult<()> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CollaboratorError::Timeout(self.timeout)
                } else {
                    CollaboratorError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(CollaboratorError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FailoverController for WebhookClient {
    async fn trigger_failover(
        &self,
        name: &str,
        record: &IntegrationHealth,
    ) -> CollaboratorResult<()> {
        let url = self
            .failover_url
            .as_deref()
            .ok_or_else(|| CollaboratorError::NotConfigured("failover webhook".to_string()))?;

        let request = FailoverRequest {
            integration: name,
            consecutive_failures: record.consecutive_failures,
            record,
            requested_at: Utc::now(),
        };
        self.post(url, &request).await
    }
}

#[async_trait]
impl AlertDispatcher for WebhookClient {
    async fn send_alert(&self, alert: &Alert) -> CollaboratorResult<()> {
        let url = self
            .alert_url
            .as_deref()
            .ok_or_else(|| CollaboratorError::NotConfigured("alert webhook".to_string()))?;

        self.post(url, alert).await
    }
}
