//! Prober implementations
//!
//! Transport-level probes for the probe kinds the registry can declare. They
//! only report what happened on the wire; scoring happens in the evaluator.

use async_trait::async_trait;
use std::time::Instant;

use crate::collaborators::Prober;
use crate::contracts::*;
use crate::error::ProbeError;

/// A prober that declares which probe kinds it handles
pub trait ProbeHandler: Prober {
    fn id(&self) -> &str;

    fn supports(&self, kind: &ProbeKind) -> bool;
}

/// HTTP health prober
///
/// Issues a GET against the endpoint's health path. Any completed response is
/// an `Ok` outcome; only 2xx counts as success.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn url(probe: &ProbeConfig) -> String {
        let health_path = probe
            .health_path
            .as_deref()
            .or_else(|| probe.kind.default_health_path())
            .unwrap_or("/health");
        let endpoint = probe.endpoint.trim_end_matches('/');

        if endpoint.starts_with("http") {
            format!("{}{}", endpoint, health_path)
        } else {
            format!("https://{}{}", endpoint, health_path)
        }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn check(&self, integration: &IntegrationConfig) -> Result<ProbeOutcome, ProbeError> {
        let probe = &integration.probe;
        let url = Self::url(probe);
        let start = Instant::now();

        let mut request = self.client.get(&url).timeout(probe.timeout());
        for (name, value) in &probe.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(probe.timeout())
            } else if e.is_connect() {
                ProbeError::Connection(e.to_string())
            } else {
                ProbeError::Http(e.to_string())
            }
        })?;

        let response_time = start.elapsed().as_secs_f64();
        let status = response.status();
        let outcome = if status.is_success() {
            ProbeOutcome::ok(status.as_u16(), response_time)
        } else {
            ProbeOutcome::failed(
                status.as_u16(),
                response_time,
                format!("Non-success status: {}", status),
            )
        };

        Ok(outcome.with_metadata("url", serde_json::json!(url)))
    }
}

impl ProbeHandler for HttpProber {
    fn id(&self) -> &str {
        "http"
    }

    fn supports(&self, kind: &ProbeKind) -> bool {
        matches!(kind, ProbeKind::Http)
    }
}

/// TCP connectivity prober
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProber;

impl TcpProber {
    fn address(endpoint: &str) -> &str {
        endpoint.strip_prefix("tcp://").unwrap_or(endpoint)
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn check(&self, integration: &IntegrationConfig) -> Result<ProbeOutcome, ProbeError> {
        let addr = Self::address(&integration.probe.endpoint);
        let start = Instant::now();

        tokio::net::TcpStream::connect(addr)
            .await
            .map_err(|e| ProbeError::Connection(format!("{}: {}", addr, e)))?;

        Ok(ProbeOutcome::ok(0, start.elapsed().as_secs_f64())
            .with_metadata("address", serde_json::json!(addr)))
    }
}

impl ProbeHandler for TcpProber {
    fn id(&self) -> &str {
        "tcp"
    }

    fn supports(&self, kind: &ProbeKind) -> bool {
        matches!(kind, ProbeKind::Tcp)
    }
}

/// Dispatches each integration to the first handler supporting its probe kind
pub struct ProbeRouter {
    handlers: Vec<Box<dyn ProbeHandler>>,
}

impl ProbeRouter {
    /// Router with no handlers
    pub fn empty() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a handler; earlier handlers win
    pub fn with_handler(mut self, handler: impl ProbeHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Ids of the registered handlers
    pub fn handler_ids(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.id()).collect()
    }
}

impl Default for ProbeRouter {
    fn default() -> Self {
        Self::empty()
            .with_handler(HttpProber::new())
            .with_handler(TcpProber)
    }
}

#[async_trait]
impl Prober for ProbeRouter {
    async fn check(&self, integration: &IntegrationConfig) -> Result<ProbeOutcome, ProbeError> {
        let kind = integration.probe.kind;
        let handler = self
            .handlers
            .iter()
            .find(|h| h.supports(&kind))
            .ok_or(ProbeError::Unsupported(kind))?;

        handler.check(integration).await
    }
}
