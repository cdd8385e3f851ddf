//! HTTP status API for the Integration Monitor
//!
//! Read-only views over the scheduler: liveness, engine status, the current
//! snapshot, the latest aggregate, a server-sent event stream of health
//! updates and the Prometheus exposition.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use futures::Stream;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::contracts::*;
use crate::scheduler::MonitorScheduler;
use crate::telemetry::MonitorMetricsRegistry;

/// Application state
pub struct AppState {
    pub scheduler: MonitorScheduler,
    pub metrics: Option<Arc<MonitorMetricsRegistry>>,
}

impl AppState {
    pub fn new(scheduler: MonitorScheduler) -> Self {
        let metrics = scheduler.telemetry();
        Self { scheduler, metrics }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/v1/status", get(monitor_status))
        .route("/api/v1/integrations", get(list_integrations))
        .route("/api/v1/integrations/:name", get(get_integration))
        .route("/api/v1/metrics", get(system_metrics))
        .route("/api/v1/stream", get(health_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        monitor: state.scheduler.state(),
    })
}

async fn monitor_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.scheduler.status())
}

async fn list_integrations(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, IntegrationHealth>> {
    Json(state.scheduler.snapshot())
}

async fn get_integration(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<IntegrationHealth>, (StatusCode, Json<ApiError>)> {
    state.scheduler.get(&name).map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "NotFound".to_string(),
                message: format!("Integration {} is not monitored", name),
            }),
        )
    })
}

async fn system_metrics(State(state): State<Arc<AppState>>) -> Json<MonitoringMetrics> {
    Json(state.scheduler.metrics())
}

async fn health_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // lagged receivers skip to the newest update
    let stream = BroadcastStream::new(state.scheduler.subscribe()).filter_map(|event| {
        let event = event.ok()?;
        Event::default()
            .event("health_update")
            .json_data(&event)
            .ok()
            .map(Ok::<_, Infallible>)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Prometheus text exposition
async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics are disabled").into_response();
    };

    match metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub monitor: MonitorState,
}

/// API error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}
