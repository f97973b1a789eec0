//! Health check and metrics handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::domain::{LinkState, LinkStatus};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Cloud link status.
    pub cloud: LinkInfo,
    /// Connected push channel sessions.
    pub sessions: usize,
    /// Properties with a cached value.
    pub properties: usize,
    /// Updates published since startup.
    pub updates_published: u64,
    /// Sessions evicted for falling behind.
    pub sessions_evicted: u64,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Cloud link connected.
    Healthy,
    /// Link down, cached values still served.
    Degraded,
    /// Never connected; REST answers 503.
    Unhealthy,
}

/// Cloud link status.
#[derive(Debug, Clone, Serialize)]
pub struct LinkInfo {
    /// Link state.
    pub state: LinkStatus,
    /// Whether a session is established.
    pub connected: bool,
    /// Property events received.
    pub messages_received: u64,
    /// Retries since the last connect.
    pub reconnect_attempts: u32,
    /// Last time the link connected.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent failure.
    pub last_error: Option<String>,
}

impl LinkInfo {
    fn from_state(state: &LinkState) -> Self {
        Self {
            state: state.status(),
            connected: state.is_connected(),
            messages_received: state.messages_received(),
            reconnect_attempts: state.reconnect_attempts(),
            last_connected_at: state.last_connected_at(),
            last_error: state.last_error(),
        }
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.link_state.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let cloud = LinkInfo::from_state(&state.link_state);
    let fanout = state.fanout.stats();

    HealthResponse {
        status: determine_health_status(cloud.connected, state.link_state.ever_connected()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        cloud,
        sessions: fanout.sessions,
        properties: state.store.len(),
        updates_published: fanout.updates_published,
        sessions_evicted: fanout.sessions_evicted,
    }
}

const fn determine_health_status(connected: bool, ever_connected: bool) -> HealthStatus {
    match (connected, ever_connected) {
        (true, _) => HealthStatus::Healthy,
        (false, true) => HealthStatus::Degraded,
        (false, false) => HealthStatus::Unhealthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn status_from_link() {
        assert_eq!(determine_health_status(true, true), HealthStatus::Healthy);
        assert_eq!(determine_health_status(false, true), HealthStatus::Degraded);
        assert_eq!(determine_health_status(false, false), HealthStatus::Unhealthy);
    }
}
