//! HTTP Server
//!
//! One axum listener serves the dashboard REST surface, the WebSocket push
//! channel and the operational endpoints.
//!
//! # Endpoints
//!
//! - `GET /api/properties` - All known values
//! - `GET /api/properties/{name}` - One value
//! - `GET /ws` - Push channel (snapshot, then updates)
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe
//! - `GET /readyz` - Readiness probe (cloud link connected)
//! - `GET /metrics` - Prometheus metrics in text format

mod health;
mod push;
mod rest;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::http::Method;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

pub use health::{HealthResponse, HealthStatus, LinkInfo};

use crate::domain::{LinkState, PropertyStore};
use crate::infrastructure::fanout::SharedFanout;

// =============================================================================
// Server State
// =============================================================================

/// Shared state for all handlers.
#[derive(Debug)]
pub struct AppState {
    store: Arc<PropertyStore>,
    fanout: SharedFanout,
    link_state: Arc<LinkState>,
    version: String,
    started_at: Instant,
}

impl AppState {
    /// Create server state.
    #[must_use]
    pub fn new(
        store: Arc<PropertyStore>,
        fanout: SharedFanout,
        link_state: Arc<LinkState>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fanout,
            link_state,
            version: version.into(),
            started_at: Instant::now(),
        }
    }
}

/// Build the router with permissive read-only CORS.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/api/properties", get(rest::list_properties))
        .route("/api/properties/{name}", get(rest::get_property))
        .route("/ws", get(push::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP server for REST, push channel and health.
pub struct RelayServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl RelayServer {
    /// Create a server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port on all interfaces and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server stops with an
    /// error.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the server stops with an error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;
        tracing::info!(addr = %local, "Relay server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Relay server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use inflatacare_core::PropertyName;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::LinkStatus;
    use crate::infrastructure::fanout::Fanout;

    fn state() -> Arc<AppState> {
        let store = Arc::new(PropertyStore::new());
        let fanout = Arc::new(Fanout::new(Arc::clone(&store), 8));
        Arc::new(AppState::new(
            store,
            fanout,
            Arc::new(LinkState::new()),
            "test",
        ))
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = router(Arc::clone(state))
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn list_requires_first_connect() {
        let state = state();
        let (status, body) = get(&state, "/api/properties").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, r#"{"error":"Not connected to Arduino IoT Cloud"}"#);
    }

    #[tokio::test]
    async fn list_keeps_serving_after_disconnect() {
        let state = state();
        state.store.set(PropertyName::Frs2, 7.5);
        state.link_state.set_status(LinkStatus::Connected);
        state.link_state.set_status(LinkStatus::Reconnecting);

        let (status, body) = get(&state, "/api/properties").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"fRS2":7.5}"#);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let response = router(state())
            .oneshot(
                Request::get("/healthz")
                    .header(header::ORIGIN, "http://dashboard.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn readiness_follows_link() {
        let state = state();
        let (status, _) = get(&state, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.link_state.set_status(LinkStatus::Connected);
        let (status, body) = get(&state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");
    }

    #[tokio::test]
    async fn health_reports_link_and_sessions() {
        let state = state();
        state.store.set(PropertyName::AlertStatus, 1.0);
        state.link_state.set_status(LinkStatus::Connected);
        let _session = state.fanout.on_client_connect();

        let (status, body) = get(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], "test");
        assert_eq!(json["cloud"]["state"], "connected");
        assert_eq!(json["sessions"], 1);
        assert_eq!(json["properties"], 1);
    }
}
