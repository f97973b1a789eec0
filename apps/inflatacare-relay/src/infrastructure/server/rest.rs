//! REST handlers for the dashboard.
//!
//! Both routes answer 503 until the cloud link has connected once. After
//! that, cached values are served even while the link is retrying.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use inflatacare_core::PropertyName;
use serde_json::{Map, Value, json};

use super::AppState;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn not_connected() -> Response {
    error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Not connected to Arduino IoT Cloud",
    )
}

/// `GET /api/properties`
pub(super) async fn list_properties(State(state): State<Arc<AppState>>) -> Response {
    if !state.link_state.ever_connected() {
        return not_connected();
    }
    Json(state.store.snapshot()).into_response()
}

/// `GET /api/properties/{name}`
///
/// `{name: value}` if a value is cached, `{}` if not.
pub(super) async fn get_property(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Response {
    if !state.link_state.ever_connected() {
        return not_connected();
    }

    let Ok(property) = name.parse::<PropertyName>() else {
        tracing::debug!(property = %name, "Unknown property requested");
        return error(StatusCode::NOT_FOUND, "Property not found");
    };

    let mut body = Map::new();
    if let Some(value) = state.store.get(property) {
        body.insert(property.as_str().to_string(), json!(value));
    }
    Json(Value::Object(body)).into_response()
}
