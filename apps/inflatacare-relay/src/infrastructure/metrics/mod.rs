//! Prometheus Metrics Module
//!
//! Exposes relay metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Properties**: updates relayed per property, unknown names ignored
//! - **Fanout**: deliveries, evictions, active sessions
//! - **Cloud link**: connection state, reconnects, errors by kind
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the relay's HTTP port.

use std::sync::OnceLock;

use inflatacare_core::PropertyName;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder.
///
/// Safe to call more than once; every call returns the handle created by the
/// first. If another global recorder is already installed, the handle renders
/// an empty page.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();
            if metrics::set_global_recorder(recorder).is_err() {
                tracing::warn!("Metrics recorder already installed, Prometheus output disabled");
            }
            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "inflatacare_relay_property_updates_total",
        "Property values received from the cloud and relayed"
    );
    describe_counter!(
        "inflatacare_relay_unknown_properties_total",
        "Cloud values ignored because the name is not monitored"
    );

    describe_counter!(
        "inflatacare_relay_fanout_deliveries_total",
        "Updates queued to client sessions"
    );
    describe_counter!(
        "inflatacare_relay_sessions_evicted_total",
        "Client sessions evicted for falling behind"
    );
    describe_gauge!(
        "inflatacare_relay_active_sessions",
        "Connected push-channel sessions"
    );

    describe_gauge!(
        "inflatacare_relay_cloud_connected",
        "1 while the cloud link is connected"
    );
    describe_counter!(
        "inflatacare_relay_cloud_reconnects_total",
        "Cloud link reconnection attempts"
    );
    describe_counter!(
        "inflatacare_relay_cloud_errors_total",
        "Cloud link errors by kind"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a property value relayed from the cloud.
pub fn record_property_update(property: PropertyName) {
    counter!(
        "inflatacare_relay_property_updates_total",
        "property" => property.as_str()
    )
    .increment(1);
}

/// Record a cloud value ignored for its name.
pub fn record_unknown_property() {
    counter!("inflatacare_relay_unknown_properties_total").increment(1);
}

/// Record one published update reaching `sessions` clients.
pub fn record_fanout(property: PropertyName, sessions: usize) {
    counter!(
        "inflatacare_relay_fanout_deliveries_total",
        "property" => property.as_str()
    )
    .increment(sessions as u64);
}

/// Record an evicted session.
pub fn record_session_evicted() {
    counter!("inflatacare_relay_sessions_evicted_total").increment(1);
}

/// Update the active session gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("inflatacare_relay_active_sessions").set(count as f64);
}

/// Update the cloud connection gauge.
pub fn set_cloud_connected(connected: bool) {
    gauge!("inflatacare_relay_cloud_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record a cloud reconnection attempt.
pub fn record_reconnect() {
    counter!("inflatacare_relay_cloud_reconnects_total").increment(1);
}

/// Record a cloud link error.
pub fn record_cloud_error(kind: &'static str) {
    counter!(
        "inflatacare_relay_cloud_errors_total",
        "kind" => kind
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
