//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the HTTP surface
//! and the ambient plumbing.

/// Arduino IoT Cloud REST adapter.
pub mod arduino;

/// Configuration from environment variables.
pub mod config;

/// Per-client session registry and update broadcaster.
pub mod fanout;

/// Cloud connection manager with fixed-delay retry.
pub mod link;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// REST, WebSocket and health endpoints.
pub mod server;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
