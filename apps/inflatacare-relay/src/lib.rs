#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Inflatacare Relay - Live Property Relay
//!
//! Keeps one link to Arduino IoT Cloud for the mattress controller's
//! properties, caches the latest value of each and fans every update out to
//! dashboard clients over a WebSocket push channel.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Latest-value store and cloud link state
//! - **Application**: Ports (`CloudConnector`, `UpdatePublisher`) and the
//!   store-then-publish sync service
//! - **Infrastructure**: Arduino REST adapter, cloud link retry loop,
//!   fanout, HTTP server, config, metrics, telemetry
//!
//! # Data Flow
//!
//! ```text
//! Arduino IoT Cloud ──► CloudLink ──► PropertySync ──► PropertyStore
//!                                          │
//!                                          ▼
//!                                       Fanout ──► /ws session 1
//!                                                ├► /ws session 2
//!                                                └► /ws session N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Property cache and link state.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{LinkState, LinkStatus, PropertyStore};

// Ports and services
pub use application::ports::{CloudConnector, CloudError, CloudEvent, CloudSession, UpdatePublisher};
pub use application::services::{PropertySync, SyncOutcome};

// Infrastructure config
pub use infrastructure::config::{
    CloudSettings, ConfigError, Credentials, RelayConfig, ServerSettings,
};

// Cloud adapter and link
pub use infrastructure::arduino::{ArduinoClientConfig, ArduinoCloudConnector};
pub use infrastructure::link::{CloudLink, CloudLinkConfig, LinkError};

// Fanout
pub use infrastructure::fanout::{Fanout, FanoutStats, Session, SessionId, SharedFanout};

// HTTP server
pub use infrastructure::server::{AppState, RelayServer, ServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
