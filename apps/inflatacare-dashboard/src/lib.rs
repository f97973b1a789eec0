#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening
    )
)]

//! Inflatacare Dashboard - Push Channel Client
//!
//! Client side of the relay's WebSocket push channel.
//!
//! - `registry`: local property values, per-property subscriptions and the
//!   connection status signal
//! - `channel`: WebSocket client with exponential backoff that feeds the
//!   registry
//! - `config`: environment configuration
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use inflatacare_core::PropertyName;
//! use inflatacare_dashboard::{ClientConfig, PushChannelClient, SubscriptionRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() {
//! let registry = SubscriptionRegistry::new();
//! let _sensor = registry.subscribe(PropertyName::Frs1, |value| {
//!     println!("fRS1 = {value}");
//! });
//!
//! let client = Arc::new(PushChannelClient::new(
//!     ClientConfig::default(),
//!     registry.clone(),
//!     CancellationToken::new(),
//! ));
//! let _ = client.run().await;
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// WebSocket push channel client.
pub mod channel;

/// Client configuration.
pub mod config;

/// Property values and subscriptions.
pub mod registry;

pub use channel::{ChannelError, PushChannelClient};
pub use config::{ClientConfig, ConfigError, DEFAULT_RELAY_URL};
pub use registry::{Callback, ConnectionStatus, PropertyWatch, Subscription, SubscriptionRegistry};
