//! Arduino IoT Cloud Adapter
//!
//! REST implementation of the `CloudConnector` port:
//!
//! - **auth**: OAuth2 client-credentials token cache
//! - **messages**: API request/response bodies
//! - **client**: connector and per-session poll loop

pub mod auth;
pub mod client;
pub mod messages;

pub use auth::TokenManager;
pub use client::{ArduinoClientConfig, ArduinoCloudConnector};
pub use messages::{ThingProperty, TokenResponse};
