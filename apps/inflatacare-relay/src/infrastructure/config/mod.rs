//! Configuration Module
//!
//! Environment-driven configuration for the relay.

mod settings;

pub use settings::{
    CloudSettings, ConfigError, Credentials, DEFAULT_API_URL, RelayConfig, ServerSettings,
};
