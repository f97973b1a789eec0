//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::time::Duration;

use crate::infrastructure::fanout::DEFAULT_SESSION_BUFFER;

/// Default Arduino IoT Cloud API base URL.
pub const DEFAULT_API_URL: &str = "https://api2.arduino.cc";

/// Arduino IoT Cloud API credentials.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }

    /// Get the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Cloud link settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    /// API base URL, without trailing slash.
    pub api_url: String,
    /// Thing whose properties are relayed.
    pub thing_id: String,
    /// Interval between property polls.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Fixed delay before reconnecting.
    pub reconnect_delay: Duration,
}

impl CloudSettings {
    /// Settings for `thing_id` with every other field at its default.
    #[must_use]
    pub fn for_thing(thing_id: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            thing_id: thing_id.into(),
            poll_interval: Duration::from_millis(1_000),
            request_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Listen port for REST, WebSocket and health endpoints.
    pub port: u16,
    /// Per-session outbound queue capacity.
    pub session_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            session_buffer: DEFAULT_SESSION_BUFFER,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Cloud link settings.
    pub cloud: CloudSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, or an
    /// optional one does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client_id = required(&lookup, "CLIENT_ID")?;
        let client_secret = required(&lookup, "CLIENT_SECRET")?;
        let thing_id = required(&lookup, "THING_ID")?;

        let defaults = CloudSettings::for_thing(thing_id);
        let api_url = lookup("ARDUINO_API_URL")
            .filter(|v| !v.trim().is_empty())
            .map_or(defaults.api_url.clone(), |v| {
                v.trim().trim_end_matches('/').to_string()
            });

        let cloud = CloudSettings {
            api_url,
            poll_interval: parse_duration_millis(
                &lookup,
                "CLOUD_POLL_INTERVAL_MS",
                defaults.poll_interval,
            )?,
            request_timeout: parse_duration_secs(
                &lookup,
                "CLOUD_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
            )?,
            reconnect_delay: parse_duration_secs(
                &lookup,
                "CLOUD_RECONNECT_DELAY_SECS",
                defaults.reconnect_delay,
            )?,
            ..defaults
        };

        let server = ServerSettings {
            port: parse_or(&lookup, "PORT", ServerSettings::default().port)?,
            session_buffer: parse_or(
                &lookup,
                "FANOUT_SESSION_BUFFER",
                ServerSettings::default().session_buffer,
            )?,
        };

        if server.session_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FANOUT_SESSION_BUFFER".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            credentials: Credentials::new(client_id, client_secret),
            cloud,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_nonzero(lookup, key, default.as_secs()).map(Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_nonzero(lookup, key, millis).map(Duration::from_millis)
}

/// Like `parse_or`, but zero is rejected.
fn parse_nonzero(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: lookup(key).unwrap_or_default(),
        }),
        n => Ok(n),
    }
}
