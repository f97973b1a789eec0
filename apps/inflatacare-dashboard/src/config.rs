//! Client Configuration
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RELAY_URL` | `ws://localhost:3000/ws` |
//! | `RELAY_RECONNECT_DELAY_MS` | 1000 |
//! | `RELAY_RECONNECT_DELAY_MAX_MS` | 5000 |

use std::time::Duration;

use inflatacare_core::ReconnectConfig;

/// Default push channel URL.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3000/ws";

const DEFAULT_DELAY_MS: u64 = 1_000;
const DEFAULT_DELAY_MAX_MS: u64 = 5_000;

/// Push channel client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Backoff between connection attempts.
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            reconnect: ReconnectConfig::exponential(
                Duration::from_millis(DEFAULT_DELAY_MS),
                Duration::from_millis(DEFAULT_DELAY_MAX_MS),
            ),
        }
    }
}

impl ClientConfig {
    /// Configuration for `relay_url` with default backoff.
    #[must_use]
    pub fn for_url(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let relay_url = lookup("RELAY_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());

        if !(relay_url.starts_with("ws://") || relay_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_URL",
                value: relay_url,
            });
        }

        let initial = millis(&lookup, "RELAY_RECONNECT_DELAY_MS", DEFAULT_DELAY_MS)?;
        let max = millis(&lookup, "RELAY_RECONNECT_DELAY_MAX_MS", DEFAULT_DELAY_MAX_MS)?;
        if max < initial {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_RECONNECT_DELAY_MAX_MS",
                value: max.as_millis().to_string(),
            });
        }

        Ok(Self {
            relay_url,
            reconnect: ReconnectConfig::exponential(initial, max),
        })
    }
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(Duration::from_millis(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable has an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Value found.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        move |k| vars.get(k).map(|v| (*v).to_string())
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 0);
    }

    #[test]
    fn overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("RELAY_URL", "wss://relay.example/ws"),
            ("RELAY_RECONNECT_DELAY_MS", "250"),
            ("RELAY_RECONNECT_DELAY_MAX_MS", "30000"),
        ]))
        .unwrap();

        assert_eq!(config.relay_url, "wss://relay.example/ws");
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_secs(30));
    }

    #[test_case("RELAY_URL", "http://localhost:3000" ; "non websocket url")]
    #[test_case("RELAY_RECONNECT_DELAY_MS", "soon" ; "non numeric delay")]
    #[test_case("RELAY_RECONNECT_DELAY_MS", "0" ; "zero delay")]
    #[test_case("RELAY_RECONNECT_DELAY_MAX_MS", "10" ; "max below initial")]
    fn invalid_values(key: &'static str, value: &'static str) {
        let err = ClientConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: k, .. } if k == key));
    }
}
