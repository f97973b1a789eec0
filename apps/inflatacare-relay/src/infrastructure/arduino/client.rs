//! Arduino IoT Cloud Connector
//!
//! Implements `CloudConnector` on top of the documented REST API. A session
//! is a background task that polls the thing's property list and turns every
//! newly reported value into a `CloudEvent::PropertyValue`.
//!
//! # Change Detection
//!
//! A property is emitted when its `value_updated_at` moves forward since the
//! previous poll; the first poll emits every monitored property that has a
//! value. Identical readings with a new timestamp are emitted again: this
//! follows what the device reported, not whether the number changed.
//! A reading that arrives without a timestamp is emitted only if its value
//! differs from the last one seen.
//!
//! # Failure Handling
//!
//! - 401 while polling: the token is refreshed and the poll retried once
//! - any other failure: the session ends with `CloudEvent::Disconnected`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use inflatacare_core::{PropertyName, PropertyValue};
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::auth::{TokenManager, truncate};
use super::messages::{ApiErrorBody, ThingProperty};
use crate::application::ports::{CloudConnector, CloudError, CloudEvent, CloudSession};
use crate::infrastructure::config::{CloudSettings, Credentials};

/// Capacity of a session's event channel.
const SESSION_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Arduino connector.
#[derive(Debug, Clone)]
pub struct ArduinoClientConfig {
    /// API base URL, without trailing slash.
    pub api_url: String,
    /// API credentials.
    pub credentials: Credentials,
    /// Interval between property polls.
    pub poll_interval: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
}

impl ArduinoClientConfig {
    /// Build from relay settings.
    #[must_use]
    pub fn from_settings(cloud: &CloudSettings, credentials: Credentials) -> Self {
        Self {
            api_url: cloud.api_url.clone(),
            credentials,
            poll_interval: cloud.poll_interval,
            request_timeout: cloud.request_timeout,
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

/// `CloudConnector` backed by the Arduino IoT Cloud REST API.
#[derive(Debug, Clone)]
pub struct ArduinoCloudConnector {
    api: Arc<ArduinoApi>,
    poll_interval: Duration,
}

impl ArduinoCloudConnector {
    /// Create a connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the credentials
    /// are empty.
    pub fn new(config: ArduinoClientConfig) -> Result<Self, CloudError> {
        if config.credentials.client_id().is_empty()
            || config.credentials.client_secret().is_empty()
        {
            return Err(CloudError::Auth("client id and secret are required".into()));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CloudError::Request(e.to_string()))?;

        let tokens = TokenManager::new(client.clone(), &config.api_url, config.credentials);

        Ok(Self {
            api: Arc::new(ArduinoApi {
                client,
                api_url: config.api_url,
                tokens,
            }),
            poll_interval: config.poll_interval,
        })
    }
}

#[async_trait]
impl CloudConnector for ArduinoCloudConnector {
    async fn connect(
        &self,
        thing_id: &str,
        properties: &[PropertyName],
    ) -> Result<CloudSession, CloudError> {
        tracing::info!(thing_id, "Connecting to Arduino IoT Cloud");

        self.api.tokens.refresh().await?;
        let initial = self.api.list_properties_with_retry(thing_id).await?;

        let mut tracker = ChangeTracker::new(properties);
        let first_batch = tracker.observe(&initial);

        tracing::info!(
            thing_id,
            listed = initial.len(),
            initial_values = first_batch.len(),
            "Arduino IoT Cloud session established"
        );

        let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();

        let poller = Poller {
            api: Arc::clone(&self.api),
            thing_id: thing_id.to_string(),
            interval: self.poll_interval,
            tracker,
            tx,
            stop: stop.clone(),
        };
        tokio::spawn(poller.run(first_batch));

        Ok(CloudSession::with_stop(rx, stop))
    }
}

// =============================================================================
// API Calls
// =============================================================================

#[derive(Debug)]
struct ArduinoApi {
    client: Client,
    api_url: String,
    tokens: TokenManager,
}

impl ArduinoApi {
    /// List properties, refreshing the token once on 401.
    async fn list_properties_with_retry(
        &self,
        thing_id: &str,
    ) -> Result<Vec<ThingProperty>, CloudError> {
        match self.list_properties(thing_id).await {
            Err(CloudError::Auth(reason)) => {
                tracing::info!(%reason, "Arduino API token rejected, refreshing");
                self.tokens.invalidate();
                self.list_properties(thing_id).await
            }
            other => other,
        }
    }

    async fn list_properties(&self, thing_id: &str) -> Result<Vec<ThingProperty>, CloudError> {
        let token = self.tokens.bearer().await?;
        let url = format!("{}/iot/v2/things/{thing_id}/properties", self.api_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| CloudError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message().map(str::to_string))
                .unwrap_or_else(|| truncate(&body));

            return Err(if status == StatusCode::UNAUTHORIZED {
                CloudError::Auth(detail)
            } else {
                CloudError::Status {
                    status: status.as_u16(),
                    body: detail,
                }
            });
        }

        response
            .json()
            .await
            .map_err(|e| CloudError::Decode(format!("property list: {e}")))
    }
}

// =============================================================================
// Change Tracking
// =============================================================================

/// Remembers the last `value_updated_at` and value seen per monitored
/// variable.
///
/// A reading is new when its timestamp advanced. Readings without a
/// timestamp are new when the value differs from the last one seen.
#[derive(Debug)]
struct ChangeTracker {
    monitored: HashSet<&'static str>,
    seen: HashMap<String, (Option<DateTime<Utc>>, PropertyValue)>,
}

impl ChangeTracker {
    fn new(properties: &[PropertyName]) -> Self {
        Self {
            monitored: properties.iter().map(|p| p.as_str()).collect(),
            seen: HashMap::new(),
        }
    }

    /// Events for every monitored property reported since the last call.
    #[allow(clippy::float_cmp)]
    fn observe(&mut self, properties: &[ThingProperty]) -> Vec<CloudEvent> {
        let mut events = Vec::new();

        for prop in properties {
            let key = prop.key();
            if !self.monitored.contains(key) {
                continue;
            }
            let Some(value) = prop.numeric_value() else {
                tracing::debug!(property = key, "Skipping property without numeric value");
                continue;
            };

            let updated_at = prop.value_updated_at;
            let is_new = match self.seen.get(key) {
                None => true,
                Some((previous_at, previous_value)) => match (updated_at, previous_at) {
                    (Some(now), Some(before)) => now > *before,
                    (Some(_), None) => true,
                    (None, _) => value != *previous_value,
                },
            };

            if is_new {
                self.seen.insert(key.to_string(), (updated_at, value));
                events.push(CloudEvent::PropertyValue {
                    property: key.to_string(),
                    value,
                });
            }
        }

        events
    }
}

// =============================================================================
// Poll Loop
// =============================================================================

struct Poller {
    api: Arc<ArduinoApi>,
    thing_id: String,
    interval: Duration,
    tracker: ChangeTracker,
    tx: mpsc::Sender<CloudEvent>,
    stop: CancellationToken,
}

impl Poller {
    async fn run(mut self, first_batch: Vec<CloudEvent>) {
        if !self.emit(first_batch).await {
            return;
        }

        loop {
            tokio::select! {
                () = self.stop.cancelled() => {
                    tracing::debug!(thing_id = %self.thing_id, "Arduino poller stopped");
                    return;
                }
                () = tokio::time::sleep(self.interval) => {}
            }

            let properties = match self.api.list_properties_with_retry(&self.thing_id).await {
                Ok(properties) => properties,
                Err(e) => {
                    tracing::warn!(thing_id = %self.thing_id, error = %e, "Arduino poll failed");
                    let _ = self
                        .tx
                        .send(CloudEvent::Disconnected {
                            reason: e.to_string(),
                        })
                        .await;
                    return;
                }
            };

            let events = self.tracker.observe(&properties);
            if !self.emit(events).await {
                return;
            }
        }
    }

    /// Send events in order. Returns `false` once the session is gone.
    async fn emit(&self, events: Vec<CloudEvent>) -> bool {
        for event in events {
            if self.tx.send(event).await.is_err() {
                tracing::debug!(thing_id = %self.thing_id, "Cloud session dropped");
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str, value: f64, at: Option<&str>) -> ThingProperty {
        ThingProperty {
            id: None,
            name: format!("{name} display"),
            variable_name: Some(name.to_string()),
            last_value: Some(serde_json::json!(value)),
            value_updated_at: at.map(|s| s.parse().unwrap()),
        }
    }

    fn values(events: &[CloudEvent]) -> Vec<(String, f64)> {
        events
            .iter()
            .filter_map(|e| match e {
                CloudEvent::PropertyValue { property, value } => Some((property.clone(), *value)),
                CloudEvent::Disconnected { .. } => None,
            })
            .collect()
    }

    #[test]
    fn first_poll_emits_all_monitored_values() {
        let mut tracker = ChangeTracker::new(&PropertyName::ALL);
        let events = tracker.observe(&[
            prop("fRS1", 1.0, Some("2025-01-01T00:00:00Z")),
            prop("alertStatus", 0.0, None),
            prop("batteryLevel", 90.0, Some("2025-01-01T00:00:00Z")),
        ]);

        assert_eq!(
            values(&events),
            vec![("fRS1".into(), 1.0), ("alertStatus".into(), 0.0)]
        );
    }

    #[test]
    fn only_advanced_timestamps_are_emitted() {
        let mut tracker = ChangeTracker::new(&PropertyName::ALL);
        tracker.observe(&[
            prop("fRS1", 1.0, Some("2025-01-01T00:00:00Z")),
            prop("fRS2", 2.0, Some("2025-01-01T00:00:00Z")),
        ]);

        let events = tracker.observe(&[
            prop("fRS1", 1.0, Some("2025-01-01T00:00:05Z")),
            prop("fRS2", 2.0, Some("2025-01-01T00:00:00Z")),
        ]);

        assert_eq!(values(&events), vec![("fRS1".into(), 1.0)]);
    }

    #[test]
    fn unmonitored_names_are_skipped() {
        let mut tracker = ChangeTracker::new(&[PropertyName::Frs1]);
        let events = tracker.observe(&[
            prop("fRS1", 1.0, Some("2025-01-01T00:00:00Z")),
            prop("fRS2", 2.0, Some("2025-01-01T00:00:00Z")),
        ]);
        assert_eq!(values(&events), vec![("fRS1".into(), 1.0)]);
    }

    #[test]
    fn value_without_timestamp_is_not_repeated() {
        let mut tracker = ChangeTracker::new(&PropertyName::ALL);
        tracker.observe(&[prop("highestAccTime", 30.0, None)]);
        let events = tracker.observe(&[prop("highestAccTime", 30.0, None)]);
        assert!(events.is_empty());
    }

    #[test]
    fn changed_value_without_timestamp_is_emitted() {
        let mut tracker = ChangeTracker::new(&PropertyName::ALL);
        tracker.observe(&[prop("alertStatus", 0.0, Some("2025-01-01T00:00:00Z"))]);

        let events = tracker.observe(&[prop("alertStatus", 4.0, None)]);
        assert_eq!(values(&events), vec![("alertStatus".into(), 4.0)]);

        let events = tracker.observe(&[prop("alertStatus", 4.0, None)]);
        assert!(events.is_empty());
    }

    #[test]
    fn empty_credentials_rejected() {
        let config = ArduinoClientConfig {
            api_url: "http://localhost".into(),
            credentials: Credentials::new(String::new(), "secret".into()),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            ArduinoCloudConnector::new(config),
            Err(CloudError::Auth(_))
        ));
    }
}
