//! Cloud Link
//!
//! Owns the connection to the IoT cloud: connect, pump property events into
//! the sync pipeline, and on any disconnect wait a fixed delay and try
//! again, forever. Failures are logged and reflected in `LinkState`; they
//! never stop the loop.
//!
//! At most one connect attempt runs at a time. A second `connect()` while
//! one is outstanding fails immediately with `LinkError::AttemptInFlight`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use inflatacare_core::{PropertyName, ReconnectConfig, ReconnectPolicy};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{CloudConnector, CloudError, CloudEvent, CloudSession};
use crate::application::services::{PropertySync, SyncOutcome};
use crate::domain::{LinkState, LinkStatus};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors from the cloud link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Another connect attempt is still running.
    #[error("a connect attempt is already in flight")]
    AttemptInFlight,

    /// The connector failed.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// The reconnect policy ran out of attempts.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the cloud link.
#[derive(Debug, Clone)]
pub struct CloudLinkConfig {
    /// Thing whose properties are relayed.
    pub thing_id: String,
    /// Properties to register interest in.
    pub properties: Vec<PropertyName>,
    /// Delay schedule between attempts.
    pub reconnect: ReconnectConfig,
}

impl CloudLinkConfig {
    /// All monitored properties of `thing_id`, fixed `reconnect_delay`, no
    /// attempt cap.
    #[must_use]
    pub fn new(thing_id: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            thing_id: thing_id.into(),
            properties: PropertyName::ALL.to_vec(),
            reconnect: ReconnectConfig::fixed(reconnect_delay),
        }
    }
}

// =============================================================================
// In-flight Guard
// =============================================================================

struct AttemptGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> AttemptGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Cloud Link
// =============================================================================

/// Connection manager for the IoT cloud.
pub struct CloudLink {
    config: CloudLinkConfig,
    connector: Arc<dyn CloudConnector>,
    sync: PropertySync,
    state: Arc<LinkState>,
    cancel: CancellationToken,
    in_flight: AtomicBool,
}

impl CloudLink {
    /// Create a link. Nothing happens until [`CloudLink::run`] or
    /// [`CloudLink::connect`] is called.
    #[must_use]
    pub fn new(
        config: CloudLinkConfig,
        connector: Arc<dyn CloudConnector>,
        sync: PropertySync,
        state: Arc<LinkState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            connector,
            sync,
            state,
            cancel,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Shared link state.
    #[must_use]
    pub fn state(&self) -> Arc<LinkState> {
        Arc::clone(&self.state)
    }

    /// Make one connect attempt.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::AttemptInFlight` if another attempt is running,
    /// or `LinkError::Cloud` if the connector fails.
    pub async fn connect(&self) -> Result<CloudSession, LinkError> {
        let _guard = AttemptGuard::acquire(&self.in_flight).ok_or(LinkError::AttemptInFlight)?;

        if self.state.status() == LinkStatus::Disconnected {
            self.state.set_status(LinkStatus::Connecting);
        }

        match self
            .connector
            .connect(&self.config.thing_id, &self.config.properties)
            .await
        {
            Ok(session) => {
                self.state.set_status(LinkStatus::Connected);
                metrics::set_cloud_connected(true);
                tracing::info!(thing_id = %self.config.thing_id, "Connected to IoT cloud");
                Ok(session)
            }
            Err(e) => {
                self.state.set_error(e.to_string());
                metrics::record_cloud_error(e.kind());
                tracing::error!(thing_id = %self.config.thing_id, error = %e, "Failed to connect to IoT cloud");
                Err(e.into())
            }
        }
    }

    /// Run the connect/pump/retry loop until cancelled.
    ///
    /// # Errors
    ///
    /// Only returns an error if the reconnect policy has an attempt cap and
    /// it is reached. The default policy retries forever.
    pub async fn run(self: Arc<Self>) -> Result<(), LinkError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Cloud link cancelled");
                return Ok(());
            }

            let attempt = tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Cloud link cancelled during connect");
                    return Ok(());
                }
                attempt = self.connect() => attempt,
            };

            if let Ok(session) = attempt {
                policy.reset();

                let reason = tokio::select! {
                    () = self.cancel.cancelled() => {
                        tracing::info!("Cloud link cancelled");
                        self.state.set_status(LinkStatus::Disconnected);
                        metrics::set_cloud_connected(false);
                        return Ok(());
                    }
                    reason = self.pump(session) => reason,
                };

                tracing::error!(%reason, "Disconnected from IoT cloud");
                self.state.set_status(LinkStatus::Disconnected);
                self.state.set_error(reason);
                metrics::set_cloud_connected(false);
            }

            let Some(delay) = policy.next_delay() else {
                return Err(LinkError::MaxReconnectAttemptsExceeded);
            };

            self.state.set_status(LinkStatus::Reconnecting);
            self.state.increment_reconnect_attempts();
            metrics::record_reconnect();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to IoT cloud"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Cloud link cancelled during reconnect delay");
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Feed session events into the sync pipeline until the session ends.
    async fn pump(&self, mut session: CloudSession) -> String {
        while let Some(event) = session.next_event().await {
            match event {
                CloudEvent::PropertyValue { property, value } => {
                    self.state.increment_messages();
                    match self.sync.apply(&property, value) {
                        SyncOutcome::Published { property, .. } => {
                            metrics::record_property_update(property);
                        }
                        SyncOutcome::Ignored => metrics::record_unknown_property(),
                    }
                }
                CloudEvent::Disconnected { reason } => return reason,
            }
        }
        "cloud session closed".to_string()
    }
}

impl std::fmt::Debug for CloudLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudLink")
            .field("config", &self.config)
            .field("status", &self.state.status())
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tokio::sync::{Notify, mpsc};

    use super::*;
    use crate::application::ports::{MockCloudConnector, MockUpdatePublisher};
    use crate::domain::PropertyStore;

    fn link_with(
        connector: impl CloudConnector + 'static,
        publisher: MockUpdatePublisher,
    ) -> (Arc<CloudLink>, Arc<PropertyStore>, CancellationToken) {
        let store = Arc::new(PropertyStore::new());
        let cancel = CancellationToken::new();
        let link = CloudLink::new(
            CloudLinkConfig::new("thing-1", Duration::from_secs(5)),
            Arc::new(connector),
            PropertySync::new(Arc::clone(&store), Arc::new(publisher)),
            Arc::new(LinkState::new()),
            cancel.clone(),
        );
        (Arc::new(link), store, cancel)
    }

    #[tokio::test]
    async fn connect_registers_all_properties() {
        let mut connector = MockCloudConnector::new();
        connector
            .expect_connect()
            .withf(|thing, props| thing == "thing-1" && props == &PropertyName::ALL[..])
            .times(1)
            .returning(|_, _| {
                let (_tx, rx) = mpsc::channel(1);
                Ok(CloudSession::new(rx))
            });

        let (link, _store, _cancel) = link_with(connector, MockUpdatePublisher::new());
        link.connect().await.unwrap();

        let state = link.state();
        assert!(state.is_connected());
        assert!(state.ever_connected());
    }

    #[tokio::test]
    async fn failed_connect_is_reported_not_fatal() {
        let mut connector = MockCloudConnector::new();
        connector
            .expect_connect()
            .returning(|_, _| Err(CloudError::Auth("invalid_client".into())));

        let (link, _store, _cancel) = link_with(connector, MockUpdatePublisher::new());
        let err = link.connect().await.unwrap_err();

        assert_eq!(err, LinkError::Cloud(CloudError::Auth("invalid_client".into())));
        let state = link.state();
        assert!(!state.ever_connected());
        assert_eq!(state.status(), LinkStatus::Connecting);
        assert!(state.last_error().unwrap().contains("invalid_client"));
    }

    /// Connector that blocks until released.
    struct GatedConnector {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl CloudConnector for GatedConnector {
        async fn connect(
            &self,
            _thing_id: &str,
            _properties: &[PropertyName],
        ) -> Result<CloudSession, CloudError> {
            self.entered.notify_one();
            self.release.notified().await;
            Err(CloudError::Request("released".into()))
        }
    }

    #[tokio::test]
    async fn concurrent_connect_fails_fast() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let connector = GatedConnector {
            entered: Arc::clone(&entered),
            release: Arc::clone(&release),
        };
        let (link, _store, _cancel) = link_with(connector, MockUpdatePublisher::new());

        let first = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.connect().await }
        });
        entered.notified().await;

        assert_eq!(link.connect().await.unwrap_err(), LinkError::AttemptInFlight);

        release.notify_one();
        assert!(matches!(
            first.await.unwrap(),
            Err(LinkError::Cloud(CloudError::Request(_)))
        ));

        // Guard released: a new attempt reaches the connector again.
        let second = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.connect().await }
        });
        entered.notified().await;
        release.notify_one();
        assert!(matches!(second.await.unwrap(), Err(LinkError::Cloud(_))));
    }

    #[tokio::test]
    async fn run_pumps_events_into_store_and_publisher() {
        let (tx, rx) = mpsc::channel(8);
        let session = Arc::new(parking_lot::Mutex::new(Some(CloudSession::new(rx))));

        let mut connector = MockCloudConnector::new();
        connector.expect_connect().returning(move |_, _| {
            session
                .lock()
                .take()
                .ok_or_else(|| CloudError::Request("no more sessions".into()))
        });

        let mut publisher = MockUpdatePublisher::new();
        publisher.expect_publish_update().times(2).returning(|_, _| 1);

        let (link, store, cancel) = link_with(connector, publisher);
        let handle = tokio::spawn(Arc::clone(&link).run());

        tx.send(CloudEvent::PropertyValue {
            property: "fRS1".into(),
            value: 4.0,
        })
        .await
        .unwrap();
        tx.send(CloudEvent::PropertyValue {
            property: "unknownVar".into(),
            value: 9.0,
        })
        .await
        .unwrap();
        tx.send(CloudEvent::PropertyValue {
            property: "fRS1".into(),
            value: 5.0,
        })
        .await
        .unwrap();

        while link.state().messages_received() < 3 {
            tokio::task::yield_now().await;
        }

        assert_eq!(store.get(PropertyName::Frs1), Some(5.0));
        assert_eq!(store.len(), 1);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn capped_policy_gives_up() {
        let mut connector = MockCloudConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(|_, _| Err(CloudError::Request("refused".into())));

        let store = Arc::new(PropertyStore::new());
        let mut config = CloudLinkConfig::new("thing-1", Duration::from_millis(1));
        config.reconnect.max_attempts = 1;

        let link = Arc::new(CloudLink::new(
            config,
            Arc::new(connector),
            PropertySync::new(store, Arc::new(MockUpdatePublisher::new())),
            Arc::new(LinkState::new()),
            CancellationToken::new(),
        ));

        assert_eq!(
            link.run().await.unwrap_err(),
            LinkError::MaxReconnectAttemptsExceeded
        );
    }
}
