//! Property Synchronization
//!
//! Every recognized cloud value has exactly two effects, in order: the store
//! is written, then the update is published. No batching and no filtering on
//! unchanged values; a repeated reading is republished.
//!
//! Names outside the monitored set are dropped with a warning. They never
//! reach the store or any client.

use std::sync::Arc;

use inflatacare_core::{PropertyName, PropertyValue};

use crate::application::ports::UpdatePublisher;
use crate::domain::PropertyStore;

/// Result of applying one cloud value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    /// Stored and published.
    Published {
        /// Property that was updated.
        property: PropertyName,
        /// Number of clients the update was queued for.
        sessions: usize,
    },
    /// Name not in the monitored set; ignored.
    Ignored,
}

/// Store-then-publish pipeline for cloud values.
pub struct PropertySync {
    store: Arc<PropertyStore>,
    publisher: Arc<dyn UpdatePublisher>,
}

impl PropertySync {
    /// Create a pipeline writing to `store` and publishing through `publisher`.
    #[must_use]
    pub fn new(store: Arc<PropertyStore>, publisher: Arc<dyn UpdatePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Apply a value reported under the cloud variable name `raw_name`.
    pub fn apply(&self, raw_name: &str, value: PropertyValue) -> SyncOutcome {
        let Ok(property) = raw_name.parse::<PropertyName>() else {
            tracing::warn!(property = raw_name, value, "Ignoring unknown cloud property");
            return SyncOutcome::Ignored;
        };

        self.store.set(property, value);
        let sessions = self.publisher.publish_update(property, value);

        tracing::debug!(%property, value, sessions, "Property update relayed");
        SyncOutcome::Published { property, sessions }
    }
}

impl std::fmt::Debug for PropertySync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySync")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::application::ports::MockUpdatePublisher;

    #[test]
    fn stores_before_publishing() {
        let store = Arc::new(PropertyStore::new());
        let observed = Arc::clone(&store);

        let mut publisher = MockUpdatePublisher::new();
        publisher
            .expect_publish_update()
            .with(eq(PropertyName::Frs4), eq(7.5))
            .times(1)
            .returning(move |name, value| {
                assert_eq!(observed.get(name), Some(value));
                3
            });

        let sync = PropertySync::new(Arc::clone(&store), Arc::new(publisher));
        let outcome = sync.apply("fRS4", 7.5);

        assert_eq!(
            outcome,
            SyncOutcome::Published {
                property: PropertyName::Frs4,
                sessions: 3
            }
        );
    }

    #[test]
    fn repeated_value_is_republished() {
        let mut publisher = MockUpdatePublisher::new();
        publisher.expect_publish_update().times(2).returning(|_, _| 1);

        let sync = PropertySync::new(Arc::new(PropertyStore::new()), Arc::new(publisher));
        sync.apply("alertStatus", 2.0);
        sync.apply("alertStatus", 2.0);
    }

    #[test]
    fn unknown_name_touches_nothing() {
        let store = Arc::new(PropertyStore::new());
        let mut publisher = MockUpdatePublisher::new();
        publisher.expect_publish_update().never();

        let sync = PropertySync::new(Arc::clone(&store), Arc::new(publisher));

        assert_eq!(sync.apply("batteryLevel", 80.0), SyncOutcome::Ignored);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn shared_fanout_publishes_to_sessions() {
        use inflatacare_core::PushEvent;

        use crate::infrastructure::fanout::Fanout;

        let store = Arc::new(PropertyStore::new());
        let fanout = Arc::new(Fanout::new(Arc::clone(&store), 8));
        let sync = PropertySync::new(Arc::clone(&store), Arc::<Fanout>::clone(&fanout));

        let mut session = fanout.on_client_connect();
        let _ = session.events.recv().await;

        assert_eq!(
            sync.apply("fRS5", 9.0),
            SyncOutcome::Published {
                property: PropertyName::Frs5,
                sessions: 1
            }
        );
        assert_eq!(
            session.events.recv().await.unwrap(),
            PushEvent::update(PropertyName::Frs5, 9.0)
        );
        assert_eq!(store.get(PropertyName::Frs5), Some(9.0));
    }
}
