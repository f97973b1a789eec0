//! Fanout Broadcaster
//!
//! Delivers every property update to every connected dashboard session.
//!
//! # Ordering
//!
//! Registering a session (snapshot capture + insert) and publishing an
//! update both run under the session-set lock, and the sync pipeline writes
//! the store before it publishes. A new session therefore sees each property
//! either in its snapshot, or in its snapshot and then as an update, never
//! an older value after a newer one.
//!
//! # Slow Consumers
//!
//! Each session has a bounded queue. A session whose queue is full when an
//! update arrives is evicted: its sender is dropped, the push-channel
//! handler sees the queue close and drops the socket, and the client's
//! reconnect starts over from a fresh snapshot. Updates are never silently
//! skipped for a session that stays registered.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use inflatacare_core::{PropertyName, PropertyValue, PushEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::application::ports::UpdatePublisher;
use crate::domain::PropertyStore;
use crate::infrastructure::metrics;

/// Default per-session queue capacity.
pub const DEFAULT_SESSION_BUFFER: usize = 256;

// =============================================================================
// Session
// =============================================================================

/// Identifier of one push-channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A registered session's receiving end.
///
/// The first event is always the `all-properties` snapshot.
#[derive(Debug)]
pub struct Session {
    /// Session identifier, used to unregister.
    pub id: SessionId,
    /// Outbound events for this session.
    pub events: mpsc::Receiver<PushEvent>,
}

// =============================================================================
// Fanout
// =============================================================================

/// Broadcaster statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutStats {
    /// Currently registered sessions.
    pub sessions: usize,
    /// Updates published since startup.
    pub updates_published: u64,
    /// Sessions evicted for falling behind.
    pub sessions_evicted: u64,
}

/// Session registry and update broadcaster.
pub struct Fanout {
    store: Arc<PropertyStore>,
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<PushEvent>>>,
    session_buffer: usize,
    updates_published: AtomicU64,
    sessions_evicted: AtomicU64,
}

/// Shared fanout reference.
pub type SharedFanout = Arc<Fanout>;

impl Fanout {
    /// Create a broadcaster reading snapshots from `store`.
    ///
    /// A `session_buffer` of zero is raised to one.
    #[must_use]
    pub fn new(store: Arc<PropertyStore>, session_buffer: usize) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            session_buffer: session_buffer.max(1),
            updates_published: AtomicU64::new(0),
            sessions_evicted: AtomicU64::new(0),
        }
    }

    /// Register a new session and queue the current snapshot as its first
    /// event.
    pub fn on_client_connect(&self) -> Session {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(self.session_buffer);

        let mut sessions = self.sessions.lock();
        let snapshot = self.store.snapshot();
        let property_count = snapshot.len();
        // Fresh channel with capacity >= 1 always has room.
        let _ = tx.try_send(PushEvent::AllProperties(snapshot));
        sessions.insert(id, tx);
        let active = sessions.len();
        drop(sessions);

        metrics::set_active_sessions(active);
        tracing::info!(session = %id, active, property_count, "Client session opened");

        Session { id, events: rx }
    }

    /// Queue an update for every registered session.
    ///
    /// Returns the number of sessions the update was queued for.
    pub fn publish_update(&self, property: PropertyName, value: PropertyValue) -> usize {
        let event = PushEvent::update(property, value);
        let mut evicted = Vec::new();
        let mut closed = 0_usize;

        let mut sessions = self.sessions.lock();
        sessions.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                evicted.push(*id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                closed += 1;
                false
            }
        });
        let delivered = sessions.len();
        drop(sessions);

        self.updates_published.fetch_add(1, Ordering::Relaxed);
        metrics::record_fanout(property, delivered);

        if !evicted.is_empty() || closed > 0 {
            self.sessions_evicted
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            for id in &evicted {
                tracing::warn!(session = %id, %property, "Evicting slow client session");
                metrics::record_session_evicted();
            }
            metrics::set_active_sessions(delivered);
        }

        delivered
    }

    /// Unregister a session. Returns `false` if it was already gone.
    pub fn on_client_disconnect(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(&id).is_some();
        let active = sessions.len();
        drop(sessions);

        if removed {
            metrics::set_active_sessions(active);
            tracing::info!(session = %id, active, "Client session closed");
        }
        removed
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Broadcaster statistics.
    #[must_use]
    pub fn stats(&self) -> FanoutStats {
        FanoutStats {
            sessions: self.session_count(),
            updates_published: self.updates_published.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
        }
    }
}

impl UpdatePublisher for Fanout {
    fn publish_update(&self, property: PropertyName, value: PropertyValue) -> usize {
        Self::publish_update(self, property, value)
    }
}

impl fmt::Debug for Fanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fanout")
            .field("session_buffer", &self.session_buffer)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use inflatacare_core::PropertySnapshot;

    use super::*;

    fn fanout_with(buffer: usize) -> (Arc<PropertyStore>, Fanout) {
        let store = Arc::new(PropertyStore::new());
        let fanout = Fanout::new(Arc::clone(&store), buffer);
        (store, fanout)
    }

    #[tokio::test]
    async fn first_event_is_snapshot() {
        let (store, fanout) = fanout_with(8);
        store.set(PropertyName::Frs1, 3.0);

        let mut session = fanout.on_client_connect();
        let first = session.events.recv().await.unwrap();

        let expected: PropertySnapshot = [(PropertyName::Frs1, 3.0)].into_iter().collect();
        assert_eq!(first, PushEvent::AllProperties(expected));
    }

    #[tokio::test]
    async fn empty_store_sends_empty_snapshot() {
        let (_store, fanout) = fanout_with(8);
        let mut session = fanout.on_client_connect();

        assert_eq!(
            session.events.recv().await.unwrap(),
            PushEvent::AllProperties(PropertySnapshot::new())
        );
    }

    #[tokio::test]
    async fn publish_reaches_every_session() {
        let (_store, fanout) = fanout_with(8);
        let mut a = fanout.on_client_connect();
        let mut b = fanout.on_client_connect();
        let _ = a.events.recv().await;
        let _ = b.events.recv().await;

        let reached = fanout.publish_update(PropertyName::HighestAccTime, 42.0);

        assert_eq!(reached, 2);
        let expected = PushEvent::update(PropertyName::HighestAccTime, 42.0);
        assert_eq!(a.events.recv().await.unwrap(), expected);
        assert_eq!(b.events.recv().await.unwrap(), expected);
    }

    #[test]
    fn publish_with_no_sessions_is_noop() {
        let (_store, fanout) = fanout_with(8);
        assert_eq!(fanout.publish_update(PropertyName::Frs1, 1.0), 0);
        assert_eq!(fanout.stats().updates_published, 1);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (_store, fanout) = fanout_with(8);
        let session = fanout.on_client_connect();

        assert!(fanout.on_client_disconnect(session.id));
        assert!(!fanout.on_client_disconnect(session.id));
        assert_eq!(fanout.session_count(), 0);
    }

    #[tokio::test]
    async fn disconnected_session_stops_receiving() {
        let (_store, fanout) = fanout_with(8);
        let mut gone = fanout.on_client_connect();
        let mut stays = fanout.on_client_connect();
        let _ = gone.events.recv().await;
        let _ = stays.events.recv().await;

        fanout.on_client_disconnect(gone.id);
        fanout.publish_update(PropertyName::Frs2, 5.0);

        assert!(gone.events.recv().await.is_none());
        assert_eq!(
            stays.events.recv().await.unwrap(),
            PushEvent::update(PropertyName::Frs2, 5.0)
        );
    }

    #[tokio::test]
    async fn full_session_is_evicted_others_unaffected() {
        let (_store, fanout) = fanout_with(2);
        // Never drained: snapshot occupies one of its two slots.
        let mut slow = fanout.on_client_connect();
        let mut fast = fanout.on_client_connect();
        let _ = fast.events.recv().await;

        assert_eq!(fanout.publish_update(PropertyName::Frs1, 1.0), 2);
        let _ = fast.events.recv().await;

        assert_eq!(fanout.publish_update(PropertyName::Frs1, 2.0), 1);
        assert_eq!(fanout.stats().sessions_evicted, 1);
        assert!(!fanout.on_client_disconnect(slow.id));

        assert!(matches!(
            slow.events.recv().await,
            Some(PushEvent::AllProperties(_))
        ));
        assert_eq!(
            slow.events.recv().await.unwrap(),
            PushEvent::update(PropertyName::Frs1, 1.0)
        );
        assert!(slow.events.recv().await.is_none());
        assert_eq!(
            fast.events.recv().await.unwrap(),
            PushEvent::update(PropertyName::Frs1, 2.0)
        );
    }

    #[test]
    fn dropped_receiver_is_pruned_on_publish() {
        let (_store, fanout) = fanout_with(8);
        let session = fanout.on_client_connect();
        drop(session.events);

        assert_eq!(fanout.publish_update(PropertyName::Frs3, 1.0), 0);
        assert_eq!(fanout.session_count(), 0);
        assert_eq!(fanout.stats().sessions_evicted, 0);
    }

    #[test]
    fn zero_buffer_is_raised_to_one() {
        let (_store, fanout) = fanout_with(0);
        let session = fanout.on_client_connect();
        assert_eq!(session.events.len(), 1);
    }
}
