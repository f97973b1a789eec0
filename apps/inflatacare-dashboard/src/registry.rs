//! Subscription Registry
//!
//! Local copy of the relay's property values plus per-property callback
//! sets. The push channel feeds it snapshots and updates; views subscribe to
//! the properties they display.
//!
//! # Delivery Rules
//!
//! - `subscribe` delivers the current value, if any, before it returns
//! - a snapshot notifies subscribers of every property it contains
//! - an update notifies only that property's subscribers
//! - once `unsubscribe` returns, the callback is never invoked again
//!
//! Callbacks run without the state lock held, so they may read the registry
//! and subscribe or unsubscribe. Notification passes are serialized by a
//! reentrant dispatch lock: an unsubscribe from another thread waits for the
//! running pass to finish, while one from inside a callback takes effect for
//! the rest of that pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use inflatacare_core::{PropertyName, PropertySnapshot, PropertyValue, PushEvent};
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::watch;

/// Callback invoked with a property's new value.
pub type Callback = Arc<dyn Fn(PropertyValue) + Send + Sync>;

// =============================================================================
// Connection Status
// =============================================================================

/// Push channel connection status, published independently of values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// Opening the WebSocket.
    Connecting,
    /// Receiving events.
    Connected,
    /// Last attempt failed.
    Error(String),
}

impl ConnectionStatus {
    /// Whether events are flowing.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

// =============================================================================
// Registry State
// =============================================================================

struct Subscriber {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback,
}

#[derive(Default)]
struct State {
    values: BTreeMap<PropertyName, PropertyValue>,
    subscribers: HashMap<PropertyName, Vec<Subscriber>>,
    next_id: u64,
}

impl State {
    /// Active callbacks for `property`, in registration order.
    fn callbacks(&self, property: PropertyName) -> Vec<(Arc<AtomicBool>, Callback)> {
        self.subscribers
            .get(&property)
            .map(|subs| {
                subs.iter()
                    .map(|s| (Arc::clone(&s.active), Arc::clone(&s.callback)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

struct Shared {
    dispatch: ReentrantMutex<()>,
    state: Mutex<State>,
    status: watch::Sender<ConnectionStatus>,
}

impl Shared {
    fn remove(&self, property: PropertyName, id: u64) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let Some(subs) = state.subscribers.get_mut(&property) else {
                return false;
            };
            let removed = subs.iter().position(|s| s.id == id).map(|i| subs.remove(i));
            if subs.is_empty() {
                state.subscribers.remove(&property);
            }
            removed
        };
        // The callback may own other subscriptions; drop it unlocked.
        removed.is_some()
    }
}

fn notify(pending: Vec<(PropertyName, PropertyValue, Vec<(Arc<AtomicBool>, Callback)>)>) {
    for (_, value, callbacks) in pending {
        for (active, callback) in callbacks {
            if active.load(Ordering::Acquire) {
                callback(value);
            }
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Property values and subscribers on the client side.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    shared: Arc<Shared>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                dispatch: ReentrantMutex::new(()),
                state: Mutex::new(State::default()),
                status,
            }),
        }
    }

    /// Register `callback` for `property`.
    ///
    /// If a value is already known it is delivered once, synchronously,
    /// before this returns.
    pub fn subscribe<F>(&self, property: PropertyName, callback: F) -> Subscription
    where
        F: Fn(PropertyValue) + Send + Sync + 'static,
    {
        let _dispatch = self.shared.dispatch.lock();

        let callback: Callback = Arc::new(callback);
        let active = Arc::new(AtomicBool::new(true));

        let (id, current) = {
            let mut state = self.shared.state.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.entry(property).or_default().push(Subscriber {
                id,
                active: Arc::clone(&active),
                callback: Arc::clone(&callback),
            });
            (id, state.values.get(&property).copied())
        };

        tracing::trace!(%property, id, "Subscribed");

        if let Some(value) = current {
            callback(value);
        }

        Subscription {
            shared: Arc::downgrade(&self.shared),
            property,
            id,
            active,
            released: false,
        }
    }

    /// Replace local state with `snapshot` and notify subscribers of every
    /// property it contains.
    pub fn apply_snapshot(&self, snapshot: PropertySnapshot) {
        let _dispatch = self.shared.dispatch.lock();

        let pending: Vec<_> = {
            let mut state = self.shared.state.lock();
            state.values = snapshot.iter().collect();
            snapshot
                .iter()
                .map(|(name, value)| (name, value, state.callbacks(name)))
                .collect()
        };

        tracing::debug!(properties = pending.len(), "Applied snapshot");
        notify(pending);
    }

    /// Record a new value for `property` and notify its subscribers.
    pub fn apply_update(&self, property: PropertyName, value: PropertyValue) {
        let _dispatch = self.shared.dispatch.lock();

        let callbacks = {
            let mut state = self.shared.state.lock();
            state.values.insert(property, value);
            state.callbacks(property)
        };

        notify(vec![(property, value, callbacks)]);
    }

    /// Dispatch a push channel event.
    pub fn handle_event(&self, event: PushEvent) {
        match event {
            PushEvent::AllProperties(snapshot) => self.apply_snapshot(snapshot),
            PushEvent::PropertyUpdate(update) => self.apply_update(update.property, update.value),
        }
    }

    /// Last known value of `property`.
    #[must_use]
    pub fn value(&self, property: PropertyName) -> Option<PropertyValue> {
        self.shared.state.lock().values.get(&property).copied()
    }

    /// All known values.
    #[must_use]
    pub fn values(&self) -> PropertySnapshot {
        self.shared
            .state
            .lock()
            .values
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect()
    }

    /// Number of callbacks registered for `property`.
    #[must_use]
    pub fn subscriber_count(&self, property: PropertyName) -> usize {
        self.shared
            .state
            .lock()
            .subscribers
            .get(&property)
            .map_or(0, Vec::len)
    }

    /// Properties with at least one callback.
    #[must_use]
    pub fn subscribed_properties(&self) -> Vec<PropertyName> {
        let mut names: Vec<_> = self.shared.state.lock().subscribers.keys().copied().collect();
        names.sort();
        names
    }

    /// Value accessor for views: a `watch` receiver tracking `property`.
    pub fn watch_property(&self, property: PropertyName) -> PropertyWatch {
        // Held across the initial delivery so no update slips in before
        // the receiver is marked as seen.
        let _dispatch = self.shared.dispatch.lock();

        let (tx, mut rx) = watch::channel(None);
        let subscription = self.subscribe(property, move |value| {
            tx.send_replace(Some(value));
        });
        rx.mark_unchanged();

        PropertyWatch {
            property,
            receiver: rx,
            _subscription: subscription,
        }
    }

    /// Publish a connection status change.
    pub fn set_status(&self, status: ConnectionStatus) {
        self.shared.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                tracing::debug!(from = ?current, to = ?status, "Connection status changed");
                *current = status;
                true
            }
        });
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver for connection status changes.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SubscriptionRegistry")
            .field("values", &state.values)
            .field("subscribed", &state.subscribers.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Subscription Handles
// =============================================================================

/// Handle for one registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    property: PropertyName,
    id: u64,
    active: Arc<AtomicBool>,
    released: bool,
}

impl Subscription {
    /// Property this subscription watches.
    #[must_use]
    pub const fn property(&self) -> PropertyName {
        self.property
    }

    /// Remove this callback. Other callbacks for the property are kept.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.active.store(false, Ordering::Release);

        if let Some(shared) = self.shared.upgrade() {
            let _dispatch = shared.dispatch.lock();
            if shared.remove(self.property, self.id) {
                tracing::trace!(property = %self.property, id = self.id, "Unsubscribed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("property", &self.property)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A property value that views read and await.
#[derive(Debug)]
pub struct PropertyWatch {
    property: PropertyName,
    receiver: watch::Receiver<Option<PropertyValue>>,
    _subscription: Subscription,
}

impl PropertyWatch {
    /// Property being watched.
    #[must_use]
    pub const fn property(&self) -> PropertyName {
        self.property
    }

    /// Latest value, `None` until the first one arrives.
    #[must_use]
    pub fn get(&self) -> Option<PropertyValue> {
        *self.receiver.borrow()
    }

    /// Wait for the next value.
    ///
    /// Returns `None` if the registry has been dropped.
    pub async fn changed(&mut self) -> Option<PropertyValue> {
        self.receiver.changed().await.ok()?;
        *self.receiver.borrow_and_update()
    }

    /// A receiver to hand to a view.
    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<Option<PropertyValue>> {
        self.receiver.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
