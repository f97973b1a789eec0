//! Cloud Link State
//!
//! Connection status of the Arduino IoT Cloud link, updated by the link's
//! retry loop and read by the REST gate and the health endpoints.
//!
//! `ever_connected` latches on the first successful connect and stays set
//! across later disconnects: the REST surface keeps serving cached values
//! while the link is retrying.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Connection status of the cloud link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// No session and no attempt running.
    #[default]
    Disconnected,
    /// First connect attempt in progress.
    Connecting,
    /// Session established and streaming.
    Connected,
    /// Waiting out the delay before another attempt.
    Reconnecting,
}

impl LinkStatus {
    /// Status name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Shared, lock-light view of the cloud link.
#[derive(Debug, Default)]
pub struct LinkState {
    status: RwLock<LinkStatus>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    ever_connected: AtomicBool,
    reconnect_attempts: AtomicU32,
    messages_received: AtomicU64,
}

impl LinkState {
    /// Create state for a link that has never connected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection status.
    ///
    /// Moving to `Connected` latches `ever_connected`, records the time and
    /// clears the retry counter and last error.
    pub fn set_status(&self, status: LinkStatus) {
        *self.status.write() = status;
        if status == LinkStatus::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
            self.ever_connected.store(true, Ordering::Release);
        }
    }

    /// Record a failure without changing the status.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    /// Count a retry.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a property event received from the cloud.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.status.read()
    }

    /// Whether a session is currently established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status() == LinkStatus::Connected
    }

    /// Whether the link has connected at least once since startup.
    #[must_use]
    pub fn ever_connected(&self) -> bool {
        self.ever_connected.load(Ordering::Acquire)
    }

    /// Retries since the last successful connect.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Property events received since startup.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Most recent failure, cleared on connect.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// When the link last connected.
    #[must_use]
    pub fn last_connected_at(&self) -> Option<DateTime<Utc>> {
        *self.last_connected_at.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_never_connected() {
        let state = LinkState::new();
        assert_eq!(state.status(), LinkStatus::Disconnected);
        assert!(!state.ever_connected());
        assert!(state.last_connected_at().is_none());
    }

    #[test]
    fn connect_latches_and_resets_counters() {
        let state = LinkState::new();
        state.increment_reconnect_attempts();
        state.increment_reconnect_attempts();
        state.set_error("token rejected");

        state.set_status(LinkStatus::Connected);

        assert!(state.is_connected());
        assert!(state.ever_connected());
        assert_eq!(state.reconnect_attempts(), 0);
        assert!(state.last_error().is_none());
        assert!(state.last_connected_at().is_some());
    }

    #[test]
    fn ever_connected_survives_disconnect() {
        let state = LinkState::new();
        state.set_status(LinkStatus::Connected);
        state.set_status(LinkStatus::Reconnecting);

        assert!(!state.is_connected());
        assert!(state.ever_connected());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LinkStatus::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
        assert_eq!(LinkStatus::Connecting.as_str(), "connecting");
    }
}
