//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `CloudConnector`: opens a property session against the IoT cloud
//! - `UpdatePublisher`: delivers a property update to connected clients
//!
//! A connector replaces per-property callbacks with a typed event stream:
//! once `connect` succeeds, every reported value and the eventual disconnect
//! arrive as `CloudEvent`s on the session's channel.

use async_trait::async_trait;
use inflatacare_core::{PropertyName, PropertyValue};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

// =============================================================================
// Cloud Events
// =============================================================================

/// Event produced by an open cloud session.
#[derive(Debug, Clone, PartialEq)]
pub enum CloudEvent {
    /// The cloud reported a value for a variable.
    ///
    /// The name is passed through as received; the sync service decides
    /// whether it belongs to the monitored set.
    PropertyValue {
        /// Cloud variable name.
        property: String,
        /// Reported value.
        value: PropertyValue,
    },
    /// The session ended. No further events follow.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
}

/// An established cloud session.
///
/// Dropping the session stops the producer behind it.
#[derive(Debug)]
pub struct CloudSession {
    events: mpsc::Receiver<CloudEvent>,
    _stop: Option<DropGuard>,
}

impl CloudSession {
    /// Wrap an event channel with no background producer to stop.
    #[must_use]
    pub const fn new(events: mpsc::Receiver<CloudEvent>) -> Self {
        Self {
            events,
            _stop: None,
        }
    }

    /// Wrap an event channel whose producer is stopped by `stop`.
    #[must_use]
    pub fn with_stop(events: mpsc::Receiver<CloudEvent>, stop: CancellationToken) -> Self {
        Self {
            events,
            _stop: Some(stop.drop_guard()),
        }
    }

    /// Next event, or `None` once the producer has gone away.
    pub async fn next_event(&mut self) -> Option<CloudEvent> {
        self.events.recv().await
    }
}

// =============================================================================
// Cloud Errors
// =============================================================================

/// Errors from a connect attempt or an open session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloudError {
    /// Credentials were rejected or no token was issued.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The request could not be sent or timed out.
    #[error("request failed: {0}")]
    Request(String),

    /// The API answered with an unexpected status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl CloudError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Request(_) => "request",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
        }
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Opens property sessions against the IoT cloud.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudConnector: Send + Sync {
    /// Authenticate and open a session streaming `properties` of `thing_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication or session setup fails.
    async fn connect(
        &self,
        thing_id: &str,
        properties: &[PropertyName],
    ) -> Result<CloudSession, CloudError>;
}

/// Delivers property updates to connected clients.
#[cfg_attr(test, mockall::automock)]
pub trait UpdatePublisher: Send + Sync {
    /// Publish one update, returning how many clients it was queued for.
    fn publish_update(&self, property: PropertyName, value: PropertyValue) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_session_cancels_producer() {
        let (_tx, rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let session = CloudSession::with_stop(rx, stop.clone());

        assert!(!stop.is_cancelled());
        drop(session);
        assert!(stop.is_cancelled());
    }

    #[tokio::test]
    async fn session_yields_events_in_order() {
        let (tx, rx) = mpsc::channel(4);
        let mut session = CloudSession::new(rx);

        tx.send(CloudEvent::PropertyValue {
            property: "fRS1".into(),
            value: 1.0,
        })
        .await
        .unwrap();
        tx.send(CloudEvent::Disconnected {
            reason: "closed".into(),
        })
        .await
        .unwrap();
        drop(tx);

        assert!(matches!(
            session.next_event().await,
            Some(CloudEvent::PropertyValue { .. })
        ));
        assert!(matches!(
            session.next_event().await,
            Some(CloudEvent::Disconnected { .. })
        ));
        assert!(session.next_event().await.is_none());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(CloudError::Auth("x".into()).kind(), "auth");
        assert_eq!(
            CloudError::Status {
                status: 500,
                body: String::new()
            }
            .kind(),
            "status"
        );
    }
}
