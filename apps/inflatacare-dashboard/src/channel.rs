//! Push Channel Client
//!
//! WebSocket client for the relay's push channel. Every decoded event is
//! handed to the `SubscriptionRegistry` before the next frame is read.
//!
//! # Connection Lifecycle
//!
//! ```text
//! Disconnected ─► Connecting ─► Connected ─► Disconnected ─► Connecting ...
//!                     │
//!                     └─► Error(reason) ─► (backoff) ─► Connecting
//! ```
//!
//! Retries use exponential backoff with jitter and never give up unless the
//! policy sets an attempt cap. The first frame of every connection is a
//! fresh snapshot, so nothing has to be replayed after a reconnect.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use inflatacare_core::{PushCodec, ReconnectPolicy};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::registry::{ConnectionStatus, SubscriptionRegistry};

/// Push channel client errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// WebSocket handshake or transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay closed the connection.
    #[error("connection closed by relay")]
    ConnectionClosed,

    /// The reconnect policy ran out of attempts.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

/// Push channel client.
pub struct PushChannelClient {
    config: ClientConfig,
    registry: SubscriptionRegistry,
    codec: PushCodec,
    cancel: CancellationToken,
}

impl PushChannelClient {
    /// Create a client feeding `registry`.
    #[must_use]
    pub const fn new(
        config: ClientConfig,
        registry: SubscriptionRegistry,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            codec: PushCodec::new(),
            cancel,
        }
    }

    /// Registry this client feeds.
    #[must_use]
    pub const fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Run the connection loop until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::MaxReconnectAttemptsExceeded` if the policy has
    /// an attempt cap and it is reached.
    pub async fn run(self: Arc<Self>) -> Result<(), ChannelError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(&mut reconnect_policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Push channel error");
                    self.registry.set_status(match e {
                        ChannelError::ConnectionClosed => ConnectionStatus::Disconnected,
                        other => ConnectionStatus::Error(other.to_string()),
                    });

                    let Some(delay) = reconnect_policy.next_delay() else {
                        return Err(ChannelError::MaxReconnectAttemptsExceeded);
                    };
                    tracing::info!(
                        attempt = reconnect_policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to relay"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("Push channel client stopped");
        self.registry.set_status(ConnectionStatus::Disconnected);
        Ok(())
    }

    /// Connect and process frames until the socket ends or we are cancelled.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), ChannelError> {
        self.registry.set_status(ConnectionStatus::Connecting);
        tracing::info!(url = %self.config.relay_url, "Connecting to relay");

        let connect = tokio_tungstenite::connect_async(self.config.relay_url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };

        policy.reset();
        self.registry.set_status(ConnectionStatus::Connected);
        tracing::info!("Connected to relay");

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Relay closed the push channel");
                            return Err(ChannelError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(event) => {
                tracing::trace!(event = event.name(), "Push event");
                self.registry.handle_event(event);
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed push frame"),
        }
    }
}

impl std::fmt::Debug for PushChannelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannelClient")
            .field("relay_url", &self.config.relay_url)
            .field("status", &self.registry.status())
            .finish_non_exhaustive()
    }
}
