//! WebSocket push channel.
//!
//! Each connection registers a fanout session, forwards its queued events as
//! JSON text frames and unregisters on exit. Client data frames are read
//! only to notice close. When the fanout evicts the session its queue
//! closes and the socket is closed, so the client reconnects and receives a
//! fresh snapshot.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use inflatacare_core::PushCodec;

use super::AppState;

/// `GET /ws`
pub(super) async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = state.fanout.on_client_connect();
    let id = session.id;
    let mut events = session.events;
    let codec = PushCodec::new();

    let (mut sender, mut receiver) = socket.split();

    let mut incoming = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(session = %id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(session = %id, error = %e, "WebSocket receive error");
                    break;
                }
                Ok(_) => {}
            }
        }
    });

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!(session = %id, "Session queue closed, closing socket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                };
                let text = match codec.encode(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(session = %id, error = %e, "Failed to encode push event");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    tracing::debug!(session = %id, "Client went away");
                    break;
                }
            }
            _ = &mut incoming => {
                break;
            }
        }
    }

    incoming.abort();
    state.fanout.on_client_disconnect(id);
}
