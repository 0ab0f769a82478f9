//! WebSocket connection handle and read/write loop.
//!
//! Outbound messages go through a bounded channel to a writer task, so
//! replies and event pushes can be queued synchronously from anywhere in
//! the execution domain. Once the writer stops, every send on the handle
//! fails with [`TransportError::Closed`]; a client that stops reading
//! fills its queue and gets [`TransportError::Backlogged`]. Either way
//! the event hub treats the subscriber as dead.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::dispatch::handle_text;
use crate::app_state::{AppState, traffic};
use crate::domain::{RequestHead, SubscriberId};
use crate::error::TransportError;

/// Sending half of one WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsConnection {
    id: uuid::Uuid,
    tx: mpsc::Sender<String>,
}

/// Messages a connection may have queued before sends start failing.
pub const OUTBOUND_CAPACITY: usize = 1024;

impl WsConnection {
    /// Creates a handle and the receiver its writer drains.
    pub(crate) fn channel() -> (Self, mpsc::Receiver<String>) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub(crate) fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: uuid::Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Unique id of the connection.
    #[must_use]
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Returns `true` once the writer has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queues `message` as a JSON text frame.
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] if the connection is gone,
    /// [`TransportError::Backlogged`] if the client has stopped reading,
    /// [`TransportError::Encode`] if `message` cannot be serialized.
    pub fn send_json<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), TransportError> {
        let text =
            serde_json::to_string(message).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.tx.try_send(text).map_err(|err| match err {
            TrySendError::Full(_) => TransportError::Backlogged,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Runs one WebSocket connection until the client goes away.
///
/// Messages from the client are dispatched one at a time, in order. When
/// the connection ends, the subscriptions it still holds are removed from
/// the event hub. Ids that another connection has since resubscribed with
/// stay with that connection.
pub async fn run_connection(socket: WebSocket, state: AppState, request: Arc<RequestHead>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (connection, mut outbound) = WsConnection::channel();
    let conn_id = connection.id();
    traffic!(state, %conn_id, "websocket connected");

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if ws_tx.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut owned: Vec<SubscriberId> = Vec::new();
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if !text.is_empty() {
                    handle_text(&state, &connection, &request, text.as_str(), &mut owned).await;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(%conn_id, error = %err, "websocket error");
                break;
            }
        }
    }

    let removed = state.hub.lock().await.remove_connection(conn_id, &owned);
    drop(connection);
    writer.abort();

    traffic!(state, %conn_id, subscriptions = removed, "websocket disconnected");
}
