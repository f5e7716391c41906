//! WebSocket-backed [`Connection`]
//!
//! The hub never touches the socket. It pushes onto a bounded queue that a
//! dedicated writer task drains, so a slow client fills its own queue and is
//! evicted instead of stalling the broadcast.
//!
//! Closing flips a watch flag observed by both the writer and the read loop,
//! so an evicted connection is torn down even while a write is stuck on a
//! client that stopped reading.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::SplitSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::error::DeliveryError;
use crate::protocol::ChatMessage;
use crate::registry::{Connection, ConnectionId};

/// How long the writer tries to hand over a close frame before dropping the socket
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub struct WsConnection {
    id: ConnectionId,
    outbound: mpsc::Sender<ChatMessage>,
    closed: watch::Sender<bool>,
}

impl WsConnection {
    /// Create the connection handle and the writer future that owns the socket's write half
    pub fn new(
        sink: SplitSink<WebSocket, Message>,
        buffer: usize,
    ) -> (Arc<Self>, impl std::future::Future<Output = ()> + Send + 'static) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (closed, closed_rx) = watch::channel(false);
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            outbound: tx,
            closed,
        });

        let id = conn.id;
        (conn, run_writer(id, sink, rx, closed_rx))
    }

    /// Receiver that resolves through [`wait_closed`] once `close` has been called
    pub fn close_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, msg: &ChatMessage) -> Result<(), DeliveryError> {
        self.outbound.try_send(msg.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Resolve once the connection is closed, or its handle is gone
pub async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}

async fn run_writer(
    id: ConnectionId,
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ChatMessage>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            _ = wait_closed(&mut closed) => break,
            next = rx.recv() => next,
        };
        let Some(msg) = next else { break };

        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize message for {}: {}", id, e);
                continue;
            }
        };

        // A client that stops reading can park this write forever
        tokio::select! {
            _ = wait_closed(&mut closed) => break,
            sent = sink.send(Message::Text(json.into())) => {
                if let Err(e) = sent {
                    tracing::warn!("Write to {} failed: {}", id, e);
                    break;
                }
            }
        }
    }

    rx.close();
    if tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None)))
        .await
        .is_err()
    {
        tracing::debug!("Close frame to {} timed out", id);
    }
    tracing::debug!("Writer for {} finished", id);
}
