pub mod connection;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{Stream, StreamExt},
};
use std::sync::Arc;

use crate::error::HandshakeError;
use crate::protocol::InboundMessage;
use crate::registry::Connection;
use crate::state::AppState;

pub use connection::WsConnection;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();

    let name = match read_handshake(&mut stream).await {
        Ok(name) => name,
        Err(e) => {
            tracing::debug!("Rejecting connection: {}", e);
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };

    let (conn, writer) = WsConnection::new(sink, state.config.send_buffer);
    let id = conn.id();
    let mut closed = conn.close_signal();
    let mut writer = tokio::spawn(writer);

    state.hub.join(conn.clone(), name).await;

    loop {
        tokio::select! {
            // Evicted by the hub
            _ = connection::wait_closed(&mut closed) => {
                tracing::debug!("{} closed by hub, ending read loop", id);
                break;
            }

            // Socket stopped accepting writes
            _ = &mut writer => {
                tracing::debug!("Writer for {} exited, ending read loop", id);
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(inbound) => state.hub.route(id, inbound).await,
                            Err(e) => {
                                tracing::debug!("Malformed payload from {}: {}", id, e);
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                }
            }
        }
    }

    state.hub.leave(id).await;
    conn.close();
}

/// Wait for the first JSON payload and return the display name it announces.
///
/// Pings and pongs before it are skipped; anything else that is not a decodable
/// payload with a non-empty `user` rejects the connection.
pub async fn read_handshake<S>(stream: &mut S) -> Result<String, HandshakeError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match stream.next().await.ok_or(HandshakeError::Closed)?? {
            Message::Text(text) => {
                let first: InboundMessage = serde_json::from_str(&text)?;
                if first.user.is_empty() {
                    return Err(HandshakeError::EmptyName);
                }
                return Ok(first.user);
            }
            Message::Binary(_) => return Err(HandshakeError::BinaryFrame),
            Message::Close(_) => return Err(HandshakeError::Closed),
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}
