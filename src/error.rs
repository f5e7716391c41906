/// Why a message could not be handed to a connection's outbound queue.
///
/// Either variant is taken as proof that the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Full,
}

/// Reasons a new connection is dropped before it joins the hub
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("connection closed before handshake")]
    Closed,

    #[error("transport error during handshake: {0}")]
    Transport(#[from] axum::Error),

    #[error("malformed handshake payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("handshake carried an empty user name")]
    EmptyName,

    #[error("binary frame received during handshake")]
    BinaryFrame,
}
