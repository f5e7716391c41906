//! Wire schema for the relay
//!
//! Every frame in either direction is a single JSON object of the shape
//! `{ "type": "join" | "msg" | "leave", "user": "...", "text": "...", "time": "<RFC3339>" }`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Join,
    Msg,
    Leave,
}

impl MessageKind {
    /// Map a raw inbound `type` string onto a kind. Empty or unknown values are chat messages.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "join" => MessageKind::Join,
            "leave" => MessageKind::Leave,
            _ => MessageKind::Msg,
        }
    }
}

/// Canonical message as fanned out to every participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub user: String,
    pub text: String,
    pub time: String,
}

/// Payload as received from a client; nothing in it is trusted except `user` on the handshake
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: String,
    pub text: String,
    pub time: String,
}

/// Render a timestamp the way it goes out on the wire
pub fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Turn a raw inbound payload into the message that gets broadcast.
///
/// `user` is forced to the sender's registered name and `time` is stamped by the
/// server. Returns `None` for a chat message with no text.
pub fn normalize(inbound: InboundMessage, name: &str, now: DateTime<Utc>) -> Option<ChatMessage> {
    let kind = MessageKind::from_wire(&inbound.kind);
    if kind == MessageKind::Msg && inbound.text.is_empty() {
        return None;
    }

    Some(ChatMessage {
        kind,
        user: name.to_string(),
        text: inbound.text,
        time: format_time(now),
    })
}

pub fn join_notice(name: &str, now: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        kind: MessageKind::Join,
        user: name.to_string(),
        text: format!("{} joined", name),
        time: format_time(now),
    }
}

pub fn leave_notice(name: &str, now: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        kind: MessageKind::Leave,
        user: name.to_string(),
        text: format!("{} left", name),
        time: format_time(now),
    }
}
