//! Connection registry
//!
//! Maps connection tickets to display names plus the write path used to reach them.
//! The registry does no locking of its own: the hub owns it behind a single mutex.

use crate::error::DeliveryError;
use crate::protocol::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Opaque ticket identifying one connection for the lifetime of its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(ulid::Ulid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Write side of a client connection, as seen by the hub
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Hand a message to the connection without waiting on the network
    fn send(&self, msg: &ChatMessage) -> Result<(), DeliveryError>;

    /// Release the connection. Must be safe to call more than once.
    fn close(&self);
}

struct Participant {
    name: String,
    conn: Arc<dyn Connection>,
}

/// A participant removed because a delivery to it failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evicted {
    pub id: ConnectionId,
    pub name: String,
}

#[derive(Default)]
pub struct Registry {
    participants: HashMap<ConnectionId, Participant>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `name`, replacing any stale entry with the same ticket
    pub fn insert(&mut self, conn: Arc<dyn Connection>, name: String) {
        let id = conn.id();
        if self
            .participants
            .insert(id, Participant { name, conn })
            .is_some()
        {
            tracing::warn!("Connection {} registered twice", id);
        }
    }

    /// Drop the entry for `id`, returning the name it was registered under
    pub fn remove(&mut self, id: ConnectionId) -> Option<String> {
        self.participants.remove(&id).map(|p| p.name)
    }

    #[cfg(test)]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.participants.contains_key(&id)
    }

    pub fn name_of(&self, id: ConnectionId) -> Option<&str> {
        self.participants.get(&id).map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Display names of everyone registered, in no particular order
    pub fn names(&self) -> Vec<String> {
        self.participants.values().map(|p| p.name.clone()).collect()
    }

    /// Deliver `msg` to every participant. Any participant whose send fails is
    /// closed and removed before this returns.
    pub fn deliver(&mut self, msg: &ChatMessage) -> Vec<Evicted> {
        let mut evicted = Vec::new();

        self.participants.retain(|id, participant| {
            match participant.conn.send(msg) {
                Ok(()) => true,
                Err(e) => {
                    tracing::info!(
                        "Evicting {} ({}) after failed delivery: {}",
                        participant.name,
                        id,
                        e
                    );
                    participant.conn.close();
                    evicted.push(Evicted {
                        id: *id,
                        name: participant.name.clone(),
                    });
                    false
                }
            }
        });

        evicted
    }
}
