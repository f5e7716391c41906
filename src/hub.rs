//! Broadcast hub
//!
//! Coordinates registry mutation with join/leave notices and fans every message
//! out to all participants. One mutex serializes all of it: joins, leaves and
//! broadcasts never interleave.

use crate::protocol::{self, ChatMessage, InboundMessage};
use crate::registry::{Connection, ConnectionId, Registry};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct Hub {
    registry: Mutex<Registry>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and announce it to everyone, the newcomer included
    pub async fn join(&self, conn: Arc<dyn Connection>, name: String) {
        let notice = protocol::join_notice(&name, Utc::now());
        let id = conn.id();

        let mut registry = self.registry.lock().await;
        registry.insert(conn, name);
        tracing::info!(
            "{} joined as {} ({} connected)",
            id,
            notice.user,
            registry.len()
        );
        fan_out(&mut registry, &notice);
    }

    /// Unregister a connection and tell the remaining participants.
    ///
    /// Does nothing for a connection that never joined or was already removed.
    pub async fn leave(&self, id: ConnectionId) {
        let mut registry = self.registry.lock().await;
        let Some(name) = registry.remove(id) else {
            tracing::debug!("Leave for unregistered connection {}", id);
            return;
        };

        tracing::info!("{} ({}) left ({} connected)", name, id, registry.len());
        fan_out(&mut registry, &protocol::leave_notice(&name, Utc::now()));
    }

    /// Normalize a payload from a joined connection and broadcast it.
    ///
    /// Payloads from connections no longer registered are dropped.
    pub async fn route(&self, id: ConnectionId, inbound: InboundMessage) {
        let mut registry = self.registry.lock().await;
        let Some(name) = registry.name_of(id) else {
            tracing::debug!("Dropping message from unregistered connection {}", id);
            return;
        };

        let Some(msg) = protocol::normalize(inbound, name, Utc::now()) else {
            return;
        };

        fan_out(&mut registry, &msg);
    }

    /// Best-effort delivery of `msg` to every registered connection
    pub async fn broadcast(&self, msg: &ChatMessage) {
        let mut registry = self.registry.lock().await;
        fan_out(&mut registry, msg);
    }

    pub async fn participant_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn participants(&self) -> Vec<String> {
        let mut names = self.registry.lock().await.names();
        names.sort();
        names
    }
}

/// Deliver-or-evict across the registry, then announce every evicted
/// participant to the survivors until a round evicts no one.
fn fan_out(registry: &mut Registry, msg: &ChatMessage) {
    let mut evicted = registry.deliver(msg);

    while !evicted.is_empty() {
        let now = Utc::now();
        let mut next = Vec::new();
        for gone in evicted {
            next.extend(registry.deliver(&protocol::leave_notice(&gone.name, now)));
        }
        evicted = next;
    }
}
