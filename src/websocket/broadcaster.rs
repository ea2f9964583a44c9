use dashmap::DashMap;
use std::sync::Arc;

use super::connection::{Connection, ConnectionId, ConnectionState, Role, SendError};
use super::types::{ConnectionCountPayload, WsMessage};

/// Live connections grouped by role.
///
/// Sends never hold a map guard: every fan-out works on a snapshot of the
/// set and evicts failed connections after the loop. Any eviction is followed
/// by a `connection_count` broadcast to the remaining monitors.
#[derive(Clone, Default)]
pub struct Broadcaster {
    monitors: Arc<DashMap<ConnectionId, Connection>>,
    displays: Arc<DashMap<ConnectionId, Connection>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, role: Role) -> &DashMap<ConnectionId, Connection> {
        match role {
            Role::Monitor => &self.monitors,
            Role::Display => &self.displays,
        }
    }

    /// Add a connection to its role's set. Returns false if it was already
    /// present or is no longer open.
    pub fn add(&self, connection: Connection) -> bool {
        if connection.state() == ConnectionState::Closed {
            return false;
        }
        let id = connection.id();
        let role = connection.role();
        let inserted = self.set(role).insert(id, connection).is_none();
        if inserted {
            tracing::info!("{} {} connected. Total: {}", role, id, self.count(role));
        }
        inserted
    }

    /// Remove a connection. Returns false if it was not in the set.
    pub fn remove(&self, role: Role, id: &ConnectionId) -> bool {
        let removed = self.set(role).remove(id).is_some();
        if removed {
            tracing::info!("{} {} disconnected. Total: {}", role, id, self.count(role));
        }
        removed
    }

    #[cfg(test)]
    pub fn contains(&self, role: Role, id: &ConnectionId) -> bool {
        self.set(role).contains_key(id)
    }

    pub fn count(&self, role: Role) -> usize {
        self.set(role).len()
    }

    pub fn counts(&self) -> ConnectionCountPayload {
        ConnectionCountPayload {
            monitors: self.count(Role::Monitor),
            displays: self.count(Role::Display),
        }
    }

    /// Send to one connection, evicting it on failure.
    pub fn send_to(&self, connection: &Connection, message: WsMessage) -> Result<(), SendError> {
        connection.send(message).map_err(|e| {
            if self.evict(connection, e) {
                self.broadcast_counts();
            }
            e
        })
    }

    /// Deliver `message` to every connection of `role`. Each delivery is
    /// independent; failed connections are evicted. Returns the number of
    /// connections that accepted the message.
    pub fn broadcast(&self, role: Role, message: &WsMessage) -> usize {
        let (delivered, evicted) = self.fan_out(role, message);
        if evicted > 0 {
            self.broadcast_counts();
        }
        delivered
    }

    /// Broadcast the current connection counts to all monitors. Repeats while
    /// the broadcast itself evicts monitors, so survivors end on the final
    /// count.
    pub fn broadcast_counts(&self) -> usize {
        loop {
            let counts = WsMessage::ConnectionCount(self.counts());
            let (delivered, evicted) = self.fan_out(Role::Monitor, &counts);
            if evicted == 0 {
                return delivered;
            }
        }
    }

    /// Returns (delivered, evicted).
    fn fan_out(&self, role: Role, message: &WsMessage) -> (usize, usize) {
        let snapshot: Vec<Connection> = self
            .set(role)
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for connection in &snapshot {
            match connection.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((connection, e)),
            }
        }

        let mut evicted = 0;
        for (connection, e) in failed {
            if self.evict(connection, e) {
                evicted += 1;
            }
        }

        tracing::debug!("Broadcast to {}: {}/{} delivered", role, delivered, snapshot.len());
        (delivered, evicted)
    }

    /// Close the connection and drop it from its set. Returns false if it was
    /// already gone.
    fn evict(&self, connection: &Connection, reason: SendError) -> bool {
        connection.close();
        let removed = self.set(connection.role()).remove(&connection.id()).is_some();
        if removed {
            tracing::warn!(
                "Evicted {} {} after failed send: {}",
                connection.role(),
                connection.id(),
                reason
            );
        }
        removed
    }
}
