//! Live connection state.
//!
//! The registry is the sole owner of every [`Connection`] and of the sink
//! that writes to its socket. Channels refer to connections by id only.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;

use crate::net::{ConnectionId, FrameSink};
use crate::observability::metrics;

use super::{DisconnectReason, Relay, RelayError};

/// One accepted socket and what the relay knows about it.
pub struct Connection {
    id: ConnectionId,
    sink: Box<dyn FrameSink>,
    pub peer: Option<SocketAddr>,
    pub handshake_complete: bool,
    pub last_ping_at: Instant,
    pub joined_at: Instant,
    /// A refused upgrade request; later bytes are ignored.
    pub(crate) handshake_failed: bool,
    /// Bytes read but not yet consumed as a request or frame.
    pub(crate) inbound: Vec<u8>,
    /// Remainder of a rejected oversized frame still to arrive.
    pub(crate) discard: u64,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn write(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.sink.write(bytes)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("handshake_complete", &self.handshake_complete)
            .field("last_ping_at", &self.last_ping_at)
            .field("joined_at", &self.joined_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new connection under a freshly generated id.
    ///
    /// `attach` receives the id before the connection exists so the caller
    /// can tag its socket tasks with it.
    pub fn register<F>(&mut self, now: Instant, peer: Option<SocketAddr>, attach: F) -> ConnectionId
    where
        F: FnOnce(ConnectionId) -> Box<dyn FrameSink>,
    {
        let mut id = ConnectionId::new();
        while self.connections.contains_key(&id) {
            id = ConnectionId::new();
        }

        let connection = Connection {
            id,
            sink: attach(id),
            peer,
            handshake_complete: false,
            last_ping_at: now,
            joined_at: now,
            handshake_failed: false,
            inbound: Vec::new(),
            discard: 0,
        };
        self.connections.insert(id, connection);
        id
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Ids of connections that finished the handshake.
    pub fn upgraded(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.handshake_complete)
            .map(|c| c.id)
            .collect()
    }
}

impl Relay {
    /// Register a socket and subscribe it to the default channel.
    pub fn accept<F>(&mut self, peer: Option<SocketAddr>, attach: F) -> ConnectionId
    where
        F: FnOnce(ConnectionId) -> Box<dyn FrameSink>,
    {
        let id = self.register(peer, attach);
        let channel = self.settings.default_channel.clone();
        // Just registered, so the id is known.
        let _ = self.subscribe(id, &channel);
        id
    }

    /// Add a connection to the registry.
    pub fn register<F>(&mut self, peer: Option<SocketAddr>, attach: F) -> ConnectionId
    where
        F: FnOnce(ConnectionId) -> Box<dyn FrameSink>,
    {
        let id = self.registry.register(self.clock.now(), peer, attach);

        metrics::record_connection_opened();
        metrics::set_active_connections(self.registry.len());
        tracing::info!(client_id = %id, peer_addr = ?peer, "Connection registered");
        id
    }

    /// Remove a connection and every channel membership it holds.
    ///
    /// Remaining members of each channel it left are told with `user_left`.
    /// Returns `false` if the id was not registered.
    pub fn unregister(&mut self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let Some(connection) = self.registry.remove(id) else {
            return false;
        };
        drop(connection);

        let left = self.directory.purge(id);
        for (channel, remaining) in left {
            if remaining > 0 {
                self.broadcast(
                    &channel,
                    "user_left",
                    serde_json::json!({ "client_id": id.to_string() }),
                );
            }
        }

        metrics::record_connection_closed(reason.as_str());
        metrics::set_active_connections(self.registry.len());
        tracing::info!(client_id = %id, reason = reason.as_str(), "Connection unregistered");
        true
    }

    pub fn lookup(&self, id: ConnectionId) -> Result<&Connection, RelayError> {
        self.registry.get(id).ok_or(RelayError::TargetNotFound(id))
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}
