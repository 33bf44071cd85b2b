//! Connection identity and socket plumbing.
//!
//! # Responsibilities
//! - Generate unique connection IDs
//! - Split an accepted socket into a reader task and a writer task
//! - Expose the writer as a non-blocking [`FrameSink`]
//!
//! The tasks only move bytes. Every decision about those bytes is made by
//! the engine that owns the connection registry.

use std::fmt;
use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::net::listener::ConnectionPermit;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form produced by `Display`.
    pub fn parse(s: &str) -> Option<Self> {
        let raw = s.strip_prefix("client_")?;
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client_{}", self.0.simple())
    }
}

/// Write side of a connection as seen by the relay.
///
/// Writes must never block; an error means the peer is gone.
pub trait FrameSink: Send {
    fn write(&mut self, bytes: Vec<u8>) -> io::Result<()>;
}

/// Sink backed by the bounded queue of a connection's writer task.
///
/// A full queue counts as a failed write: a peer that cannot keep up is
/// treated like one that disconnected.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<u8>>,
}

impl FrameSink for ChannelSink {
    fn write(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.tx.try_send(bytes).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                io::Error::new(io::ErrorKind::WouldBlock, "outbound buffer full")
            }
            mpsc::error::TrySendError::Closed(_) => {
                io::Error::new(io::ErrorKind::BrokenPipe, "connection writer closed")
            }
        })
    }
}

/// Something a reader task observed on its socket.
#[derive(Debug)]
pub enum SocketEvent {
    /// Raw bytes from one read.
    Data { id: ConnectionId, bytes: Vec<u8> },
    /// EOF or read error.
    Closed { id: ConnectionId },
}

/// Spawn the reader and writer tasks for an accepted socket.
///
/// Reads are forwarded to `events`; the returned sink feeds the writer.
/// The writer exits once the sink is dropped, and takes the reader with it,
/// which closes the socket.
pub fn spawn_io(
    id: ConnectionId,
    stream: TcpStream,
    permit: ConnectionPermit,
    events: mpsc::UnboundedSender<SocketEvent>,
    read_buffer: usize,
    outbound_buffer: usize,
) -> ChannelSink {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(outbound_buffer);
    let (writer_done, mut writer_gone) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut buf = vec![0u8; read_buffer];
        loop {
            let read = tokio::select! {
                _ = &mut writer_gone => break,
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    let event = SocketEvent::Data {
                        id,
                        bytes: buf[..n].to_vec(),
                    };
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::debug!(client_id = %id, error = %e, "Read failed");
                    break;
                }
            }
        }
        let _ = events.send(SocketEvent::Closed { id });
    });

    tokio::spawn(async move {
        let _permit = permit;
        let _writer_done = writer_done;
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                tracing::debug!(client_id = %id, error = %e, "Write failed");
                break;
            }
        }
        let _ = writer.shutdown().await;
        tracing::trace!(client_id = %id, "Connection writer closed");
    });

    ChannelSink { tx }
}
