//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limits)
//!     → connection.rs (id, reader task, writer task)
//!     → reads forwarded to the relay engine as SocketEvents
//!     → engine writes encoded frames back through the FrameSink
//! ```
//!
//! # Design Decisions
//! - Bounded connection count prevents resource exhaustion
//! - Socket tasks never touch relay state
//! - Writes go through a bounded queue so the engine never blocks on a peer

pub mod connection;
pub mod listener;

pub use connection::{spawn_io, ChannelSink, ConnectionId, FrameSink, SocketEvent};
pub use listener::{ConnectionPermit, Listener, ListenerError};
