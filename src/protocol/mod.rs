//! Wire protocol: handshake, frames and JSON envelopes.
//!
//! # Data Flow
//! ```text
//! raw bytes
//!     → handshake.rs (until the connection is upgraded)
//!     → frame.rs (unmask, split on frame boundaries)
//!     → envelope.rs (JSON → ClientAction)
//!
//! Body → Envelope → JSON → frame.rs → socket
//! ```

pub mod envelope;
pub mod frame;
pub mod handshake;

pub use envelope::{Body, ClientAction, Envelope, EnvelopeId};
pub use frame::{Frame, FrameError};
pub use handshake::HandshakeError;
