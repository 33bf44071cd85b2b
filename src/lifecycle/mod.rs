//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal or trigger → engine stops accepting
//!     → shutdown notice queued to every peer → final drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Startup order lives in `main`: config, logging, metrics, listener, engine
//! - Shutdown is best effort; peers are not awaited

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
