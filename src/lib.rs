//! Channel relay library.
//!
//! A WebSocket relay that fans client events out to named channels.

pub mod admin;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod relay;
pub mod store;

pub use config::schema::RelayConfig;
pub use lifecycle::Shutdown;
pub use relay::{Engine, Relay, RelayHandle};
