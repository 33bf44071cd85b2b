//! Short-lived key-value storage used by the relay.
//!
//! # Responsibilities
//! - Keep sent envelopes inspectable for a while after delivery
//! - Hold the process-wide pause flag
//! - Record emergency broadcasts
//!
//! # Design Decisions
//! - The relay only sees the [`EphemeralStore`] trait, so any backing cache
//!   can be swapped in without touching protocol logic
//! - Values are JSON so callers never need a schema shared with the store

pub mod memory;

use serde_json::Value;
use std::time::Duration;

pub use memory::MemoryStore;

/// Key of the process-wide pause flag.
pub const PAUSE_KEY: &str = "relay_paused";

/// Longest TTL accepted from configuration or the admin API (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// A cache whose entries expire on their own.
pub trait EphemeralStore: Send + Sync {
    /// Store `value` under `key` for `ttl`, replacing any previous entry.
    fn remember(&self, key: &str, value: Value, ttl: Duration);

    /// Fetch a live entry.
    fn recall(&self, key: &str) -> Option<Value>;

    /// Drop an entry if present.
    fn forget(&self, key: &str);
}

/// Whether the pause flag is set to a truthy value.
pub fn is_paused(store: &dyn EphemeralStore) -> bool {
    match store.recall(PAUSE_KEY) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(_) => true,
    }
}
