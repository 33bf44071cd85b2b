//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Channel layout and the auto-join channel.
    pub channels: ChannelConfig,

    /// Liveness probing and eviction.
    pub heartbeat: HeartbeatConfig,

    /// Ephemeral store retention.
    pub store: StoreConfig,

    /// Wire and buffering limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 1_024,
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Channel every new connection is subscribed to on accept.
    pub default_channel: String,

    /// Channels created at startup, before anyone subscribes.
    pub preload: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_channel: "lobby".to_string(),
            preload: vec![
                "lobby".to_string(),
                "private".to_string(),
                "alerts".to_string(),
            ],
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Seconds without a client ping before a post-handshake connection is evicted.
    pub timeout_secs: u64,

    /// Seconds between server ping envelopes.
    pub ping_interval_secs: u64,

    /// Seconds a connection may stay un-upgraded before it is evicted.
    pub handshake_timeout_secs: u64,

    /// How often the engine wakes up to sweep when idle, in milliseconds.
    pub sweep_interval_ms: u64,

    /// Treat every decoded client frame as proof of life, not only `ping` actions.
    pub refresh_on_any_frame: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            ping_interval_secs: 10,
            handshake_timeout_secs: 10,
            sweep_interval_ms: 500,
            refresh_on_any_frame: false,
        }
    }
}

impl HeartbeatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Ephemeral store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// How long sent envelopes stay inspectable, in seconds.
    pub message_ttl_secs: u64,

    /// How long emergency records are kept, in seconds.
    pub emergency_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            message_ttl_secs: 3_600,
            emergency_ttl_secs: 86_400,
        }
    }
}

/// Wire limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest client frame payload accepted, in bytes.
    pub max_frame_bytes: usize,

    /// Bytes requested per socket read.
    pub read_buffer_bytes: usize,

    /// Encoded frames buffered per connection before the peer counts as gone.
    pub outbound_buffer: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 1024 * 1024, // 1MB
            read_buffer_bytes: 4096,
            outbound_buffer: 256,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
