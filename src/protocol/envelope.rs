//! JSON envelopes exchanged after the handshake.
//!
//! Outbound, every delivery is an [`Envelope`] whose `message` carries one
//! of the [`Body`] shapes. Inbound, a client frame is parsed into a
//! [`ClientAction`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Name stamped on everything the relay itself originates.
pub const RELAY_NAME: &str = "relay";

/// Channel used for point-to-point control traffic (welcome, ping, pong).
pub const SYSTEM_CHANNEL: &str = "system";

/// Unique identifier for an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct EnvelopeId(Uuid);

impl EnvelopeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Key under which the envelope is persisted in the ephemeral store.
    pub fn store_key(&self) -> String {
        format!("relay_msg_{}", self)
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg_{}", self.0.simple())
    }
}

impl From<EnvelopeId> for String {
    fn from(id: EnvelopeId) -> Self {
        id.to_string()
    }
}

/// The unit written to a client.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub channel: String,
    pub message: Body,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub sender: String,
}

/// Payload shapes carried in [`Envelope::message`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    Welcome {
        event: String,
        message: String,
        client_id: String,
    },
    Event {
        event: String,
        data: Value,
        channel: String,
        timestamp: f64,
        trumpeted_by: String,
    },
    Pong {
        pong: bool,
    },
    Ping {
        ping: bool,
    },
    Notice {
        event: String,
        message: String,
    },
}

impl Body {
    pub fn welcome(client_id: impl fmt::Display) -> Self {
        Body::Welcome {
            event: "welcome".into(),
            message: "Welcome to the relay!".into(),
            client_id: client_id.to_string(),
        }
    }

    pub fn event(channel: &str, event: &str, data: Value, timestamp: f64) -> Self {
        Body::Event {
            event: event.into(),
            data,
            channel: channel.into(),
            timestamp,
            trumpeted_by: RELAY_NAME.into(),
        }
    }

    pub fn pong() -> Self {
        Body::Pong { pong: true }
    }

    pub fn ping() -> Self {
        Body::Ping { ping: true }
    }

    pub fn shutdown() -> Self {
        Body::Notice {
            event: "server_shutdown".into(),
            message: "The relay is shutting down. Goodbye!".into(),
        }
    }

    /// Event name, for bodies that carry one.
    pub fn event_name(&self) -> Option<&str> {
        match self {
            Body::Welcome { event, .. } | Body::Event { event, .. } | Body::Notice { event, .. } => {
                Some(event)
            }
            Body::Pong { .. } | Body::Ping { .. } => None,
        }
    }
}

/// A request decoded from a client text frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    JoinChannel {
        #[serde(default)]
        channel: Option<String>,
    },
    LeaveChannel {
        #[serde(default)]
        channel: Option<String>,
    },
    Broadcast {
        #[serde(default)]
        channel: Option<String>,
        #[serde(default)]
        event: Option<String>,
        #[serde(default)]
        data: Option<Value>,
    },
    Ping,
    /// Anything without a recognised `action`; observed, never delivered.
    #[serde(skip)]
    Chat(Value),
}

impl ClientAction {
    /// Parse a text frame payload.
    ///
    /// Fails only when the payload is not JSON at all or a known action
    /// carries fields of the wrong type.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(payload)?;
        match value.get("action").and_then(Value::as_str) {
            Some("join_channel" | "leave_channel" | "broadcast" | "ping") => {
                serde_json::from_value(value)
            }
            _ => Ok(ClientAction::Chat(value)),
        }
    }
}
