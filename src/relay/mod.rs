//! The relay core.
//!
//! # Responsibilities
//! - Own every connection, channel membership and queued delivery
//! - Turn inbound bytes into handshakes, frames and client actions
//! - Queue envelopes and write them in one global FIFO
//! - Evict connections that stop pinging
//!
//! # Data Flow
//! ```text
//! SocketEvent::Data
//!     → receive (handshake until upgraded, then frames)
//!     → dispatch (join / leave / broadcast / ping / chat)
//!     → outbox
//!     → drain_queue → FrameSink
//! ```
//!
//! # Design Decisions
//! - `Relay` is synchronous and has exactly one owner, the [`engine`] task,
//!   so no state here needs a lock
//! - Time and storage are injected so tests can run without sockets or sleeps
//! - Operations are split across files by concern, each adding an
//!   `impl Relay` block

pub mod clock;
pub mod directory;
pub mod engine;
pub mod heartbeat;
pub mod registry;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{HeartbeatConfig, RelayConfig, StoreConfig};
use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::envelope::{Body, ClientAction, SYSTEM_CHANNEL};
use crate::protocol::frame::{self, Frame, FrameError};
use crate::protocol::handshake::{self, HandshakeError};
use crate::store::{self, EphemeralStore, PAUSE_KEY};

pub use clock::{Clock, ManualClock, SystemClock};
pub use directory::{Directory, Presence};
pub use engine::{Engine, EngineStopped, RelayHandle};
pub use heartbeat::SweepReport;
pub use registry::{Connection, Registry};
pub use router::{Delivery, DrainReport, Outbox};

/// Upper bound on a buffered upgrade request.
const MAX_REQUEST_BYTES: usize = 8192;

/// Event name used when a client broadcast omits one.
const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("connection {0} not found")]
    TargetNotFound(ConnectionId),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Closed by the relay on request.
    Closed,
    /// Close frame, EOF or read error from the peer.
    PeerClosed,
    WriteFailed,
    HeartbeatTimeout,
    HandshakeTimeout,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "closed",
            DisconnectReason::PeerClosed => "peer_closed",
            DisconnectReason::WriteFailed => "write_failed",
            DisconnectReason::HeartbeatTimeout => "heartbeat_timeout",
            DisconnectReason::HandshakeTimeout => "handshake_timeout",
            DisconnectReason::Shutdown => "shutdown",
        }
    }
}

/// The parts of [`RelayConfig`] the core reads on every pass.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub default_channel: String,
    pub heartbeat: HeartbeatConfig,
    pub store: StoreConfig,
    pub max_frame_bytes: usize,
}

impl RelaySettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            default_channel: config.channels.default_channel.clone(),
            heartbeat: config.heartbeat.clone(),
            store: config.store.clone(),
            max_frame_bytes: config.limits.max_frame_bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Listening,
    Paused,
    Stopped,
}

/// Point-in-time counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub total_connections: usize,
    pub channels: BTreeMap<String, usize>,
    pub queued_messages: usize,
    /// Seconds since the relay started.
    pub uptime: f64,
    pub status: RelayStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientInfo {
    pub client_id: String,
    pub peer_addr: Option<String>,
    /// Unix seconds.
    pub connected_at: f64,
    /// Unix seconds.
    pub last_ping: f64,
    pub channels: Vec<String>,
    /// Seconds since the connection was accepted.
    pub uptime: f64,
    pub handshake_complete: bool,
}

pub struct Relay {
    registry: Registry,
    directory: Directory,
    outbox: Outbox,
    store: Arc<dyn EphemeralStore>,
    clock: Arc<dyn Clock>,
    settings: RelaySettings,
    started_at: Instant,
    running: bool,
    last_ping_sent: Option<Instant>,
}

impl Relay {
    pub fn new(config: &RelayConfig, store: Arc<dyn EphemeralStore>, clock: Arc<dyn Clock>) -> Self {
        let mut directory = Directory::new();
        for channel in &config.channels.preload {
            directory.ensure(channel);
        }
        directory.ensure(&config.channels.default_channel);

        Self {
            registry: Registry::new(),
            directory,
            outbox: Outbox::default(),
            store,
            started_at: clock.now(),
            clock,
            settings: RelaySettings::from_config(config),
            running: true,
            last_ping_sent: None,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        store::is_paused(self.store.as_ref())
    }

    /// Set the pause flag for `ttl`.
    pub fn pause(&mut self, ttl: Duration) {
        self.store.remember(PAUSE_KEY, Value::Bool(true), ttl);
        tracing::warn!(ttl_secs = ttl.as_secs(), "Relay paused");
    }

    pub fn resume(&mut self) {
        self.store.forget(PAUSE_KEY);
        tracing::info!("Relay resumed");
    }

    /// Take in bytes read from a connection's socket.
    ///
    /// Before the upgrade, bytes are buffered until a full request has
    /// arrived. Afterwards every complete frame in the buffer is handled;
    /// a trailing partial frame waits for the next read.
    pub fn receive(&mut self, id: ConnectionId, bytes: &[u8]) {
        if self.is_paused() {
            tracing::trace!(client_id = %id, len = bytes.len(), "Paused, inbound bytes ignored");
            return;
        }
        let Some(connection) = self.registry.get_mut(id) else {
            return;
        };
        if connection.handshake_failed {
            return;
        }
        let skip = connection.discard.min(bytes.len() as u64) as usize;
        connection.discard -= skip as u64;
        connection.inbound.extend_from_slice(&bytes[skip..]);

        if !connection.handshake_complete {
            let Some(end) = find_request_end(&connection.inbound) else {
                if connection.inbound.len() > MAX_REQUEST_BYTES {
                    tracing::warn!(client_id = %id, "Upgrade request too large");
                    connection.inbound.clear();
                    connection.handshake_failed = true;
                }
                return;
            };
            let request: Vec<u8> = connection.inbound.drain(..end).collect();

            match self.complete_handshake(id, &request) {
                Ok(()) => {}
                Err(RelayError::Handshake(e)) => {
                    tracing::warn!(client_id = %id, error = %e, "Handshake failed");
                    metrics::record_handshake_failure();
                    if let Some(connection) = self.registry.get_mut(id) {
                        connection.inbound.clear();
                        connection.handshake_failed = true;
                    }
                    return;
                }
                Err(RelayError::TargetNotFound(_)) => return,
            }
        }

        self.read_frames(id);
    }

    /// Upgrade a connection: write the 101 response and queue the welcome.
    pub fn complete_handshake(&mut self, id: ConnectionId, request: &[u8]) -> Result<(), RelayError> {
        let response = handshake::negotiate(request)?;
        let connection = self
            .registry
            .get_mut(id)
            .ok_or(RelayError::TargetNotFound(id))?;

        if let Err(e) = connection.write(response) {
            tracing::warn!(client_id = %id, error = %e, "Handshake response not written");
            self.unregister(id, DisconnectReason::WriteFailed);
            return Err(RelayError::TargetNotFound(id));
        }
        connection.handshake_complete = true;

        tracing::info!(client_id = %id, "Handshake complete");
        self.send(id, Body::welcome(id), SYSTEM_CHANNEL)?;
        Ok(())
    }

    fn read_frames(&mut self, id: ConnectionId) {
        let max = self.settings.max_frame_bytes;
        loop {
            let Some(connection) = self.registry.get_mut(id) else {
                return;
            };

            match frame::parse(&connection.inbound, max) {
                Ok(None) => return,
                Ok(Some((Frame::Close, _))) => {
                    tracing::debug!(client_id = %id, "Close frame received");
                    self.unregister(id, DisconnectReason::PeerClosed);
                    return;
                }
                Ok(Some((Frame::Data(payload), used))) => {
                    connection.inbound.drain(..used);
                    self.dispatch(id, &payload);
                }
                Err(e) => {
                    tracing::debug!(client_id = %id, error = %e, "Malformed frame dropped");
                    metrics::record_dropped("malformed_frame");
                    if let FrameError::TooLarge { frame_len, .. } = e {
                        let buffered = connection.inbound.len() as u64;
                        if frame_len <= buffered {
                            connection.inbound.drain(..frame_len as usize);
                            continue;
                        }
                        connection.discard = frame_len - buffered;
                    }
                    connection.inbound.clear();
                    return;
                }
            }
        }
    }

    /// Act on one decoded client frame.
    pub fn dispatch(&mut self, id: ConnectionId, payload: &[u8]) {
        if self.settings.heartbeat.refresh_on_any_frame {
            self.touch(id);
        }

        let action = match ClientAction::parse(payload) {
            Ok(action) => action,
            Err(e) => {
                tracing::debug!(client_id = %id, error = %e, "Unparseable client frame");
                metrics::record_client_action("invalid");
                return;
            }
        };

        match action {
            ClientAction::JoinChannel { channel } => {
                metrics::record_client_action("join_channel");
                let channel = channel.unwrap_or_else(|| self.settings.default_channel.clone());
                if let Err(e) = self.subscribe(id, &channel) {
                    tracing::warn!(client_id = %id, channel = %channel, error = %e, "Join failed");
                }
            }
            ClientAction::LeaveChannel { channel } => {
                metrics::record_client_action("leave_channel");
                let channel = channel.unwrap_or_else(|| self.settings.default_channel.clone());
                self.unsubscribe(id, &channel);
            }
            ClientAction::Broadcast { channel, event, data } => {
                metrics::record_client_action("broadcast");
                let channel = channel.unwrap_or_else(|| self.settings.default_channel.clone());
                let event = event.unwrap_or_else(|| DEFAULT_EVENT.to_string());
                self.broadcast(&channel, &event, data.unwrap_or_else(|| json!({})));
            }
            ClientAction::Ping => {
                metrics::record_client_action("ping");
                self.touch(id);
                if let Err(e) = self.send(id, Body::pong(), SYSTEM_CHANNEL) {
                    tracing::warn!(client_id = %id, error = %e, "Pong not queued");
                }
            }
            ClientAction::Chat(line) => {
                metrics::record_client_action("chat");
                tracing::info!(client_id = %id, message = %line, "Chat line received");
            }
        }
    }

    fn touch(&mut self, id: ConnectionId) {
        let now = self.clock.now();
        if let Some(connection) = self.registry.get_mut(id) {
            connection.last_ping_at = now;
        }
    }

    /// Broadcast an `emergency_alert` to every channel and record it.
    ///
    /// Returns the number of envelopes queued.
    pub fn emergency(&mut self, message: &str) -> usize {
        let data = json!({
            "message": message,
            "severity": "critical",
            "source": "relay_emergency",
        });

        let mut recipients = 0;
        for channel in self.directory.names() {
            recipients += self.broadcast(&channel, "emergency_alert", data.clone());
        }

        let now = self.clock.unix_time();
        self.store.remember(
            &format!("relay_emergency_{}", now as u64),
            json!({ "message": message, "timestamp": now, "recipients": recipients }),
            Duration::from_secs(self.settings.store.emergency_ttl_secs),
        );

        tracing::warn!(recipients, "Emergency broadcast sent");
        recipients
    }

    pub fn stats(&self) -> Stats {
        let status = if !self.running {
            RelayStatus::Stopped
        } else if self.is_paused() {
            RelayStatus::Paused
        } else {
            RelayStatus::Listening
        };

        Stats {
            total_connections: self.registry.len(),
            channels: self.directory.counts(),
            queued_messages: self.outbox.len(),
            uptime: (self.clock.now() - self.started_at).as_secs_f64(),
            status,
        }
    }

    pub fn client_info(&self, id: ConnectionId) -> Result<ClientInfo, RelayError> {
        let connection = self.lookup(id)?;
        let now = self.clock.now();
        let now_unix = self.clock.unix_time();
        let to_unix = |at: Instant| now_unix - (now - at).as_secs_f64();

        Ok(ClientInfo {
            client_id: id.to_string(),
            peer_addr: connection.peer.map(|addr| addr.to_string()),
            connected_at: to_unix(connection.joined_at),
            last_ping: to_unix(connection.last_ping_at),
            channels: self.channels_of(id),
            uptime: (now - connection.joined_at).as_secs_f64(),
            handshake_complete: connection.handshake_complete,
        })
    }

    /// Stop the relay and queue a shutdown notice for every upgraded peer.
    ///
    /// The caller drains once more; peers are not waited on.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;

        let peers = self.registry.upgraded();
        for id in &peers {
            if let Err(e) = self.send(*id, Body::shutdown(), SYSTEM_CHANNEL) {
                tracing::debug!(client_id = %id, error = %e, "Shutdown notice not queued");
            }
        }
        tracing::info!(peers = peers.len(), "Relay stopping");
    }

    /// Apply the live-reloadable parts of a new configuration.
    pub fn apply_config(&mut self, config: &RelayConfig) {
        let next = RelaySettings::from_config(config);
        if next.default_channel != self.settings.default_channel {
            self.directory.ensure(&next.default_channel);
        }
        for channel in &config.channels.preload {
            self.directory.ensure(channel);
        }
        self.settings = next;
        tracing::info!(
            timeout_secs = self.settings.heartbeat.timeout_secs,
            ping_interval_secs = self.settings.heartbeat.ping_interval_secs,
            max_frame_bytes = self.settings.max_frame_bytes,
            "Relay settings updated"
        );
    }
}

/// Length of the request head including the blank line, if complete.
fn find_request_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::encode;
    use crate::relay::testing::{masked, relay_with_store, upgraded, RecordingSink, UPGRADE_REQUEST};
    use std::time::Duration;

    #[test]
    fn handshake_writes_response_then_welcome() {
        let (mut relay, _clock, _store) = relay_with_store();
        let sink = RecordingSink::new();
        let id = relay.accept(None, |_| Box::new(sink.clone()));
        relay.drain_queue();

        relay.receive(id, UPGRADE_REQUEST.as_bytes());
        relay.drain_queue();

        let raw = sink.raw();
        let response = String::from_utf8(raw[0].clone()).unwrap();
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

        let envelopes = sink.envelopes();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0]["channel"], "system");
        assert_eq!(envelopes[0]["sender"], "relay");
        assert_eq!(envelopes[0]["message"]["event"], "welcome");
        assert_eq!(envelopes[0]["message"]["client_id"], id.to_string());
        assert!(relay.lookup(id).unwrap().handshake_complete);
    }

    #[test]
    fn request_split_across_reads_is_buffered() {
        let (mut relay, _clock, _store) = relay_with_store();
        let sink = RecordingSink::new();
        let id = relay.accept(None, |_| Box::new(sink.clone()));

        let (head, tail) = UPGRADE_REQUEST.split_at(30);
        relay.receive(id, head.as_bytes());
        assert!(!relay.lookup(id).unwrap().handshake_complete);
        relay.receive(id, tail.as_bytes());
        assert!(relay.lookup(id).unwrap().handshake_complete);
    }

    #[test]
    fn failed_handshake_leaves_connection_unupgraded() {
        let (mut relay, _clock, _store) = relay_with_store();
        let sink = RecordingSink::new();
        let id = relay.accept(None, |_| Box::new(sink.clone()));

        relay.receive(id, b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n");
        relay.receive(id, UPGRADE_REQUEST.as_bytes());
        relay.drain_queue();

        assert!(!relay.lookup(id).unwrap().handshake_complete);
        assert!(sink.raw().is_empty());
    }

    #[test]
    fn frames_in_one_read_are_all_dispatched() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, sink) = upgraded(&mut relay);
        relay.drain_queue();
        sink.clear();

        let mut bytes = masked(br#"{"action":"join_channel","channel":"ops"}"#);
        bytes.extend(masked(br#"{"action":"ping"}"#));
        relay.receive(a, &bytes);
        relay.drain_queue();

        assert!(relay.channels_of(a).contains(&"ops".to_string()));
        assert_eq!(sink.events(), vec!["user_joined"]);
        assert_eq!(sink.messages()[1], json!({"pong": true}));
    }

    #[test]
    fn partial_frame_waits_for_rest() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);

        let bytes = masked(br#"{"action":"join_channel","channel":"ops"}"#);
        let (head, tail) = bytes.split_at(5);
        relay.receive(a, head);
        assert!(!relay.channels_of(a).contains(&"ops".to_string()));
        relay.receive(a, tail);
        assert!(relay.channels_of(a).contains(&"ops".to_string()));
    }

    #[test]
    fn malformed_frame_is_dropped_without_teardown() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);
        relay.drain_queue();
        let queued = relay.queued();

        // 64-bit length with the top bit set
        let mut bad = vec![0x81, 0xFF];
        bad.extend_from_slice(&u64::MAX.to_be_bytes());
        relay.receive(a, &bad);

        assert!(relay.lookup(a).is_ok());
        assert_eq!(relay.queued(), queued);

        // buffer was cleared, so the next frame parses normally
        relay.receive(a, &masked(br#"{"action":"join_channel","channel":"ops"}"#));
        assert!(relay.channels_of(a).contains(&"ops".to_string()));
    }

    #[test]
    fn oversized_frame_is_skipped_across_reads() {
        let (mut relay, _clock, _store) = relay_with_store();
        let mut config = RelayConfig::default();
        config.limits.max_frame_bytes = 64;
        relay.apply_config(&config);
        let (a, _sink) = upgraded(&mut relay);
        relay.drain_queue();

        // unmasked, so the payload reads as close frame headers on the wire
        let big = encode(&[0x88; 200]);
        let (head, rest) = big.split_at(20);
        let (middle, tail) = rest.split_at(100);
        relay.receive(a, head);
        relay.receive(a, middle);
        assert!(relay.lookup(a).is_ok());

        // the next frame shares a read with the end of the oversized one
        let mut last = tail.to_vec();
        last.extend_from_slice(&masked(br#"{"action":"join_channel","channel":"ops"}"#));
        relay.receive(a, &last);

        assert!(relay.lookup(a).is_ok());
        assert!(relay.channels_of(a).contains(&"ops".to_string()));
    }

    #[test]
    fn oversized_frame_fully_buffered_is_skipped() {
        let (mut relay, _clock, _store) = relay_with_store();
        let mut config = RelayConfig::default();
        config.limits.max_frame_bytes = 64;
        relay.apply_config(&config);
        let (a, _sink) = upgraded(&mut relay);
        relay.drain_queue();

        let mut bytes = encode(&[0x88; 200]);
        bytes.extend_from_slice(&masked(br#"{"action":"join_channel","channel":"ops"}"#));
        relay.receive(a, &bytes);

        assert!(relay.lookup(a).is_ok());
        assert!(relay.channels_of(a).contains(&"ops".to_string()));
    }

    #[test]
    fn non_json_and_chat_lines_are_not_delivered() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);
        relay.drain_queue();

        relay.receive(a, &masked(b"just text"));
        relay.receive(a, &masked(br#"{"text":"hello"}"#));
        assert_eq!(relay.queued(), 0);
        assert!(relay.lookup(a).is_ok());
    }

    #[test]
    fn close_frame_unregisters() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);

        relay.receive(a, &[0x88, 0x80, 1, 2, 3, 4]);
        assert!(relay.lookup(a).is_err());
        assert!(relay.channels_of(a).is_empty());
    }

    #[test]
    fn broadcast_defaults_fill_missing_fields() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, sink) = upgraded(&mut relay);
        relay.drain_queue();
        sink.clear();

        relay.receive(a, &masked(br#"{"action":"broadcast"}"#));
        relay.drain_queue();

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["event"], "message");
        assert_eq!(messages[0]["channel"], "lobby");
        assert_eq!(messages[0]["data"], json!({}));
    }

    #[test]
    fn only_client_ping_refreshes_liveness_by_default() {
        let (mut relay, clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);
        let start = relay.lookup(a).unwrap().last_ping_at;

        clock.advance(Duration::from_secs(5));
        relay.receive(a, &masked(br#"{"action":"join_channel","channel":"ops"}"#));
        assert_eq!(relay.lookup(a).unwrap().last_ping_at, start);

        relay.receive(a, &masked(br#"{"action":"ping"}"#));
        assert_eq!(relay.lookup(a).unwrap().last_ping_at, clock.now());
    }

    #[test]
    fn refresh_on_any_frame_counts_every_frame() {
        let (mut relay, clock, _store) = relay_with_store();
        let mut config = RelayConfig::default();
        config.heartbeat.refresh_on_any_frame = true;
        relay.apply_config(&config);
        let (a, _sink) = upgraded(&mut relay);

        clock.advance(Duration::from_secs(5));
        relay.receive(a, &masked(br#"{"text":"hi"}"#));
        assert_eq!(relay.lookup(a).unwrap().last_ping_at, clock.now());
    }

    #[test]
    fn paused_relay_ignores_inbound() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);
        relay.pause(Duration::from_secs(60));
        assert_eq!(relay.stats().status, RelayStatus::Paused);

        relay.receive(a, &masked(br#"{"action":"join_channel","channel":"ops"}"#));
        assert!(!relay.channels_of(a).contains(&"ops".to_string()));

        relay.resume();
        relay.receive(a, &masked(br#"{"action":"join_channel","channel":"ops"}"#));
        assert!(relay.channels_of(a).contains(&"ops".to_string()));
    }

    #[test]
    fn emergency_reaches_every_channel_and_is_recorded() {
        let (mut relay, clock, store) = relay_with_store();
        let (a, sink) = upgraded(&mut relay);
        relay.subscribe(a, "ops").unwrap();
        relay.drain_queue();
        sink.clear();

        let recipients = relay.emergency("evacuate");
        relay.drain_queue();

        assert_eq!(recipients, 2);
        let messages = sink.messages();
        assert_eq!(sink.events(), vec!["emergency_alert", "emergency_alert"]);
        assert_eq!(messages[0]["data"]["severity"], "critical");
        assert_eq!(messages[0]["data"]["source"], "relay_emergency");

        let key = format!("relay_emergency_{}", clock.unix_time() as u64);
        let record = store.recall(&key).unwrap();
        assert_eq!(record["message"], "evacuate");
        assert_eq!(record["recipients"], 2);
    }

    #[test]
    fn stats_and_client_info_snapshot() {
        let (mut relay, clock, _store) = relay_with_store();
        let (a, _sink) = upgraded(&mut relay);
        clock.advance(Duration::from_secs(3));

        let stats = relay.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.channels["lobby"], 1);
        assert_eq!(stats.status, RelayStatus::Listening);
        assert!((stats.uptime - 3.0).abs() < 1e-6);

        let info = relay.client_info(a).unwrap();
        assert_eq!(info.client_id, a.to_string());
        assert_eq!(info.channels, vec!["lobby".to_string()]);
        assert!(info.handshake_complete);
        assert!((info.uptime - 3.0).abs() < 1e-6);
        assert!((clock.unix_time() - info.connected_at - 3.0).abs() < 1e-3);

        let ghost = ConnectionId::new();
        assert_eq!(relay.client_info(ghost), Err(RelayError::TargetNotFound(ghost)));
    }

    #[test]
    fn stop_notifies_upgraded_peers_once() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (_a, a_sink) = upgraded(&mut relay);
        let pending = RecordingSink::new();
        relay.accept(None, |_| Box::new(pending.clone()));
        relay.drain_queue();
        a_sink.clear();

        relay.stop();
        relay.stop();
        relay.drain_queue();

        assert!(!relay.is_running());
        assert_eq!(relay.stats().status, RelayStatus::Stopped);
        assert_eq!(a_sink.events(), vec!["server_shutdown"]);
        assert!(pending.raw().is_empty());
    }

    #[test]
    fn encoded_frames_are_what_sinks_receive() {
        let (mut relay, _clock, _store) = relay_with_store();
        let (a, sink) = upgraded(&mut relay);
        relay.drain_queue();
        sink.clear();

        relay.send(a, Body::pong(), SYSTEM_CHANNEL).unwrap();
        relay.drain_queue();

        let frame = &sink.raw()[0];
        let payload = frame::decode(frame).unwrap();
        assert_eq!(&encode(&payload), frame);
    }
}
