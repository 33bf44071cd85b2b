//! Liveness sweep.
//!
//! Runs after every engine wake-up. Upgraded connections that have not
//! pinged within the timeout are evicted; connections still waiting for a
//! handshake are evicted once the handshake window closes. On its own
//! cadence the sweep also queues a ping for every upgraded connection.
//!
//! Only a client `ping` action (or any frame, with `refresh_on_any_frame`)
//! counts as proof of life. The server's own pings are not answered by
//! conforming clients in a way the relay observes.

use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::envelope::{Body, SYSTEM_CHANNEL};

use super::{DisconnectReason, Relay};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub handshake_expired: usize,
    pub pinged: usize,
}

impl Relay {
    pub fn heartbeat(&mut self) -> SweepReport {
        let mut report = SweepReport::default();
        if self.is_paused() {
            return report;
        }

        let now = self.clock.now();
        let timeout = self.settings.heartbeat.timeout();
        let handshake_timeout = self.settings.heartbeat.handshake_timeout();

        let mut stale: Vec<ConnectionId> = Vec::new();
        let mut unupgraded: Vec<ConnectionId> = Vec::new();
        for connection in self.registry.iter() {
            if connection.handshake_complete {
                if now.saturating_duration_since(connection.last_ping_at) > timeout {
                    stale.push(connection.id());
                }
            } else if now.saturating_duration_since(connection.joined_at) > handshake_timeout {
                unupgraded.push(connection.id());
            }
        }

        for id in stale {
            tracing::info!(client_id = %id, "Heartbeat timeout");
            metrics::record_eviction(DisconnectReason::HeartbeatTimeout.as_str());
            if self.unregister(id, DisconnectReason::HeartbeatTimeout) {
                report.evicted += 1;
            }
        }
        for id in unupgraded {
            tracing::info!(client_id = %id, "Handshake window expired");
            metrics::record_eviction(DisconnectReason::HandshakeTimeout.as_str());
            if self.unregister(id, DisconnectReason::HandshakeTimeout) {
                report.handshake_expired += 1;
            }
        }

        let interval = self.settings.heartbeat.ping_interval();
        let due = self
            .last_ping_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        if due {
            for id in self.registry.upgraded() {
                if self.send(id, Body::ping(), SYSTEM_CHANNEL).is_ok() {
                    report.pinged += 1;
                }
            }
            self.last_ping_sent = Some(now);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Clock;
    use crate::relay::testing::{masked, relay_with_clock, upgraded, RecordingSink};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn stale_connection_is_evicted_everywhere() {
        let (mut relay, clock) = relay_with_clock();
        let (a, _sink) = upgraded(&mut relay);
        relay.subscribe(a, "ops").unwrap();

        clock.advance(Duration::from_secs(31));
        let report = relay.heartbeat();

        assert_eq!(report.evicted, 1);
        assert!(relay.lookup(a).is_err());
        assert!(relay.channels_of(a).is_empty());
        assert_eq!(relay.connection_count(), 0);
    }

    #[test]
    fn timeout_boundary_is_exclusive() {
        let (mut relay, clock) = relay_with_clock();
        let (a, _sink) = upgraded(&mut relay);

        clock.advance(Duration::from_secs(30));
        assert_eq!(relay.heartbeat().evicted, 0);
        assert!(relay.lookup(a).is_ok());
    }

    #[test]
    fn client_ping_keeps_connection_alive() {
        let (mut relay, clock) = relay_with_clock();
        let (a, _sink) = upgraded(&mut relay);

        clock.advance(Duration::from_secs(25));
        relay.receive(a, &masked(br#"{"action":"ping"}"#));
        clock.advance(Duration::from_secs(25));

        assert_eq!(relay.heartbeat().evicted, 0);
        assert!(relay.lookup(a).is_ok());
    }

    #[test]
    fn eviction_tells_remaining_members() {
        let (mut relay, clock) = relay_with_clock();
        let (a, _a_sink) = upgraded(&mut relay);
        clock.advance(Duration::from_secs(20));
        let (b, b_sink) = upgraded(&mut relay);
        relay.drain_queue();
        b_sink.clear();

        clock.advance(Duration::from_secs(11));
        relay.heartbeat();
        relay.drain_queue();

        assert!(relay.lookup(a).is_err());
        assert!(relay.lookup(b).is_ok());
        let messages = b_sink.messages();
        assert_eq!(b_sink.events(), vec!["user_left"]);
        assert_eq!(messages[0]["data"]["client_id"], a.to_string());
    }

    #[test]
    fn unupgraded_connection_expires_after_handshake_window() {
        let (mut relay, clock) = relay_with_clock();
        let id = relay.accept(None, |_| Box::new(RecordingSink::new()));

        clock.advance(Duration::from_secs(10));
        assert_eq!(relay.heartbeat().handshake_expired, 0);

        clock.advance(Duration::from_secs(1));
        let report = relay.heartbeat();
        assert_eq!(report.handshake_expired, 1);
        assert!(relay.lookup(id).is_err());
        assert!(relay.channels_of(id).is_empty());
    }

    #[test]
    fn pings_go_out_immediately_then_on_cadence() {
        let (mut relay, clock) = relay_with_clock();
        let (a, sink) = upgraded(&mut relay);
        relay.drain_queue();
        sink.clear();

        assert_eq!(relay.heartbeat().pinged, 1);
        clock.advance(Duration::from_secs(9));
        assert_eq!(relay.heartbeat().pinged, 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(relay.heartbeat().pinged, 1);

        relay.drain_queue();
        let envelopes = sink.envelopes();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(envelopes[0]["channel"], "system");
        assert_eq!(envelopes[0]["message"], json!({"ping": true}));

        // server pings do not refresh liveness
        assert!(relay.lookup(a).unwrap().last_ping_at < clock.now());
    }

    #[test]
    fn paused_relay_skips_eviction() {
        let (mut relay, clock) = relay_with_clock();
        let (a, _sink) = upgraded(&mut relay);
        relay.pause(Duration::from_secs(600));

        clock.advance(Duration::from_secs(31));
        assert_eq!(relay.heartbeat(), SweepReport::default());
        assert!(relay.lookup(a).is_ok());

        relay.resume();
        assert_eq!(relay.heartbeat().evicted, 1);
    }
}
