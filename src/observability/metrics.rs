//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connections_opened_total` (counter)
//! - `relay_connections_closed_total` (counter, label `reason`)
//! - `relay_active_connections` (gauge)
//! - `relay_frames_delivered_total` (counter)
//! - `relay_deliveries_dropped_total` (counter, label `reason`)
//! - `relay_evictions_total` (counter, label `reason`)
//! - `relay_broadcasts_total` (counter)
//! - `relay_broadcast_recipients` (histogram)
//! - `relay_client_actions_total` (counter, label `action`)
//! - `relay_handshake_failures_total` (counter)
//!
//! Recording is a no-op until a recorder is installed, so the relay core
//! calls these freely in tests.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

pub const CONNECTIONS_OPENED_TOTAL: &str = "relay_connections_opened_total";
pub const CONNECTIONS_CLOSED_TOTAL: &str = "relay_connections_closed_total";
pub const ACTIVE_CONNECTIONS: &str = "relay_active_connections";
pub const FRAMES_DELIVERED_TOTAL: &str = "relay_frames_delivered_total";
pub const DELIVERIES_DROPPED_TOTAL: &str = "relay_deliveries_dropped_total";
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
pub const BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
pub const BROADCAST_RECIPIENTS: &str = "relay_broadcast_recipients";
pub const CLIENT_ACTIONS_TOTAL: &str = "relay_client_actions_total";
pub const HANDSHAKE_FAILURES_TOTAL: &str = "relay_handshake_failures_total";

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_connection_opened() {
    counter!(CONNECTIONS_OPENED_TOTAL).increment(1);
}

pub fn record_connection_closed(reason: &'static str) {
    counter!(CONNECTIONS_CLOSED_TOTAL, "reason" => reason).increment(1);
}

pub fn set_active_connections(count: usize) {
    gauge!(ACTIVE_CONNECTIONS).set(count as f64);
}

pub fn record_delivered() {
    counter!(FRAMES_DELIVERED_TOTAL).increment(1);
}

pub fn record_dropped(reason: &'static str) {
    counter!(DELIVERIES_DROPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_eviction(reason: &'static str) {
    counter!(EVICTIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_broadcast(recipients: usize) {
    counter!(BROADCASTS_TOTAL).increment(1);
    histogram!(BROADCAST_RECIPIENTS).record(recipients as f64);
}

pub fn record_client_action(action: &'static str) {
    counter!(CLIENT_ACTIONS_TOTAL, "action" => action).increment(1);
}

pub fn record_handshake_failure() {
    counter!(HANDSHAKE_FAILURES_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_connection_opened();
            record_connection_closed("heartbeat_timeout");
            set_active_connections(3);
        });

        let output = handle.render();
        assert!(output.contains(CONNECTIONS_OPENED_TOTAL));
        assert!(output.contains(r#"reason="heartbeat_timeout""#));
        assert!(output.contains("relay_active_connections 3"));
    }

    #[test]
    fn metric_names_are_prefixed_snake_case() {
        let names = [
            CONNECTIONS_OPENED_TOTAL,
            CONNECTIONS_CLOSED_TOTAL,
            ACTIVE_CONNECTIONS,
            FRAMES_DELIVERED_TOTAL,
            DELIVERIES_DROPPED_TOTAL,
            EVICTIONS_TOTAL,
            BROADCASTS_TOTAL,
            BROADCAST_RECIPIENTS,
            CLIENT_ACTIONS_TOTAL,
            HANDSHAKE_FAILURES_TOTAL,
        ];
        for name in names {
            assert!(name.starts_with("relay_"));
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
