//! Outbound message routing.
//!
//! # Data Flow
//! ```text
//! send / broadcast
//!     → Envelope built and persisted to the ephemeral store
//!     → (target, envelope) appended to the global FIFO
//! drain_queue
//!     → target gone or not upgraded: dropped
//!     → otherwise JSON → text frame → connection sink
//!     → write failure: connection unregistered, message dropped
//! ```

use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::protocol::envelope::{Body, Envelope, EnvelopeId, RELAY_NAME};
use crate::protocol::frame;

use super::{DisconnectReason, Relay, RelayError};

/// A write waiting for the next drain.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: ConnectionId,
    pub envelope: Envelope,
}

#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Delivery>,
}

impl Outbox {
    pub fn push(&mut self, delivery: Delivery) {
        self.queue.push_back(delivery);
    }

    pub fn pop(&mut self) -> Option<Delivery> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivery> {
        self.queue.iter()
    }
}

/// Outcome of one [`Relay::drain_queue`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl Relay {
    /// Queue `body` for one connection.
    pub fn send(
        &mut self,
        id: ConnectionId,
        body: Body,
        channel: &str,
    ) -> Result<EnvelopeId, RelayError> {
        if !self.registry.contains(id) {
            return Err(RelayError::TargetNotFound(id));
        }

        let envelope = Envelope {
            id: EnvelopeId::new(),
            channel: channel.to_string(),
            message: body,
            timestamp: self.clock.unix_time(),
            sender: RELAY_NAME.to_string(),
        };
        let envelope_id = envelope.id;

        match serde_json::to_value(&envelope) {
            Ok(value) => self.store.remember(
                &envelope_id.store_key(),
                value,
                Duration::from_secs(self.settings.store.message_ttl_secs),
            ),
            Err(e) => tracing::warn!(envelope_id = %envelope_id, error = %e, "Envelope not persisted"),
        }

        self.outbox.push(Delivery { target: id, envelope });
        Ok(envelope_id)
    }

    /// Queue one event envelope for every current member of `channel`.
    ///
    /// Membership is read once up front; later joins are not included.
    /// Returns how many envelopes were queued.
    pub fn broadcast(&mut self, channel: &str, event: &str, data: Value) -> usize {
        self.directory.ensure(channel);
        let members = self.directory.members(channel);
        let body = Body::event(channel, event, data, self.clock.unix_time());

        let mut queued = 0;
        for id in members {
            match self.send(id, body.clone(), channel) {
                Ok(_) => queued += 1,
                Err(e) => tracing::warn!(channel, event, error = %e, "Broadcast skipped member"),
            }
        }

        metrics::record_broadcast(queued);
        tracing::debug!(channel, event, recipients = queued, "Broadcast queued");
        queued
    }

    /// Write every queued delivery in enqueue order.
    pub fn drain_queue(&mut self) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(Delivery { target, envelope }) = self.outbox.pop() {
            let Some(connection) = self.registry.get_mut(target) else {
                tracing::debug!(client_id = %target, envelope_id = %envelope.id, "Target gone, message dropped");
                metrics::record_dropped("unknown_target");
                report.dropped += 1;
                continue;
            };

            if !connection.handshake_complete {
                tracing::debug!(client_id = %target, envelope_id = %envelope.id, "Target not upgraded, message dropped");
                metrics::record_dropped("pre_handshake");
                report.dropped += 1;
                continue;
            }

            let json = match serde_json::to_vec(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(envelope_id = %envelope.id, error = %e, "Envelope not serializable");
                    metrics::record_dropped("serialize");
                    report.dropped += 1;
                    continue;
                }
            };

            match connection.write(frame::encode(&json)) {
                Ok(()) => {
                    metrics::record_delivered();
                    report.delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(client_id = %target, error = %e, "Delivery failed, dropping connection");
                    metrics::record_dropped("write_failed");
                    report.failed += 1;
                    self.unregister(target, DisconnectReason::WriteFailed);
                }
            }
        }

        report
    }

    /// Deliveries waiting for the next drain.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }
}
