//! Helpers for driving a [`Relay`] without sockets.

use serde_json::Value;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::RelayConfig;
use crate::net::{ConnectionId, FrameSink};
use crate::protocol::frame::{self, TEXT_FRAME};
use crate::store::MemoryStore;

use super::{ManualClock, Relay};

pub const UPGRADE_REQUEST: &str = "GET /chat HTTP/1.1\r\n\
    Host: localhost:8080\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    Sec-WebSocket-Version: 13\r\n\r\n";

/// Sink that keeps every write for inspection.
#[derive(Clone, Default)]
pub struct RecordingSink {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Every write, handshake response included.
    pub fn raw(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    /// Decoded JSON of every text frame written.
    pub fn envelopes(&self) -> Vec<Value> {
        self.raw()
            .iter()
            .filter(|bytes| bytes.first() == Some(&TEXT_FRAME))
            .filter_map(|bytes| frame::decode(bytes))
            .map(|payload| serde_json::from_slice(&payload).unwrap())
            .collect()
    }

    /// The `message` field of every envelope.
    pub fn messages(&self) -> Vec<Value> {
        self.envelopes()
            .into_iter()
            .map(|mut envelope| envelope["message"].take())
            .collect()
    }

    /// Event names of every envelope that carries one.
    pub fn events(&self) -> Vec<String> {
        self.messages()
            .iter()
            .filter_map(|m| m["event"].as_str().map(str::to_string))
            .collect()
    }
}

impl FrameSink for RecordingSink {
    fn write(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.writes.lock().unwrap().push(bytes);
        Ok(())
    }
}

pub fn relay_with_store() -> (Relay, Arc<ManualClock>, MemoryStore) {
    let clock = Arc::new(ManualClock::new());
    let store = MemoryStore::new();
    let relay = Relay::new(&RelayConfig::default(), Arc::new(store.clone()), clock.clone());
    (relay, clock, store)
}

pub fn relay_with_clock() -> (Relay, Arc<ManualClock>) {
    let (relay, clock, _store) = relay_with_store();
    (relay, clock)
}

/// Accept a connection and complete its handshake.
///
/// The welcome envelope is left queued.
pub fn upgraded(relay: &mut Relay) -> (ConnectionId, RecordingSink) {
    let sink = RecordingSink::new();
    let id = relay.accept(None, |_| Box::new(sink.clone()));
    // the engine drains between accept and the first read
    relay.drain_queue();
    relay.receive(id, UPGRADE_REQUEST.as_bytes());
    assert!(relay.lookup(id).unwrap().handshake_complete);
    (id, sink)
}

/// A masked client text frame.
pub fn masked(payload: &[u8]) -> Vec<u8> {
    let key = [0x37, 0xfa, 0x21, 0x3d];
    let mut out = vec![TEXT_FRAME];
    let len = payload.len();
    if len <= 125 {
        out.push(0x80 | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(0x80 | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(0x80 | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(&key);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    out
}
