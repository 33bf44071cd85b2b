//! Shared utilities for integration tests.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use channel_relay::config::RelayConfig;
use channel_relay::lifecycle::Shutdown;
use channel_relay::net::Listener;
use channel_relay::relay::{Engine, RelayHandle, SystemClock};
use channel_relay::store::MemoryStore;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// A relay running on an ephemeral port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub handle: RelayHandle,
    pub store: MemoryStore,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

impl TestRelay {
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Trigger shutdown and wait for the engine to exit.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(READ_TIMEOUT, self.task).await;
    }
}

/// Start a relay with `config` on 127.0.0.1:0.
pub async fn start_relay(config: RelayConfig) -> TestRelay {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);
    let store = MemoryStore::new();

    let (engine, handle) = Engine::new(
        config,
        listener,
        Arc::new(store.clone()),
        Arc::new(SystemClock),
    );
    let shutdown = Shutdown::new();
    let task = tokio::spawn(engine.run(shutdown.subscribe()));

    TestRelay {
        addr,
        handle,
        store,
        shutdown,
        task,
    }
}

/// Connect and wait for the welcome; returns the client and its id.
pub async fn connect(relay: &TestRelay) -> (Client, String) {
    let (mut ws, response) = tokio_tungstenite::connect_async(relay.url()).await.unwrap();
    assert_eq!(response.status().as_u16(), 101);

    let welcome = expect_event(&mut ws, "welcome").await;
    let id = welcome["client_id"].as_str().unwrap().to_string();
    (ws, id)
}

pub async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next envelope from the relay, or `None` on close or timeout.
pub async fn next_envelope(ws: &mut Client, wait: Duration) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(wait, ws.next()).await.ok()??.ok()?;
        match msg {
            Message::Text(text) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Read envelopes until one matches; returns the whole envelope.
pub async fn expect_envelope(ws: &mut Client, matches: impl Fn(&Value) -> bool) -> Value {
    loop {
        let envelope = next_envelope(ws, READ_TIMEOUT)
            .await
            .expect("connection ended before the expected envelope");
        if matches(&envelope) {
            return envelope;
        }
    }
}

/// Read envelopes until one carries `event`; returns its `message` body.
pub async fn expect_event(ws: &mut Client, event: &str) -> Value {
    let envelope = expect_envelope(ws, |e| e["message"]["event"] == event).await;
    envelope["message"].clone()
}

/// Config with test-friendly timings.
pub fn fast_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.heartbeat.sweep_interval_ms = 50;
    config
}
