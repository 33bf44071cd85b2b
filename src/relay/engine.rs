//! The task that owns the relay.
//!
//! # Data Flow
//! ```text
//! Listener ──accept──┐
//! reader tasks ──────┤
//! RelayHandle ───────┼─→ Engine (select!) → Relay → drain → heartbeat → drain
//! config watcher ────┤
//! sweep ticker ──────┘
//! ```
//!
//! # Design Decisions
//! - Exactly one task mutates connections and channels; everything else
//!   talks to it over channels
//! - Admin requests carry a `oneshot` reply, so every answer is a snapshot
//!   taken between two events
//! - While paused the accept branch is disabled and the listener backlog
//!   simply waits

use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::config::RelayConfig;
use crate::net::{spawn_io, ConnectionId, ConnectionPermit, Listener, SocketEvent};
use crate::store::EphemeralStore;

use super::{ClientInfo, Clock, DisconnectReason, Presence, Relay, RelayError, Stats};

const COMMAND_BUFFER: usize = 64;

/// A request from outside the engine.
#[derive(Debug)]
pub enum Command {
    Stats {
        reply: oneshot::Sender<Stats>,
    },
    Presence {
        channel: Option<String>,
        reply: oneshot::Sender<Presence>,
    },
    ClientInfo {
        id: ConnectionId,
        reply: oneshot::Sender<Result<ClientInfo, RelayError>>,
    },
    Broadcast {
        channel: String,
        event: String,
        data: Value,
        reply: oneshot::Sender<usize>,
    },
    Emergency {
        message: String,
        reply: oneshot::Sender<usize>,
    },
    Pause {
        ttl: Duration,
        reply: oneshot::Sender<()>,
    },
    Resume {
        reply: oneshot::Sender<()>,
    },
}

/// The engine is gone and can no longer answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("relay engine has stopped")]
pub struct EngineStopped;

/// Cloneable handle for talking to a running [`Engine`].
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<Command>,
}

impl RelayHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineStopped> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_| EngineStopped)?;
        rx.await.map_err(|_| EngineStopped)
    }

    pub async fn stats(&self) -> Result<Stats, EngineStopped> {
        self.request(|reply| Command::Stats { reply }).await
    }

    pub async fn presence(&self, channel: Option<String>) -> Result<Presence, EngineStopped> {
        self.request(|reply| Command::Presence { channel, reply }).await
    }

    pub async fn client_info(
        &self,
        id: ConnectionId,
    ) -> Result<Result<ClientInfo, RelayError>, EngineStopped> {
        self.request(|reply| Command::ClientInfo { id, reply }).await
    }

    pub async fn broadcast(
        &self,
        channel: String,
        event: String,
        data: Value,
    ) -> Result<usize, EngineStopped> {
        self.request(|reply| Command::Broadcast { channel, event, data, reply })
            .await
    }

    pub async fn emergency(&self, message: String) -> Result<usize, EngineStopped> {
        self.request(|reply| Command::Emergency { message, reply }).await
    }

    pub async fn pause(&self, ttl: Duration) -> Result<(), EngineStopped> {
        self.request(|reply| Command::Pause { ttl, reply }).await
    }

    pub async fn resume(&self) -> Result<(), EngineStopped> {
        self.request(|reply| Command::Resume { reply }).await
    }
}

pub struct Engine {
    relay: Relay,
    listener: Listener,
    config: RelayConfig,
    events_tx: mpsc::UnboundedSender<SocketEvent>,
    events_rx: mpsc::UnboundedReceiver<SocketEvent>,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    config_updates: Option<mpsc::UnboundedReceiver<RelayConfig>>,
}

impl Engine {
    pub fn new(
        config: RelayConfig,
        listener: Listener,
        store: Arc<dyn EphemeralStore>,
        clock: Arc<dyn Clock>,
    ) -> (Self, RelayHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);

        let engine = Self {
            relay: Relay::new(&config, store, clock),
            listener,
            config,
            events_tx,
            events_rx,
            commands,
            commands_open: true,
            config_updates: None,
        };
        (engine, RelayHandle { tx })
    }

    /// Apply configurations arriving on `updates` while running.
    pub fn with_config_updates(mut self, updates: mpsc::UnboundedReceiver<RelayConfig>) -> Self {
        self.config_updates = Some(updates);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.listener.local_addr()
    }

    /// Run until `shutdown` fires, then notify peers and return.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat.sweep_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(
                address = %addr,
                default_channel = %self.relay.settings().default_channel,
                "Relay engine started"
            );
        }

        loop {
            let paused = self.relay.is_paused();

            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = self.listener.accept(), if !paused => match accepted {
                    Ok((stream, peer, permit)) => self.admit(stream, peer, permit),
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                Some(event) = self.events_rx.recv() => self.on_socket_event(event),
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.on_command(command),
                    None => self.commands_open = false,
                },
                update = next_update(&mut self.config_updates) => match update {
                    Some(next) => {
                        let sweep = next.heartbeat.sweep_interval();
                        self.reload(next);
                        if sweep != ticker.period() {
                            ticker = tokio::time::interval(sweep);
                            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        }
                    }
                    None => self.config_updates = None,
                },
                _ = ticker.tick() => {}
            }

            self.relay.drain_queue();
            self.relay.heartbeat();
            self.relay.drain_queue();
        }

        self.relay.stop();
        let report = self.relay.drain_queue();
        tracing::info!(notified = report.delivered, "Relay engine stopped");
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let events = self.events_tx.clone();
        let read_buffer = self.config.limits.read_buffer_bytes;
        let outbound_buffer = self.config.limits.outbound_buffer;

        self.relay.accept(Some(peer), move |id| {
            Box::new(spawn_io(id, stream, permit, events, read_buffer, outbound_buffer))
        });
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Data { id, bytes } => self.relay.receive(id, &bytes),
            SocketEvent::Closed { id } => {
                self.relay.unregister(id, DisconnectReason::PeerClosed);
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Stats { reply } => {
                let _ = reply.send(self.relay.stats());
            }
            Command::Presence { channel, reply } => {
                let _ = reply.send(self.relay.presence(channel.as_deref()));
            }
            Command::ClientInfo { id, reply } => {
                let _ = reply.send(self.relay.client_info(id));
            }
            Command::Broadcast { channel, event, data, reply } => {
                let _ = reply.send(self.relay.broadcast(&channel, &event, data));
            }
            Command::Emergency { message, reply } => {
                let _ = reply.send(self.relay.emergency(&message));
            }
            Command::Pause { ttl, reply } => {
                self.relay.pause(ttl);
                let _ = reply.send(());
            }
            Command::Resume { reply } => {
                self.relay.resume();
                let _ = reply.send(());
            }
        }
    }

    fn reload(&mut self, next: RelayConfig) {
        if next.listener.bind_address != self.config.listener.bind_address
            || next.listener.max_connections != self.config.listener.max_connections
        {
            tracing::warn!("Listener changes take effect after a restart");
        }
        self.relay.apply_config(&next);
        self.config = next;
    }
}

async fn next_update(
    updates: &mut Option<mpsc::UnboundedReceiver<RelayConfig>>,
) -> Option<RelayConfig> {
    match updates {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
