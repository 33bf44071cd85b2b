//! Hot reload of the relay configuration.
//!
//! The file's parent directory is watched rather than the file itself, so
//! editors that save by renaming a temp file over it are still picked up.
//! A reload that parses to the configuration already in force is not
//! forwarded; one save usually fires several events.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::RelayConfig;

/// Only used by backends that poll.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

type Override = Box<dyn Fn(&mut RelayConfig) + Send>;

/// Watches a config file and sends each distinct valid configuration.
pub struct ConfigWatcher {
    reloader: Reloader,
}

struct Reloader {
    path: PathBuf,
    last_sent: RelayConfig,
    adjust: Option<Override>,
    tx: mpsc::UnboundedSender<RelayConfig>,
}

impl ConfigWatcher {
    /// `current` is the configuration the relay is running with; a reload
    /// equal to it is skipped.
    pub fn new(
        path: &Path,
        current: RelayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RelayConfig>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reloader = Reloader {
            path: path.to_path_buf(),
            last_sent: current,
            adjust: None,
            tx,
        };
        (Self { reloader }, rx)
    }

    /// Apply command-line overrides to every reloaded configuration.
    pub fn with_override(mut self, adjust: impl Fn(&mut RelayConfig) + Send + 'static) -> Self {
        self.reloader.adjust = Some(Box::new(adjust));
        self
    }

    /// Start watching. Updates stop when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.reloader.path.clone();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut reloader = self.reloader;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| reloader.handle(res),
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

impl Reloader {
    fn handle(&mut self, res: notify::Result<Event>) {
        match res {
            Ok(event) if self.concerns(&event) => {
                self.reload();
            }
            Ok(_) => {}
            Err(e) => tracing::error!(path = %self.path.display(), error = %e, "Config watch error"),
        }
    }

    fn concerns(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }

    /// Returns whether a new configuration was sent.
    fn reload(&mut self) -> bool {
        let mut next = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "Config reload rejected, keeping current configuration"
                );
                return false;
            }
        };
        if let Some(adjust) = &self.adjust {
            adjust(&mut next);
        }

        if next == self.last_sent {
            tracing::debug!(path = %self.path.display(), "Config unchanged");
            return false;
        }
        if self.tx.send(next.clone()).is_err() {
            tracing::debug!("Config update receiver is gone");
            return false;
        }

        tracing::info!(path = %self.path.display(), "Config change detected");
        self.last_sent = next;
        true
    }
}
