use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use serde::Deserialize;
use tokio::sync::broadcast;
use tracker_common::{Signal, TrackerConfig, internal, logging, tracing};
use tracker_dispatch::{Dispatcher, TransportConfig};
use tracker_queue::{MailQueue, QueueConfig};
use tracker_store::{MemoryStore, SubscriberStore};

use crate::processor::MailProcessor;

/// Where subscribers, keywords and teams live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    /// In memory, optionally seeded from a RON snapshot.
    Memory {
        #[serde(default)]
        seed: Option<PathBuf>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory { seed: None }
    }
}

impl StoreConfig {
    /// # Errors
    /// If the seed snapshot cannot be loaded.
    pub fn build(&self) -> anyhow::Result<Arc<dyn SubscriberStore>> {
        let store = match self {
            Self::Memory { seed: Some(seed) } => MemoryStore::from_snapshot_file(seed)?,
            Self::Memory { seed: None } => MemoryStore::new(),
        };

        Ok(Arc::new(store))
    }
}

/// The whole `tracker.config.ron`.
///
/// ```ron
/// (
///     tracker: (fqdn: "tracker.example.org"),
///     queue: (maildir: "/var/lib/tracker/maildir"),
///     transport: Smtp(host: "localhost", port: 25),
///     store: Memory(seed: Some("/etc/tracker/store.ron")),
/// )
/// ```
#[derive(Debug, Deserialize)]
pub struct Tracker {
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Tells the mail queue to drain and stop.
pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(8);
    sender
});

/// Wait for SIGINT or SIGTERM and ask the queue to drain. Resolves again only
/// on a second SIGINT, which abandons the messages still being processed.
#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "Interrupted, draining the mail queue (interrupt again to stop at once)");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "SIGTERM received, draining the mail queue");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|_| anyhow::anyhow!("Mail queue stopped before it could be drained"))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Interrupted again, abandoning messages in flight");

    Ok(())
}

impl Tracker {
    /// # Errors
    /// If the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config from {}: {e}", path.display())
        })?;

        Self::from_ron(&content)
    }

    /// Optional values may be written bare, without `Some(...)`.
    ///
    /// # Errors
    /// If `content` is not a valid configuration.
    pub fn from_ron(content: &str) -> anyhow::Result<Self> {
        let tracker: Self = ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(content)?;
        tracker.queue.validate()?;
        Ok(tracker)
    }

    /// # Errors
    /// If the subscriber store cannot be built.
    pub fn dispatcher(&self) -> anyhow::Result<Dispatcher> {
        Ok(Dispatcher::new(
            Arc::new(self.tracker.clone()),
            self.store.build()?,
            self.transport.build(),
        ))
    }

    /// # Errors
    /// If the subscriber store cannot be built.
    pub fn processor(&self) -> anyhow::Result<MailProcessor> {
        Ok(MailProcessor::new(self.dispatcher()?))
    }

    /// Run the mail queue until SIGINT or SIGTERM.
    ///
    /// # Errors
    /// If the store, the maildir or the queue cannot be set up, or the queue
    /// stops with an error.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();

        let processor = Arc::new(self.processor()?);
        let mut queue = MailQueue::new(self.queue, processor)?;

        internal!(level = INFO, "Controller running for {}", self.tracker.fqdn);

        let ret = tokio::select! {
            r = queue.serve(SHUTDOWN_BROADCAST.subscribe()) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Tracker stopped after settling {} messages", queue.processed());

        ret
    }
}
