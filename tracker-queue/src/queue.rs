use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use notify::{RecursiveMode, Watcher};
use tokio::sync::{Notify, broadcast, mpsc};
use tracker_common::{Signal, incoming, internal};

use crate::{
    config::QueueConfig,
    entry::QueueEntry,
    error::{QueueError, TaskError},
    handler::MessageHandler,
    maildir::Maildir,
    pool::WorkerPool,
};

/// What happened to an entry whose task completed.
enum Settled {
    Done,
    Rejected,
    Retry { delay: Duration, tries: usize },
    Exhausted,
}

/// Coordinates the processing of every message in a maildir's `new/`.
///
/// The queue owns all entry state and is driven from a single task; the
/// worker pool only ever sees a path and a `log_failure` flag. The directory
/// is the source of truth: anything left in `new/` after a crash is picked up
/// again on the next start.
pub struct MailQueue {
    maildir: Maildir,
    config: QueueConfig,
    retry_delays: Vec<Duration>,
    handler: Arc<dyn MessageHandler>,
    entries: BTreeMap<String, QueueEntry>,
    processed: usize,
    pool: Option<WorkerPool>,
    completed: Arc<Notify>,
}

impl std::fmt::Debug for MailQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailQueue")
            .field("maildir", &self.maildir)
            .field("entries", &self.entries.len())
            .field("processed", &self.processed)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl MailQueue {
    /// # Errors
    /// If the configuration is invalid or the maildir cannot be created.
    pub fn new(config: QueueConfig, handler: Arc<dyn MessageHandler>) -> Result<Self, QueueError> {
        config.validate()?;

        let maildir = Maildir::new(&config.maildir);
        maildir.init()?;

        Ok(Self {
            maildir,
            retry_delays: config.retry_delays(),
            config,
            handler,
            entries: BTreeMap::new(),
            processed: 0,
            pool: None,
            completed: Arc::new(Notify::new()),
        })
    }

    pub const fn maildir(&self) -> &Maildir {
        &self.maildir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that reached a terminal state so far.
    pub const fn processed(&self) -> usize {
        self.processed
    }

    pub fn entry(&self, identifier: &str) -> Option<&QueueEntry> {
        self.entries.get(identifier)
    }

    /// Sync the entries with `new/`: queue unknown files and withdraw idle
    /// entries whose file is gone. Returns how many entries were added.
    ///
    /// # Errors
    /// If `new/` cannot be read.
    pub fn scan(&mut self) -> Result<usize, QueueError> {
        let found = self.maildir.list_new()?;
        let present: HashSet<&str> = found.iter().map(|(name, _)| name.as_str()).collect();

        self.entries.retain(|identifier, entry| {
            let keep = entry.is_running() || present.contains(identifier.as_str());
            if !keep {
                incoming!(level = INFO, "Message {identifier} was withdrawn");
            }
            keep
        });

        let mut added = 0;
        for (identifier, path) in found {
            if self.add(identifier, path) {
                added += 1;
            }
        }

        if added > 0 {
            internal!(level = DEBUG, "Scan queued {added} messages");
        }
        Ok(added)
    }

    /// A file is never queued twice.
    fn add(&mut self, identifier: String, path: PathBuf) -> bool {
        if self.entries.contains_key(&identifier) {
            return false;
        }

        incoming!(level = DEBUG, "Queued message {identifier}");
        self.entries
            .insert(identifier.clone(), QueueEntry::new(identifier, path));
        true
    }

    fn on_event(&mut self, event: &notify::Event) {
        for path in &event.paths {
            if !self.maildir.is_new_message(path) {
                continue;
            }
            let Some(identifier) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            if path.exists() {
                self.add(identifier.to_string(), path.clone());
            } else if self
                .entries
                .get(identifier)
                .is_some_and(|entry| !entry.is_running())
            {
                incoming!(level = INFO, "Message {identifier} was withdrawn");
                self.entries.remove(identifier);
            }
        }
    }

    /// One pass over the entries: settle finished tasks, start runnable
    /// entries, and return how long the coordinator may sleep.
    ///
    /// # Errors
    /// If the worker pool cannot be started or refuses work.
    pub fn tick(&mut self) -> Result<Duration, QueueError> {
        self.resolve();
        self.start_runnable()?;
        Ok(self.sleep_time())
    }

    fn resolve(&mut self) {
        let finished: Vec<(String, Result<(), TaskError>)> = self
            .entries
            .iter()
            .filter_map(|(identifier, entry)| {
                let result = entry.task.as_ref()?.poll()?;
                Some((identifier.clone(), result))
            })
            .collect();

        let now = Instant::now();
        for (identifier, result) in finished {
            self.settle(&identifier, result, now);
        }
    }

    fn settle(&mut self, identifier: &str, result: Result<(), TaskError>, now: Instant) {
        let Some(entry) = self.entries.get_mut(identifier) else {
            return;
        };
        entry.task = None;

        let settled = match &result {
            Ok(()) => Settled::Done,
            Err(e) if e.is_classified() => Settled::Rejected,
            Err(_) => {
                let tries = entry.tries;
                if entry.schedule_retry(&self.retry_delays, now) {
                    Settled::Retry {
                        delay: self.retry_delays[tries],
                        tries: entry.tries,
                    }
                } else {
                    Settled::Exhausted
                }
            }
        };
        let path = entry.path.clone();
        let reason = result.err().map(|e| e.to_string()).unwrap_or_default();

        let moved = match settled {
            Settled::Retry { delay, tries } => {
                internal!(
                    level = WARN,
                    "Message {identifier} failed, retry {tries} in {}s: {reason}",
                    delay.as_secs()
                );
                return;
            }
            Settled::Done => {
                internal!(level = DEBUG, "Message {identifier} processed");
                Maildir::remove(&path)
            }
            Settled::Rejected => {
                incoming!(level = WARN, "Message {identifier} rejected, moving to failed/: {reason}");
                self.maildir.move_to_failed(&path).map(|_| ())
            }
            Settled::Exhausted => {
                internal!(
                    level = ERROR,
                    "Message {identifier} failed {} times, moving to broken/: {reason}",
                    self.retry_delays.len() + 1
                );
                self.maildir.move_to_broken(&path).map(|_| ())
            }
        };

        if let Err(e) = moved {
            internal!(level = ERROR, "Unable to settle {}: {e}", path.display());
        }

        self.entries.remove(identifier);
        self.processed += 1;
    }

    fn start_runnable(&mut self) -> Result<(), QueueError> {
        let now = Instant::now();
        let runnable: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_runnable(now))
            .map(|(identifier, _)| identifier.clone())
            .collect();

        if runnable.is_empty() {
            return Ok(());
        }

        if self.pool.is_none() {
            self.pool = Some(WorkerPool::new(
                self.config.workers,
                self.config.max_tasks_per_worker,
                Arc::clone(&self.handler),
                Arc::clone(&self.completed),
            )?);
        }
        let Some(pool) = self.pool.as_ref() else {
            return Ok(());
        };

        for identifier in runnable {
            let Some(entry) = self.entries.get_mut(&identifier) else {
                continue;
            };

            if !entry.path.exists() {
                incoming!(level = INFO, "Message {identifier} was withdrawn");
                self.entries.remove(&identifier);
                continue;
            }

            entry.task = Some(pool.submit(entry.path.clone(), entry.log_failure)?);
        }

        Ok(())
    }

    fn sleep_time(&self) -> Duration {
        let now = Instant::now();
        let idle = self.config.idle_timeout();

        if self.entries.values().any(|entry| entry.is_runnable(now)) {
            return Duration::ZERO;
        }

        self.entries
            .values()
            .filter(|entry| !entry.is_running())
            .filter_map(|entry| entry.next_try_time)
            .map(|at| at.saturating_duration_since(now))
            .min()
            .map_or(idle, |nearest| nearest.min(idle))
    }

    /// Process messages until shutdown, or until `stop_after` entries reached
    /// a terminal state.
    ///
    /// `new/` is watched for changes and rescanned whenever the idle timeout
    /// expires. Before returning, the worker pool is drained and the results
    /// of tasks still in flight are settled.
    ///
    /// # Errors
    /// If the maildir cannot be watched or read, or the pool fails.
    #[tracing::instrument(level = "debug", skip_all, fields(maildir = %self.maildir.root().display()))]
    pub async fn process_loop(
        &mut self,
        stop_after: Option<usize>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), QueueError> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            match event {
                Ok(event) => {
                    if events_tx.send(event).is_err() {
                        internal!(level = TRACE, "Maildir event after the queue stopped");
                    }
                }
                Err(e) => internal!(level = WARN, "Maildir watch error: {e}"),
            }
        })?;
        watcher.watch(&self.maildir.new_dir(), RecursiveMode::NonRecursive)?;

        self.scan()?;

        let completed = Arc::clone(&self.completed);
        let idle = self.config.idle_timeout();

        let result = loop {
            let sleep = match self.tick() {
                Ok(sleep) => sleep,
                Err(e) => break Err(e),
            };

            if stop_after.is_some_and(|limit| self.processed >= limit) {
                break Ok(());
            }

            if sleep.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                () = completed.notified() => {}
                Some(event) = events.recv() => self.on_event(&event),
                () = tokio::time::sleep(sleep) => {
                    if sleep >= idle
                        && let Err(e) = self.scan()
                    {
                        internal!(level = ERROR, "Unable to rescan maildir: {e}");
                    }
                }
                sig = shutdown.recv() => {
                    internal!(level = INFO, "Mail queue received {sig:?}, shutting down");
                    break Ok(());
                }
            }
        };

        drop(watcher);
        self.drain().await;

        result
    }

    /// Run until a shutdown signal arrives.
    ///
    /// # Errors
    /// As [`MailQueue::process_loop`].
    pub async fn serve(&mut self, shutdown: broadcast::Receiver<Signal>) -> Result<(), QueueError> {
        internal!(level = INFO, "Serving mail queue at {}", self.maildir.root().display());
        self.process_loop(None, shutdown).await
    }

    async fn drain(&mut self) {
        let Some(pool) = self.pool.take() else {
            return;
        };

        if let Err(e) = tokio::task::spawn_blocking(move || pool.join()).await {
            internal!(level = ERROR, "Unable to drain worker pool: {e}");
        }

        self.resolve();
    }
}
