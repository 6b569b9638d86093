use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::QueueError;

/// Delays between attempts, in seconds. The last one is the final retry.
pub const DEFAULT_RETRY_DELAYS: [u64; 6] = [150, 300, 600, 1800, 3600, 7200];

fn default_maildir() -> PathBuf {
    PathBuf::from("/var/lib/tracker/maildir")
}

const fn default_workers() -> usize {
    4
}

const fn default_max_tasks_per_worker() -> usize {
    100
}

fn default_retry_delays() -> Vec<u64> {
    DEFAULT_RETRY_DELAYS.to_vec()
}

const fn default_idle_timeout() -> u64 {
    3600
}

/// Settings for the mail queue.
///
/// ```ron
/// queue: (
///     maildir: "/var/lib/tracker/maildir",
///     workers: 4,
///     max_tasks_per_worker: 100,
///     retry_delays_secs: [150, 300, 600, 1800, 3600, 7200],
///     idle_timeout_secs: 3600,
/// ),
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_maildir")]
    pub maildir: PathBuf,

    /// Number of worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Tasks a worker thread runs before it is replaced.
    #[serde(default = "default_max_tasks_per_worker")]
    pub max_tasks_per_worker: usize,

    /// Zero delays are allowed and make a retry immediately runnable.
    #[serde(default = "default_retry_delays")]
    pub retry_delays_secs: Vec<u64>,

    /// Longest sleep with nothing to do. The maildir is rescanned whenever
    /// it expires.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            maildir: default_maildir(),
            workers: default_workers(),
            max_tasks_per_worker: default_max_tasks_per_worker(),
            retry_delays_secs: default_retry_delays(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl QueueConfig {
    pub fn with_maildir(maildir: impl Into<PathBuf>) -> Self {
        Self {
            maildir: maildir.into(),
            ..Self::default()
        }
    }

    /// # Errors
    /// If there are no workers, workers may run no task, or the idle timeout
    /// is zero.
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.workers == 0 {
            return Err(QueueError::Config("workers must be at least 1".to_string()));
        }
        if self.max_tasks_per_worker == 0 {
            return Err(QueueError::Config(
                "max_tasks_per_worker must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(QueueError::Config(
                "idle_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delays(&self) -> Vec<Duration> {
        self.retry_delays_secs
            .iter()
            .copied()
            .map(Duration::from_secs)
            .collect()
    }

    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
