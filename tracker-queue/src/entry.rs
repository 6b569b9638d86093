use std::{
    path::PathBuf,
    time::{Duration, Instant, SystemTime},
};

use crate::pool::TaskHandle;

/// One message file known to the queue.
#[derive(Debug)]
pub struct QueueEntry {
    pub identifier: String,
    pub path: PathBuf,
    pub creation_time: SystemTime,
    /// Retries scheduled so far.
    pub tries: usize,
    pub next_try_time: Option<Instant>,
    pub task: Option<TaskHandle>,
    /// Set when the next attempt is the last one.
    pub log_failure: bool,
}

impl QueueEntry {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
            creation_time: SystemTime::now(),
            tries: 0,
            next_try_time: None,
            task: None,
            log_failure: false,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn is_runnable(&self, now: Instant) -> bool {
        self.task.is_none() && self.next_try_time.is_none_or(|at| at <= now)
    }

    /// Schedule the next attempt from the retry table. Returns `false` once
    /// the table is exhausted.
    pub fn schedule_retry(&mut self, delays: &[Duration], now: Instant) -> bool {
        let Some(delay) = delays.get(self.tries) else {
            return false;
        };

        self.tries += 1;
        self.next_try_time = Some(now + *delay);
        self.log_failure = self.tries == delays.len();
        true
    }
}
