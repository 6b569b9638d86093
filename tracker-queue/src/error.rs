use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Invalid queue configuration: {0}")]
    Config(String),
}

/// Outcome of a failed task.
///
/// Classified failures are permanent and never retried; everything else is
/// assumed to be transient.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("{0}")]
    Classified(String),

    #[error("{0}")]
    Unclassified(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub const fn is_classified(&self) -> bool {
        matches!(self, Self::Classified(_))
    }
}
