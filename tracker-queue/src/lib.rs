//! A crash tolerant mail queue over a maildir style directory.
//!
//! Files dropped into `new/` are handed to a [`MessageHandler`] on a bounded
//! pool of worker threads. Failures are retried on a fixed table of delays;
//! rejected messages move to `failed/` and messages that keep failing move to
//! `broken/`.

pub mod config;
pub mod entry;
pub mod error;
pub mod handler;
pub mod maildir;
pub mod pool;
pub mod queue;

pub use config::QueueConfig;
pub use entry::QueueEntry;
pub use error::{QueueError, TaskError};
pub use handler::MessageHandler;
pub use maildir::Maildir;
pub use pool::{TaskHandle, WorkerPool};
pub use queue::MailQueue;
