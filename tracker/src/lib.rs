//! Mail processing core of a package tracker.
//!
//! Messages land in a maildir, the [`tracker_queue::MailQueue`] hands each
//! one to a [`MailProcessor`], and the processor routes it by the tracker
//! address it was delivered to.

pub mod controller;
pub mod error;
pub mod processor;

pub use controller::{SHUTDOWN_BROADCAST, StoreConfig, Tracker};
pub use error::MailError;
pub use processor::{MailOutcome, MailProcessor};
