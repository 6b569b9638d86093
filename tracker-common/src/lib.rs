pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod verp;

pub use config::TrackerConfig;
pub use message::Email;
pub use tracing;

/// Broadcast to long-running loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Stop taking new messages and drain what is in flight.
    Shutdown,
}
