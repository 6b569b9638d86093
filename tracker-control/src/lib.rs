//! The `control@` address: plain text commands that manage subscriptions,
//! keywords and team memberships.

pub mod command;
pub mod commands;
pub mod confirmation;
pub mod error;
pub mod handler;
pub mod processor;
pub mod reply;

pub use command::{Command, Confirmable, ConfirmableCommand, Session};
pub use confirmation::ConfirmationSet;
pub use error::ControlError;
pub use handler::{ControlHandler, ControlOutcome};
pub use processor::CommandProcessor;
pub use reply::Reply;
