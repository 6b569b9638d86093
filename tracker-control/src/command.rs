use std::fmt;

use tracker_common::TrackerConfig;
use tracker_dispatch::Dispatcher;
use tracker_store::SubscriberStore;

use crate::{confirmation::ConfirmationSet, error::ControlError, reply::Reply};

/// State shared by every command of one processing run.
pub struct Session<'a> {
    pub dispatcher: &'a Dispatcher,
    /// Replaying commands from a `confirm`: confirmable commands act for real.
    pub confirmed: bool,
    pub confirmations: &'a mut ConfirmationSet,
}

impl Session<'_> {
    pub fn store(&self) -> &dyn SubscriberStore {
        self.dispatcher.store()
    }

    pub fn config(&self) -> &TrackerConfig {
        self.dispatcher.config()
    }
}

/// A parsed control command.
///
/// The `Display` form is the normalised command text: it is what the
/// duplicate guard compares and what gets stored for confirmation, so it must
/// parse back into the same command.
pub trait Command: fmt::Display + fmt::Debug {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError>;

    /// Stops processing of the remaining lines.
    fn is_quit(&self) -> bool {
        false
    }
}

/// A command that only takes effect once the user confirms it by mail.
pub trait Confirmable: fmt::Display + fmt::Debug {
    /// Whose confirmation is needed.
    fn user_email(&self) -> &str;

    /// Runs instead of [`Confirmable::handle`] before confirmation. Returns
    /// whether a confirmation should be requested at all.
    fn pre_confirm(&mut self, _session: &Session<'_>, reply: &mut Reply) -> Result<bool, ControlError> {
        reply.reply(format!(
            "A confirmation mail has been sent to {}",
            self.user_email()
        ));
        Ok(true)
    }

    /// Explanation included in the confirmation mail.
    fn confirmation_message(&self) -> String {
        String::new()
    }

    fn handle(&mut self, session: &Session<'_>, reply: &mut Reply) -> Result<(), ControlError>;
}

/// Runs the two phase protocol around a [`Confirmable`].
#[derive(Debug)]
pub struct ConfirmableCommand<C> {
    inner: C,
}

impl<C: Confirmable> ConfirmableCommand<C> {
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: Confirmable> fmt::Display for ConfirmableCommand<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl<C: Confirmable> Command for ConfirmableCommand<C> {
    fn execute(&mut self, session: &mut Session<'_>, reply: &mut Reply) -> Result<(), ControlError> {
        if session.confirmed {
            return self.inner.handle(session, reply);
        }

        if self.inner.pre_confirm(session, reply)? {
            // pre_confirm may have rewritten the command, so render it after.
            session.confirmations.add(
                self.inner.user_email(),
                self.inner.to_string(),
                self.inner.confirmation_message(),
            );
        }

        Ok(())
    }
}

/// Boxed constructor used by the command table.
pub(crate) fn confirmable<C: Confirmable + 'static>(inner: C) -> Box<dyn Command> {
    Box::new(ConfirmableCommand::new(inner))
}

pub(crate) fn plain<C: Command + 'static>(command: C) -> Box<dyn Command> {
    Box::new(command)
}
