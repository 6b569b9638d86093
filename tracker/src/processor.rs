//! Routing one incoming message to the engine that owns its address.

use std::path::Path;

use tracker_common::{Email, incoming, internal};
use tracker_control::{ControlHandler, ControlOutcome};
use tracker_dispatch::{
    BounceOutcome, Dispatcher, ForwardOutcome, Route, RoutingError, router,
};
use tracker_queue::{MessageHandler, TaskError};

use crate::error::MailError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailOutcome {
    Control(ControlOutcome),
    Dispatch(ForwardOutcome),
    Bounces(BounceOutcome),
    Team(ForwardOutcome),
}

/// Reads messages and hands them to control, dispatch, bounce or team
/// handling depending on the tracker address they were delivered to.
#[derive(Debug, Clone)]
pub struct MailProcessor {
    dispatcher: Dispatcher,
    control: ControlHandler,
}

impl MailProcessor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            control: ControlHandler::new(dispatcher.clone()),
            dispatcher,
        }
    }

    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// # Errors
    /// If the file cannot be read, or processing the message fails.
    pub fn process_file(&self, path: &Path) -> Result<MailOutcome, MailError> {
        let raw = std::fs::read(path).map_err(|source| MailError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        self.process(raw)
    }

    /// # Errors
    /// [`RoutingError`] when the bytes are not a message or were not
    /// delivered to exactly one valid tracker address. Anything else comes
    /// from the engine the message was routed to.
    pub fn process(&self, raw: impl Into<Vec<u8>>) -> Result<MailOutcome, MailError> {
        let email =
            Email::parse(raw).map_err(|e| RoutingError::MalformedMessage(e.to_string()))?;

        self.process_email(&email)
    }

    /// # Errors
    /// As [`MailProcessor::process`].
    #[tracing::instrument(level = "debug", skip_all, fields(message_id = email.message_id()))]
    pub fn process_email(&self, email: &Email) -> Result<MailOutcome, MailError> {
        let config = self.dispatcher.config();

        let address = router::find_delivery_address(email, &config.fqdn)?
            .ok_or(RoutingError::MissingDeliveryAddress)?;
        let route = router::route(&address, config)?;

        incoming!(level = INFO, "Message delivered to {address}: {route:?}");

        match route {
            Route::Control => self.handle_control(email),
            Route::Dispatch { package, keyword } => {
                self.handle_dispatch(email, package.as_deref(), keyword.as_deref())
            }
            Route::Bounces { details } => self.handle_bounces(details.as_deref()),
            Route::Team { slug } => self.handle_team(email, &slug),
        }
    }

    fn handle_control(&self, email: &Email) -> Result<MailOutcome, MailError> {
        Ok(MailOutcome::Control(self.control.handle(email)?))
    }

    fn handle_dispatch(
        &self,
        email: &Email,
        package: Option<&str>,
        keyword: Option<&str>,
    ) -> Result<MailOutcome, MailError> {
        Ok(MailOutcome::Dispatch(
            self.dispatcher.process(email, package, keyword)?,
        ))
    }

    fn handle_bounces(&self, details: Option<&str>) -> Result<MailOutcome, MailError> {
        let local = details.map_or_else(|| "bounces".to_string(), |details| format!("bounces+{details}"));
        let address = self.dispatcher.config().address(&local);

        Ok(MailOutcome::Bounces(self.dispatcher.handle_bounces(&address)?))
    }

    fn handle_team(&self, email: &Email, slug: &str) -> Result<MailOutcome, MailError> {
        Ok(MailOutcome::Team(self.dispatcher.forward_to_team(email, slug)?))
    }
}

impl MessageHandler for MailProcessor {
    fn handle(&self, path: &Path, log_failure: bool) -> Result<(), TaskError> {
        match self.process_file(path) {
            Ok(outcome) => {
                internal!(level = DEBUG, "Processed {}: {outcome:?}", path.display());
                Ok(())
            }
            Err(e) if e.is_classified() => Err(TaskError::Classified(e.to_string())),
            Err(e) => {
                if log_failure {
                    internal!(
                        level = ERROR,
                        "Giving up on {} after its last attempt: {e:?}",
                        path.display()
                    );
                }
                Err(TaskError::Unclassified(e.to_string()))
            }
        }
    }
}
