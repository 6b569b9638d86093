use std::path::Path;

use lettre::Transport as LettreTransport;

use super::{Connection, OutgoingMessage, Transport};
use crate::error::TransportError;

/// Pipes every message into a `sendmail` compatible binary.
#[derive(Debug, Clone)]
pub struct SendmailTransport {
    inner: lettre::SendmailTransport,
}

impl SendmailTransport {
    pub fn new() -> Self {
        Self {
            inner: lettre::SendmailTransport::new(),
        }
    }

    pub fn with_command(command: impl AsRef<Path>) -> Self {
        Self {
            inner: lettre::SendmailTransport::new_with_command(command.as_ref().as_os_str()),
        }
    }
}

impl Default for SendmailTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SendmailTransport {
    fn connect(&self) -> Result<Box<dyn Connection + '_>, TransportError> {
        Ok(Box::new(SendmailConnection { transport: self }))
    }
}

struct SendmailConnection<'a> {
    transport: &'a SendmailTransport,
}

impl Connection for SendmailConnection<'_> {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let envelope = message.envelope()?;

        self.transport
            .inner
            .send_raw(&envelope, &message.data)
            .map_err(|e| TransportError::Rejected {
                recipients: message.recipients.join(", "),
                reason: e.to_string(),
            })
    }
}
