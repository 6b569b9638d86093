use lettre::Transport as LettreTransport;
use tracker_common::outgoing;

use super::{Connection, OutgoingMessage, Transport};
use crate::error::TransportError;

/// Relays through a local MTA over plain SMTP. Connections are pooled, so a
/// batch reuses the connection checked by [`Transport::connect`].
#[derive(Clone)]
pub struct SmtpTransport {
    relay: String,
    inner: lettre::SmtpTransport,
}

impl std::fmt::Debug for SmtpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpTransport")
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

impl SmtpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            relay: format!("{host}:{port}"),
            inner: lettre::SmtpTransport::builder_dangerous(host)
                .port(port)
                .build(),
        }
    }
}

impl Transport for SmtpTransport {
    fn connect(&self) -> Result<Box<dyn Connection + '_>, TransportError> {
        match self.inner.test_connection() {
            Ok(true) => Ok(Box::new(SmtpConnection { transport: self })),
            Ok(false) => Err(TransportError::Connect(format!(
                "{} did not answer NOOP",
                self.relay
            ))),
            Err(e) => Err(TransportError::Connect(format!("{}: {e}", self.relay))),
        }
    }
}

struct SmtpConnection<'a> {
    transport: &'a SmtpTransport,
}

impl Connection for SmtpConnection<'_> {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), TransportError> {
        let envelope = message.envelope()?;

        let response = self
            .transport
            .inner
            .send_raw(&envelope, &message.data)
            .map_err(|e| TransportError::Rejected {
                recipients: message.recipients.join(", "),
                reason: e.to_string(),
            })?;

        outgoing!(
            "Relayed message from {} via {}: {:?}",
            message.sender,
            self.transport.relay,
            response.code()
        );

        Ok(())
    }
}
