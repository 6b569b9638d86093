//! Outgoing mail transports.
//!
//! A [`Transport`] hands out [`Connection`]s; a batch of messages that belong
//! together (every copy of one forwarded mail, say) is sent over one
//! connection.

mod memory;
mod sendmail;
mod smtp;

use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

pub use self::{memory::MemoryTransport, sendmail::SendmailTransport, smtp::SmtpTransport};
use crate::error::TransportError;

/// A fully rendered message with its SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Envelope sender, the address bounces come back to.
    pub sender: String,
    pub recipients: Vec<String>,
    pub data: Vec<u8>,
}

impl OutgoingMessage {
    pub fn new(sender: impl Into<String>, recipients: Vec<String>, data: Vec<u8>) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            data,
        }
    }

    pub(crate) fn envelope(&self) -> Result<lettre::address::Envelope, TransportError> {
        let parse = |address: &str| {
            address
                .parse::<lettre::Address>()
                .map_err(|e| TransportError::Address {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
        };

        let sender = parse(&self.sender)?;
        let recipients = self
            .recipients
            .iter()
            .map(|recipient| parse(recipient))
            .collect::<Result<Vec<_>, _>>()?;

        lettre::address::Envelope::new(Some(sender), recipients).map_err(|e| {
            TransportError::Rejected {
                recipients: self.recipients.join(", "),
                reason: e.to_string(),
            }
        })
    }
}

pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Open a connection for a batch of messages.
    ///
    /// # Errors
    /// If the transport cannot be reached at all.
    fn connect(&self) -> Result<Box<dyn Connection + '_>, TransportError>;
}

pub trait Connection {
    /// # Errors
    /// If the message was not accepted for any of its recipients.
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum TransportConfig {
    Smtp {
        host: String,
        #[serde(default = "default_smtp_port")]
        port: u16,
    },
    Sendmail {
        #[serde(default)]
        command: Option<PathBuf>,
    },
    /// Keep everything in memory and only log it.
    Memory,
}

const fn default_smtp_port() -> u16 {
    25
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Smtp {
            host: "localhost".to_string(),
            port: default_smtp_port(),
        }
    }
}

impl TransportConfig {
    pub fn build(&self) -> Arc<dyn Transport> {
        match self {
            Self::Smtp { host, port } => Arc::new(SmtpTransport::new(host, *port)),
            Self::Sendmail { command } => Arc::new(
                command
                    .as_ref()
                    .map_or_else(SendmailTransport::new, SendmailTransport::with_command),
            ),
            Self::Memory => Arc::new(MemoryTransport::default()),
        }
    }
}
