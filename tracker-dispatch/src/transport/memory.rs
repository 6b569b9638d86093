use std::collections::HashSet;

use parking_lot::Mutex;
use tracker_common::outgoing;

use super::{Connection, OutgoingMessage, Transport};
use crate::error::TransportError;

/// Keeps every sent message in memory.
///
/// Recipients registered with [`MemoryTransport::reject`] fail to receive
/// anything, and the whole transport can be made unreachable.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    rejected: Mutex<HashSet<String>>,
    unreachable: Mutex<bool>,
    connections: Mutex<usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, recipient: impl Into<String>) {
        self.rejected.lock().insert(recipient.into());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    /// Messages sent so far, leaving the transport empty.
    pub fn take(&self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Number of connections opened so far.
    pub fn connections(&self) -> usize {
        *self.connections.lock()
    }
}

impl Transport for MemoryTransport {
    fn connect(&self) -> Result<Box<dyn Connection + '_>, TransportError> {
        if *self.unreachable.lock() {
            return Err(TransportError::Connect("transport is unreachable".to_string()));
        }

        *self.connections.lock() += 1;
        Ok(Box::new(MemoryConnection { transport: self }))
    }
}

struct MemoryConnection<'a> {
    transport: &'a MemoryTransport,
}

impl Connection for MemoryConnection<'_> {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), TransportError> {
        message.envelope()?;

        {
            let rejected = self.transport.rejected.lock();
            if let Some(recipient) = message
                .recipients
                .iter()
                .find(|recipient| rejected.contains(*recipient))
            {
                return Err(TransportError::Rejected {
                    recipients: recipient.clone(),
                    reason: "550 mailbox unavailable".to_string(),
                });
            }
        }

        outgoing!(
            level = DEBUG,
            "Message from {} to {} kept in memory ({} bytes)",
            message.sender,
            message.recipients.join(", "),
            message.data.len()
        );

        self.transport.sent.lock().push(message.clone());
        Ok(())
    }
}
