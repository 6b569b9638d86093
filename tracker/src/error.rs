use std::path::PathBuf;

use thiserror::Error;
use tracker_control::ControlError;
use tracker_dispatch::{DispatchError, RoutingError};

#[derive(Debug, Error)]
pub enum MailError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl MailError {
    /// Classified failures are about the message itself and will fail the
    /// same way on every attempt.
    pub const fn is_classified(&self) -> bool {
        matches!(self, Self::Routing(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_routing_failures_are_classified() {
        assert!(MailError::from(RoutingError::MissingDeliveryAddress).is_classified());
        assert!(MailError::from(RoutingError::MalformedMessage("empty".to_string())).is_classified());

        let unreadable = MailError::Read {
            path: PathBuf::from("/nowhere"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!unreadable.is_classified());
    }
}
