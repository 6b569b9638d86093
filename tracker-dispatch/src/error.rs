use thiserror::Error;
use tracker_store::StoreError;

/// Problems with where a message was delivered. Retrying never helps.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("No delivery address for this tracker found in the message")]
    MissingDeliveryAddress,

    #[error("Message was delivered to both {0} and {1}")]
    ConflictingDeliveryAddresses(String, String),

    #[error("{0} is not a valid tracker address")]
    InvalidDeliveryAddress(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unable to connect to the mail transport: {0}")]
    Connect(String),

    #[error("Message to {recipients} was not accepted: {reason}")]
    Rejected { recipients: String, reason: String },

    #[error("Invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unable to compose message: {0}")]
    Compose(String),
}
