use thiserror::Error;
use tracker_common::error::MessageError;
use tracker_dispatch::DispatchError;
use tracker_store::StoreError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Unable to read control message: {0}")]
    Message(#[from] MessageError),
}

impl From<tracker_dispatch::TransportError> for ControlError {
    fn from(value: tracker_dispatch::TransportError) -> Self {
        Self::Dispatch(value.into())
    }
}
