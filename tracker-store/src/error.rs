use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing service could not be reached or refused the operation.
    /// Always worth retrying.
    #[error("Subscriber store unavailable: {0}")]
    Unavailable(String),

    #[error("Unable to read store snapshot {}: {source}", path.display())]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid store snapshot {}: {source}", path.display())]
    SnapshotFormat {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("Inconsistent store snapshot: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
