use std::path::Path;

use crate::error::TaskError;

/// Processes one queued message file. Runs on a worker thread.
///
/// `log_failure` is set on the last attempt the queue will make, so a
/// failure then should be logged in full.
pub trait MessageHandler: Send + Sync + 'static {
    /// # Errors
    /// [`TaskError::Classified`] for messages that will never succeed, any
    /// other variant to have the message retried.
    fn handle(&self, path: &Path, log_failure: bool) -> Result<(), TaskError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Path, bool) -> Result<(), TaskError> + Send + Sync + 'static,
{
    fn handle(&self, path: &Path, log_failure: bool) -> Result<(), TaskError> {
        self(path, log_failure)
    }
}
