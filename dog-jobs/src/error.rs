use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure and configuration errors for queue operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid job name: {0}")]
    InvalidJobName(String),

    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Queue already defined: {0}")]
    DuplicateQueue(String),

    #[error("Job handler for [{0}] already registered")]
    DuplicateHandler(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Worker for [{0}] not found")]
    WorkerNotFound(String),

    #[error("Workers for [{0}] already started")]
    WorkerAlreadyStarted(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid lease token")]
    InvalidLeaseToken,

    #[error("Lease has expired")]
    LeaseExpired,

    #[error("Job is already in terminal state")]
    JobAlreadyTerminal,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Executor is shut down")]
    Shutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Configuration errors are programming mistakes: they are raised at the
    /// call site or at startup and never retried.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidJobName(_)
                | Self::UnknownQueue(_)
                | Self::DuplicateQueue(_)
                | Self::DuplicateHandler(_)
                | Self::InvalidConfig(_)
        )
    }

    /// Transient infrastructure errors are retried by the worker loop and do
    /// not count against a job's attempt budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Failure raised from inside a job handler. Counted against the job's
/// attempt budget by the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("Failed to decode payload: {0}")]
    InvalidPayload(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Create a handler failure from any displayable error.
    ///
    /// Works directly as a `map_err` argument:
    /// `client.send(mail).await.map_err(JobError::failed)?`
    pub fn failed(err: impl std::fmt::Display) -> Self {
        Self::Failed(err.to_string())
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(msg) | Self::InvalidPayload(msg) | Self::Panicked(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert!(QueueError::UnknownQueue("bogus".into()).is_config_error());
        assert!(QueueError::DuplicateHandler("doc.merge".into()).is_config_error());
        assert!(!QueueError::StoreUnavailable("down".into()).is_config_error());
        assert!(QueueError::StoreUnavailable("down".into()).is_transient());
        assert!(!QueueError::LeaseExpired.is_transient());
    }

    #[test]
    fn job_error_from_display() {
        let err = JobError::failed(std::io::Error::other("smtp timeout"));
        assert_eq!(err.message(), "smtp timeout");
        assert_eq!(err.to_string(), "smtp timeout");
    }
}
