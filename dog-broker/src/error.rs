use thiserror::Error;

use crate::types::JobState;

/// Result type for broker operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for broker and store operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Bad enqueue options or an unrecognized queue name. Rejected before
    /// anything reaches the store.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} is {state}, expected active")]
    InvalidState { job_id: String, state: JobState },

    /// Durability or connectivity failure inside the store
    #[error("Store error: {0}")]
    Store(String),

    #[error("Job processing failed: {0}")]
    Processing(#[from] JobError),

    #[error("Processor already registered for {queue}/{job_type}")]
    ProcessorAlreadyRegistered { queue: String, job_type: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Broker is already running")]
    AlreadyRunning,

    #[error("Broker is not running")]
    NotRunning,

    #[error("Drain timed out with {remaining} worker(s) still busy")]
    DrainTimeout { remaining: usize },
}

impl QueueError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether retrying the same store call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Whether the error is a NotFound variant (job or queue)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::QueueNotFound(_) | Self::JobNotFound(_))
    }
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
