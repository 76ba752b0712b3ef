use thiserror::Error;

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum DexflowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Admission errors
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Admission failed: {0}")]
    Admission(String),

    // Routing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Routing failed: {0}")]
    Routing(String),

    // Queue errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // State machine errors
    #[error("Invalid lifecycle transition: from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Retries exhausted for order {order_id} after {attempts} attempts")]
    ExhaustedRetries { order_id: String, attempts: u32 },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for DexflowError
pub type Result<T> = std::result::Result<T, DexflowError>;

/// Rejected order shape. Lists every offending field, not just the first.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
#[error("missing fields [{}], invalid fields [{}]", missing.join(", "), invalid.join(", "))]
pub struct ValidationError {
    pub missing: Vec<&'static str>,
    pub invalid: Vec<String>,
}

impl ValidationError {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

/// Errors raised by a job queue implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue unavailable")]
    Unavailable,

    #[error("queue full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("lease for job {job_id} is not held by caller")]
    LeaseMismatch { job_id: String },

    #[error("unknown job: {0}")]
    UnknownJob(String),
}
