//! Queue error types.

use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("consumer already holds an unacknowledged delivery: {0}")]
    InFlightLimit(String),

    #[error("unknown or already settled receipt: {0}")]
    UnknownReceipt(u64),
}

pub type QueueResult<T> = Result<T, QueueError>;
