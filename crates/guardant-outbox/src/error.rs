//! Error types for the result outbox.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("failed to load cached results: {0}")]
    Load(String),

    #[error("failed to persist cached results: {0}")]
    Persist(String),
}

pub type OutboxResult<T> = Result<T, OutboxError>;
