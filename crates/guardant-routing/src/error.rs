//! Routing error types.

use thiserror::Error;

/// Errors that can occur during region selection.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no available region for service: {0}")]
    NoAvailableRegion(String),

    #[error("state store error: {0}")]
    State(#[from] guardant_state::StateError),
}

pub type RoutingResult<T> = Result<T, RoutingError>;
