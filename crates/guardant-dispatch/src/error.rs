//! Dispatch error types.

use thiserror::Error;

use guardant_routing::RoutingError;
use guardant_worker::CommandError;

/// Errors surfaced by on-demand dispatch calls.
///
/// The periodic scheduling pass never returns these; it degrades per
/// service with a warning instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("command encoding failed: {0}")]
    Encode(#[from] CommandError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
