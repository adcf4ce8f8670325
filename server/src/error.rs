//! Control-plane error types.

use network::NetworkError;
use thiserror::Error;

/// Errors surfaced by control operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// An operation that needs a cluster arrived before `start`.
    #[error("Cluster not started")]
    NotStarted,

    /// `start` was called a second time on the same server instance.
    #[error("Cluster already started")]
    AlreadyStarted,

    /// Cluster startup reached a terminal failure.
    #[error("Cluster failed to start: {0}")]
    NotReady(String),

    /// Delegated orchestration error.
    #[error(transparent)]
    Network(#[from] NetworkError),
}
