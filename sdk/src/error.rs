//! Runner control-client error types.

use thiserror::Error;

/// Errors that can occur when talking to a `meridian-runner` control server.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure (connection refused, timeout, ...).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The server answered with a body the client could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
