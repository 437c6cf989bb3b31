//! Server error types.

use thiserror::Error;

/// Errors surfaced while constructing or binding the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket setup failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The heartbeat timing configuration cannot drive the supervisor.
    #[error("invalid heartbeat config: {0}")]
    Heartbeat(#[from] vigil_core::errors::ConfigError),
}

/// Result alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
