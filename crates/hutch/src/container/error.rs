//! Container runtime error types.

use thiserror::Error;

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors that can occur while driving the container runtime CLI.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The runtime command failed.
    #[error("container {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// Container was not found.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// No container runtime available.
    #[error("no container runtime available (docker or podman)")]
    NoRuntimeAvailable,

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The runtime binary could not be spawned.
    #[error("failed to launch container runtime: {0}")]
    Io(#[from] std::io::Error),
}
