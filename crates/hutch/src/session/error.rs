//! Orchestrator error types.

use thiserror::Error;

use crate::container::ContainerError;

/// Result type for orchestrator operations.
pub type SandboxResult<T> = Result<T, SandboxError>;

/// Errors surfaced by sandbox operations.
///
/// Best-effort paths (teardown, bootstrap, reaping) log instead of erroring;
/// these variants cover the user-visible calls only.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// No session with this id is registered.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session id cannot name a container.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// The file path escapes the workspace or is malformed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The session did not become ready within the polling window.
    #[error("session {session_id} not ready after {attempts} attempts")]
    NotReady { session_id: String, attempts: u32 },

    /// A file write inside the sandbox exited non-zero.
    #[error("write to {path} failed: {detail}")]
    WriteFailed { path: String, detail: String },

    /// The container runtime reported a failure.
    #[error(transparent)]
    Runtime(#[from] ContainerError),
}
