//! Sandbox session orchestration.
//!
//! Tracks one sandbox per session id through its whole life: creation with
//! simulation fallback, command execution, file sync, idle eviction with a
//! single extension, explicit teardown, and orphan reaping.

mod bootstrap;
mod error;
mod exec;
mod files;
mod models;
pub mod reaper;
mod registry;
mod service;

pub use error::{SandboxError, SandboxResult};
pub use models::{
    ContainerRef, ExecResult, FileKind, FileNode, ProjectType, SANDBOX_PREFIX, SIMULATION_PREFIX,
    Session, WORKSPACE_DIR, sandbox_name, validate_session_id, volume_for,
};
pub use registry::{EvictionGuard, SessionRegistry};
pub use service::{SandboxService, SandboxServiceConfig};
