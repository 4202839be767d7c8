//! Session data models and naming conventions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use super::error::SandboxError;

/// Name prefix shared by every sandbox container this service creates.
///
/// The orphan reaper discovers sandboxes by this prefix, so it must stay
/// stable across releases.
pub const SANDBOX_PREFIX: &str = "hutch-";

/// Marker prefix carried by simulation container refs.
pub const SIMULATION_PREFIX: &str = "simulated-";

/// Workspace mount point inside every sandbox.
pub const WORKSPACE_DIR: &str = "/workspace";

/// Derive the container name for a session id.
pub fn sandbox_name(session_id: &str) -> String {
    format!("{SANDBOX_PREFIX}{session_id}")
}

/// Derive the workspace volume name for a container name.
pub fn volume_for(container_name: &str) -> String {
    format!("{container_name}-data")
}

/// Validate a caller-supplied session id.
///
/// Ids become part of container and volume names, so the charset is the
/// runtime CLI's safe subset: leading alphanumeric, then alphanumerics,
/// `-` and `_`.
pub fn validate_session_id(id: &str) -> Result<(), SandboxError> {
    if id.is_empty() || id.len() > 63 {
        return Err(SandboxError::InvalidSessionId(
            "session id must be 1-63 characters".to_string(),
        ));
    }

    let mut chars = id.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !first_ok || !rest_ok {
        return Err(SandboxError::InvalidSessionId(format!(
            "session id '{id}' contains invalid characters"
        )));
    }

    Ok(())
}

/// Starter-project variant for a new sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    /// TypeScript starter.
    #[default]
    Ts,
    /// JavaScript starter.
    Js,
}

impl ProjectType {
    /// Scaffolding template name for this variant.
    pub fn template(&self) -> &'static str {
        match self {
            ProjectType::Ts => "react-ts",
            ProjectType::Js => "react",
        }
    }
}

impl std::fmt::Display for ProjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectType::Ts => write!(f, "ts"),
            ProjectType::Js => write!(f, "js"),
        }
    }
}

impl std::str::FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ts" => Ok(ProjectType::Ts),
            "js" => Ok(ProjectType::Js),
            _ => Err(format!("unknown project type: {}", s)),
        }
    }
}

/// What a session's container reference points at.
///
/// Transitions exactly once, from `Pending` to either `Real` or `Simulated`,
/// and never reverts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerRef {
    /// Creation is in flight; no backing sandbox yet.
    Pending,
    /// No real sandbox exists; the runtime was unavailable or creation failed.
    Simulated(String),
    /// A real container, identified by the runtime-assigned id.
    Real(String),
}

impl ContainerRef {
    /// Simulation ref for a session id.
    pub fn simulated(session_id: &str) -> Self {
        ContainerRef::Simulated(session_id.to_string())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ContainerRef::Pending)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ContainerRef::Simulated(_))
    }

    pub fn is_real(&self) -> bool {
        matches!(self, ContainerRef::Real(_))
    }
}

impl std::fmt::Display for ContainerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerRef::Pending => write!(f, "pending"),
            ContainerRef::Simulated(session_id) => write!(f, "{SIMULATION_PREFIX}{session_id}"),
            ContainerRef::Real(container_id) => write!(f, "{container_id}"),
        }
    }
}

impl Serialize for ContainerRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One tracked sandbox session.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Caller-supplied identifier, one sandbox per id.
    pub id: String,
    /// Backing sandbox reference.
    pub container_ref: ContainerRef,
    /// Starter-project variant.
    pub project_type: ProjectType,
    /// Host port mapped to the sandbox dev-server port.
    pub exposed_port: Option<u16>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last command execution against this session.
    pub last_accessed: DateTime<Utc>,
    /// Whether the one-time timeout extension has been granted.
    pub is_extended: bool,
}

impl Session {
    /// Fresh pending session.
    pub fn new(id: impl Into<String>, project_type: ProjectType, exposed_port: Option<u16>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            container_ref: ContainerRef::Pending,
            project_type,
            exposed_port,
            created_at: now,
            last_accessed: now,
            is_extended: false,
        }
    }
}

/// Captured result of a command run in a sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecResult {
    /// The canned result simulation sessions return instead of running
    /// anything.
    pub fn simulated(command: &str) -> Self {
        Self {
            stdout: format!("[Simulation Mode] Executed: {command}"),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Kind of a workspace tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// One entry of a sandbox workspace listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileNode {
    /// Path relative to the workspace root.
    pub path: String,
    pub kind: FileKind,
    /// Editor language tag; present for files only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// File contents; absent for directories and unreadable files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
