//! Container runtime driver.
//!
//! Drives Docker or Podman through their CLI, invoked as subprocesses. All
//! communication with the runtime happens over argv, captured stdout/stderr,
//! and exit codes; there is no socket API involved. The [`ContainerRuntime`]
//! trait decouples the orchestrator from the concrete CLI so tests can swap
//! in a mock.

mod error;
pub mod probe;
mod spec;

pub use error::{ContainerError, ContainerResult};
pub use spec::{ExecOutput, PortMapping, SandboxListing, SandboxSpec};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Seconds the runtime waits before killing a container on `stop`.
const STOP_TIMEOUT_SECS: u32 = 5;

/// Container runtime flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker runtime.
    #[default]
    Docker,
    /// Podman runtime.
    Podman,
}

impl RuntimeKind {
    /// Default binary name for this runtime.
    pub fn default_binary(&self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Podman => "podman",
        }
    }

    /// Whether volume mounts need SELinux labels (`:Z` suffix).
    fn needs_selinux_labels(&self) -> bool {
        match self {
            RuntimeKind::Docker => false,
            RuntimeKind::Podman => true,
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeKind::Docker => write!(f, "docker"),
            RuntimeKind::Podman => write!(f, "podman"),
        }
    }
}

/// Validate a container or volume name.
///
/// Names are restricted to alphanumerics plus `-` and `_` so they can be
/// passed to the runtime CLI without quoting concerns.
pub fn validate_container_name(name: &str) -> ContainerResult<()> {
    if name.is_empty() {
        return Err(ContainerError::InvalidInput(
            "container name cannot be empty".to_string(),
        ));
    }

    if name.len() > 128 {
        return Err(ContainerError::InvalidInput(
            "container name exceeds maximum length".to_string(),
        ));
    }

    let valid_chars = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if !name.chars().all(valid_chars) {
        return Err(ContainerError::InvalidInput(format!(
            "container name '{name}' contains invalid characters"
        )));
    }

    Ok(())
}

/// Abstraction over the container runtime, for orchestration and tests.
///
/// All sandbox-facing operations the orchestrator needs: one real
/// CLI-subprocess implementation ([`CliRuntime`]) plus mocks in tests.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime daemon is reachable.
    async fn ping(&self) -> ContainerResult<()>;

    /// Create and start a sandbox container, returning the runtime-assigned id.
    async fn create_sandbox(&self, spec: &SandboxSpec) -> ContainerResult<String>;

    /// Run a command inside a sandbox and capture its output.
    ///
    /// A non-zero exit of the command itself is a successful call carrying
    /// that code; only spawn failures and runtime-CLI failures (daemon gone,
    /// container gone) are errors.
    async fn exec(&self, name: &str, command: &[String]) -> ContainerResult<ExecOutput>;

    /// Stop a sandbox. Already-stopped and missing sandboxes count as success.
    async fn stop(&self, name: &str) -> ContainerResult<()>;

    /// Remove a sandbox container. A missing container counts as success.
    async fn remove(&self, name: &str, force: bool) -> ContainerResult<()>;

    /// Remove a named volume. A missing volume counts as success.
    async fn remove_volume(&self, volume: &str) -> ContainerResult<()>;

    /// List sandbox containers (running or not) whose name starts with `prefix`.
    async fn list_sandboxes(&self, prefix: &str) -> ContainerResult<Vec<SandboxListing>>;
}

/// Subprocess-backed container runtime client.
///
/// Supports Docker and Podman with automatic detection.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    kind: RuntimeKind,
    binary: String,
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl CliRuntime {
    /// Create a runtime client, auto-detecting docker or podman on PATH.
    ///
    /// Falls back to docker if neither is found; the first real call will
    /// fail and the orchestrator degrades to simulation mode.
    pub fn new() -> Self {
        if Self::is_binary_available("docker") {
            Self {
                kind: RuntimeKind::Docker,
                binary: "docker".to_string(),
            }
        } else if Self::is_binary_available("podman") {
            Self {
                kind: RuntimeKind::Podman,
                binary: "podman".to_string(),
            }
        } else {
            Self {
                kind: RuntimeKind::Docker,
                binary: "docker".to_string(),
            }
        }
    }

    /// Create a runtime client for a specific runtime kind.
    pub fn with_kind(kind: RuntimeKind) -> Self {
        Self {
            binary: kind.default_binary().to_string(),
            kind,
        }
    }

    /// Create a runtime client with a custom binary path.
    pub fn with_binary(kind: RuntimeKind, binary: impl Into<String>) -> Self {
        Self {
            kind,
            binary: binary.into(),
        }
    }

    /// Get the runtime kind.
    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    /// Check if a binary is available in PATH.
    fn is_binary_available(name: &str) -> bool {
        std::process::Command::new("which")
            .arg(name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Assemble the `run` argument list for a sandbox spec.
    fn run_args(&self, spec: &SandboxSpec) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        args.push("run".to_string());
        args.push("-d".to_string());
        // Auto-remove on stop; teardown is stop + volume removal only.
        args.push("--rm".to_string());

        args.push("--name".to_string());
        args.push(spec.name.clone());

        if let Some(ref memory) = spec.memory_limit {
            args.push("--memory".to_string());
            args.push(memory.clone());
        }

        if let Some(ref cpus) = spec.cpu_limit {
            args.push("--cpus".to_string());
            args.push(cpus.clone());
        }

        for port in &spec.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host_port, port.container_port));
        }

        for (volume, container_path) in &spec.volumes {
            args.push("-v".to_string());
            if self.kind.needs_selinux_labels() {
                args.push(format!("{volume}:{container_path}:Z"));
            } else {
                args.push(format!("{volume}:{container_path}"));
            }
        }

        if let Some(ref workdir) = spec.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }

        args.push(spec.image.clone());

        for part in &spec.command {
            args.push(part.clone());
        }

        args
    }
}

/// Whether stderr from a `stop`/`rm` reports the container as already gone.
fn container_already_gone(stderr: &str) -> bool {
    stderr.contains("No such container")
        || stderr.contains("no such container")
        || stderr.contains("is not running")
        || stderr.contains("container state improper")
}

/// Whether stderr from a `volume rm` reports the volume as already gone.
fn volume_already_gone(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such volume") || lower.contains("no volume with name")
}

/// Whether an exec failure came from the runtime CLI rather than the command.
///
/// The CLI multiplexes its own failures (daemon unreachable, container gone)
/// and the command's own exit status through one exit code, so the stderr
/// shape is the only way to tell them apart.
fn is_runtime_failure(stderr: &str) -> bool {
    stderr.contains("No such container")
        || stderr.contains("Error response from daemon")
        || stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("unable to connect to Podman")
        || stderr.contains("can only create exec sessions")
}

/// Parse a creation timestamp from the runtime's `ps` output.
///
/// Docker and podman print `2025-08-24 10:00:00 +0000 UTC`; some podman
/// versions print RFC 3339. Anything else yields `None`.
fn parse_created_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Strip the trailing zone name; chrono cannot parse "%Z".
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() < 3 {
        return None;
    }
    let candidate = format!("{} {} {}", parts[0], parts[1], parts[2]);
    DateTime::parse_from_str(&candidate, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn ping(&self) -> ContainerResult<()> {
        let output = Command::new(&self.binary)
            .args(["version", "--format", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed {
                command: "version".to_string(),
                message: stderr.to_string(),
            });
        }

        Ok(())
    }

    async fn create_sandbox(&self, spec: &SandboxSpec) -> ContainerResult<String> {
        spec.validate()?;

        let args = self.run_args(spec);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed {
                command: "run".to_string(),
                message: stderr.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn exec(&self, name: &str, command: &[String]) -> ContainerResult<ExecOutput> {
        validate_container_name(name)?;

        let mut args: Vec<String> = vec!["exec".to_string(), name.to_string()];
        args.extend(command.iter().cloned());

        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() && is_runtime_failure(&stderr) {
            if stderr.contains("No such container") {
                return Err(ContainerError::ContainerNotFound(name.to_string()));
            }
            return Err(ContainerError::CommandFailed {
                command: "exec".to_string(),
                message: stderr,
            });
        }

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: output.status.code().unwrap_or(0),
        })
    }

    async fn stop(&self, name: &str) -> ContainerResult<()> {
        validate_container_name(name)?;

        let output = Command::new(&self.binary)
            .args(["stop", "-t", &STOP_TIMEOUT_SECS.to_string(), name])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if container_already_gone(&stderr) {
                return Ok(());
            }
            return Err(ContainerError::CommandFailed {
                command: "stop".to_string(),
                message: stderr.to_string(),
            });
        }

        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> ContainerResult<()> {
        validate_container_name(name)?;

        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(name);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if container_already_gone(&stderr) {
                return Ok(());
            }
            return Err(ContainerError::CommandFailed {
                command: "rm".to_string(),
                message: stderr.to_string(),
            });
        }

        Ok(())
    }

    async fn remove_volume(&self, volume: &str) -> ContainerResult<()> {
        validate_container_name(volume)?;

        let output = Command::new(&self.binary)
            .args(["volume", "rm", volume])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if volume_already_gone(&stderr) {
                return Ok(());
            }
            return Err(ContainerError::CommandFailed {
                command: "volume rm".to_string(),
                message: stderr.to_string(),
            });
        }

        Ok(())
    }

    async fn list_sandboxes(&self, prefix: &str) -> ContainerResult<Vec<SandboxListing>> {
        let output = Command::new(&self.binary)
            .args([
                "ps",
                "-a",
                "--filter",
                &format!("name={prefix}"),
                "--format",
                "{{.Names}}\t{{.CreatedAt}}",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ContainerError::CommandFailed {
                command: "ps".to_string(),
                message: stderr.to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut listings = Vec::new();

        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let Some((name, created_raw)) = line.split_once('\t') else {
                debug!(line, "skipping unparseable ps line");
                continue;
            };

            // The name filter matches substrings; only keep true prefix hits.
            if !name.starts_with(prefix) {
                continue;
            }

            match parse_created_at(created_raw) {
                Some(created_at) => listings.push(SandboxListing {
                    name: name.to_string(),
                    created_at,
                }),
                None => {
                    debug!(name, created_raw, "skipping container with unparseable creation time");
                }
            }
        }

        Ok(listings)
    }
}
