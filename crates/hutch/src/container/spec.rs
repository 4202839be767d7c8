//! Sandbox creation spec and runtime output types.

use super::error::{ContainerError, ContainerResult};

/// Port mapping from a host port to a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Port on the host.
    pub host_port: u16,
    /// Port in the container.
    pub container_port: u16,
}

impl PortMapping {
    pub fn new(host_port: u16, container_port: u16) -> Self {
        Self {
            host_port,
            container_port,
        }
    }
}

/// Configuration for creating a new sandbox container.
#[derive(Debug, Clone, Default)]
pub struct SandboxSpec {
    /// Container name.
    pub name: String,
    /// OCI image to run.
    pub image: String,
    /// Memory ceiling, in runtime CLI syntax (e.g. "512m").
    pub memory_limit: Option<String>,
    /// CPU share (e.g. "1" or "0.5").
    pub cpu_limit: Option<String>,
    /// Named volume mounts (volume name -> container path).
    pub volumes: Vec<(String, String)>,
    /// Port mappings.
    pub ports: Vec<PortMapping>,
    /// Working directory inside the container. Exec sessions inherit it.
    pub workdir: Option<String>,
    /// Command to keep the container alive.
    pub command: Vec<String>,
}

impl SandboxSpec {
    /// Create a new spec for the given image and container name.
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the memory ceiling.
    pub fn memory(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = Some(limit.into());
        self
    }

    /// Set the CPU share.
    pub fn cpus(mut self, limit: impl Into<String>) -> Self {
        self.cpu_limit = Some(limit.into());
        self
    }

    /// Mount a named volume at a container path.
    pub fn volume(mut self, name: impl Into<String>, container_path: impl Into<String>) -> Self {
        self.volumes.push((name.into(), container_path.into()));
        self
    }

    /// Map a host port to a container port.
    pub fn port(mut self, host_port: u16, container_port: u16) -> Self {
        self.ports.push(PortMapping::new(host_port, container_port));
        self
    }

    /// Set the working directory inside the container.
    pub fn workdir(mut self, path: impl Into<String>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    /// Set the container command.
    pub fn command(mut self, cmd: Vec<String>) -> Self {
        self.command = cmd;
        self
    }

    /// Validate the spec before handing it to the runtime CLI.
    pub fn validate(&self) -> ContainerResult<()> {
        if self.image.is_empty() {
            return Err(ContainerError::InvalidInput("image must not be empty".to_string()));
        }
        super::validate_container_name(&self.name)?;
        for (volume, path) in &self.volumes {
            super::validate_container_name(volume)?;
            if !path.starts_with('/') {
                return Err(ContainerError::InvalidInput(format!(
                    "volume mount path must be absolute: {path}"
                )));
            }
        }
        Ok(())
    }
}

/// Captured output of a command run inside a sandbox.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// One sandbox as reported by the runtime's listing command.
#[derive(Debug, Clone)]
pub struct SandboxListing {
    /// Container name.
    pub name: String,
    /// Creation time as reported by the runtime.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builder_accumulates_fields() {
        let spec = SandboxSpec::new("node:20", "hutch-abc")
            .memory("512m")
            .cpus("1")
            .volume("hutch-abc-data", "/workspace")
            .port(41234, 5173)
            .workdir("/workspace")
            .command(vec!["sleep".to_string(), "infinity".to_string()]);

        assert_eq!(spec.image, "node:20");
        assert_eq!(spec.name, "hutch-abc");
        assert_eq!(spec.memory_limit.as_deref(), Some("512m"));
        assert_eq!(spec.cpu_limit.as_deref(), Some("1"));
        assert_eq!(spec.workdir.as_deref(), Some("/workspace"));
        assert_eq!(spec.volumes, vec![("hutch-abc-data".to_string(), "/workspace".to_string())]);
        assert_eq!(spec.ports, vec![PortMapping::new(41234, 5173)]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn spec_rejects_empty_image() {
        let spec = SandboxSpec::new("", "hutch-abc");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn spec_rejects_relative_mount_path() {
        let spec = SandboxSpec::new("node:20", "hutch-abc").volume("data", "workspace");
        assert!(spec.validate().is_err());
    }
}
