//! Sandbox service - orchestrates container lifecycle and idle eviction.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::container::probe::RuntimeProbe;
use crate::container::{ContainerRuntime, SandboxSpec};

use super::error::SandboxResult;
use super::models::{
    ContainerRef, ProjectType, Session, WORKSPACE_DIR, sandbox_name, validate_session_id,
    volume_for,
};
use super::registry::{EvictionGuard, SessionRegistry};

/// Default container image.
const DEFAULT_IMAGE: &str = "hutch-dev:latest";

/// Sandbox service configuration.
#[derive(Debug, Clone)]
pub struct SandboxServiceConfig {
    /// Container image sandboxes run.
    pub image: String,
    /// Memory ceiling per sandbox, in runtime CLI syntax.
    pub memory_limit: String,
    /// CPU share per sandbox.
    pub cpu_limit: String,
    /// Fixed port the dev server listens on inside the sandbox.
    pub container_port: u16,
    /// First host port considered for mapping (inclusive).
    pub port_range_start: u16,
    /// Last host port considered for mapping (inclusive).
    pub port_range_end: u16,
    /// Idle window before a sandbox is torn down.
    pub idle_timeout: Duration,
    /// Window granted by the one-time extension.
    pub extension_window: Duration,
    /// Pause between orphan sweeps.
    pub reap_interval: Duration,
    /// Polling attempts while waiting for a racing creation to finish.
    pub write_wait_attempts: u32,
    /// Fixed pause between polling attempts.
    pub write_wait_backoff: Duration,
    /// Scaffolding tool invoked inside new sandboxes.
    pub scaffold_command: String,
}

impl Default for SandboxServiceConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            memory_limit: "512m".to_string(),
            cpu_limit: "1".to_string(),
            container_port: 5173,
            port_range_start: 41000,
            port_range_end: 41999,
            idle_timeout: Duration::from_secs(30 * 60),
            extension_window: Duration::from_secs(10 * 60),
            reap_interval: Duration::from_secs(5 * 60),
            write_wait_attempts: 30,
            write_wait_backoff: Duration::from_millis(500),
            scaffold_command: "hutch-scaffold".to_string(),
        }
    }
}

impl SandboxServiceConfig {
    /// Age beyond which an orphaned sandbox is force-removed: the idle
    /// timeout plus the one extension any live session could have been
    /// granted.
    pub fn orphan_max_age(&self) -> Duration {
        self.idle_timeout + self.extension_window
    }
}

/// Orchestrates per-session sandboxes: creation with simulation fallback,
/// command execution, file sync, idle eviction with a single extension, and
/// teardown.
#[derive(Clone)]
pub struct SandboxService {
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) runtime: Arc<dyn ContainerRuntime>,
    pub(super) probe: Arc<RuntimeProbe>,
    pub(super) config: SandboxServiceConfig,
}

impl SandboxService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<RuntimeProbe>,
        config: SandboxServiceConfig,
    ) -> Self {
        Self {
            registry,
            runtime,
            probe,
            config,
        }
    }

    /// Provision a sandbox for a session id.
    ///
    /// The session is registered with a placeholder ref before any runtime
    /// call, so commands racing ahead of creation already find it. When the
    /// runtime is unavailable or creation fails, the session degrades to
    /// simulation mode instead of erroring; the only error this call can
    /// return is an invalid session id.
    pub async fn create_sandbox(
        &self,
        session_id: &str,
        project_type: ProjectType,
    ) -> SandboxResult<ContainerRef> {
        validate_session_id(session_id)?;

        if self.registry.contains(session_id) {
            debug!(session_id, "replacing existing session");
        }

        let port = self.allocate_port();
        if port.is_none() {
            warn!(session_id, "no free host port in configured range");
        }

        self.registry
            .insert(Session::new(session_id, project_type, port));

        if !self.probe.is_available().await {
            return Ok(self.finalize_simulated(session_id));
        }

        let name = sandbox_name(session_id);
        let volume = volume_for(&name);

        // A crashed prior attempt may have left a container on this name.
        if let Err(e) = self.runtime.remove(&name, true).await {
            debug!(session_id, error = %e, "stale sandbox removal failed");
        }

        let mut spec = SandboxSpec::new(&self.config.image, &name)
            .memory(&self.config.memory_limit)
            .cpus(&self.config.cpu_limit)
            .volume(&volume, WORKSPACE_DIR)
            .workdir(WORKSPACE_DIR)
            .command(vec!["sleep".to_string(), "infinity".to_string()]);
        if let Some(port) = port {
            spec = spec.port(port, self.config.container_port);
        }

        match self.runtime.create_sandbox(&spec).await {
            Ok(container_id) => {
                let updated = self.registry.update(session_id, |s| {
                    s.container_ref = ContainerRef::Real(container_id.clone());
                });
                if updated.is_none() {
                    // Destroyed while creation was in flight; the sandbox is
                    // not tracked by anyone, so discard it.
                    warn!(session_id, "session removed during creation, discarding sandbox");
                    self.teardown_runtime(&name).await;
                    return Ok(ContainerRef::Real(container_id));
                }

                info!(session_id, container_id = %container_id, port = ?port, "sandbox created");
                self.bootstrap_project(session_id, project_type).await;
                self.arm_eviction(session_id, self.config.idle_timeout);
                Ok(ContainerRef::Real(container_id))
            }
            Err(e) => {
                warn!(session_id, error = %e, "sandbox creation failed, falling back to simulation");
                Ok(self.finalize_simulated(session_id))
            }
        }
    }

    /// Tear down a session's sandbox.
    ///
    /// Idempotent: absent ids are a no-op. Runtime failures are logged, never
    /// returned; teardown is always best-effort.
    pub async fn destroy_sandbox(&self, session_id: &str) {
        let Some(session) = self.registry.get(session_id) else {
            debug!(session_id, "destroy requested for unknown session");
            return;
        };

        self.registry.clear_eviction(session_id);

        if session.container_ref.is_simulated() {
            debug!(session_id, "destroying simulation session");
        } else {
            let name = sandbox_name(session_id);
            self.teardown_runtime(&name).await;
        }

        self.registry.remove(session_id);
        info!(session_id, "session destroyed");
    }

    /// Destroy every registered session; used by the shutdown hook.
    pub async fn destroy_all_sandboxes(&self) -> usize {
        let ids = self.registry.ids();
        let count = ids.len();
        if count > 0 {
            info!(count, "destroying all sandboxes");
        }
        for id in ids {
            self.destroy_sandbox(&id).await;
        }
        count
    }

    /// Grant the one-time timeout extension.
    ///
    /// Returns false for unknown sessions and for sessions already extended.
    /// Otherwise flips `is_extended` in one atomic step and replaces the
    /// armed eviction with one scheduled after the shorter extension window.
    pub fn extend_session(&self, session_id: &str) -> bool {
        let granted = self
            .registry
            .update(session_id, |s| {
                if s.is_extended {
                    false
                } else {
                    s.is_extended = true;
                    true
                }
            })
            .unwrap_or(false);

        if granted {
            self.arm_eviction(session_id, self.config.extension_window);
            info!(session_id, "session extended");
        }

        granted
    }

    /// Current session record, if the session is live.
    pub fn get_status(&self, session_id: &str) -> Option<Session> {
        self.registry.get(session_id)
    }

    /// Snapshot of all live sessions.
    pub fn list_sessions(&self) -> Vec<Session> {
        self.registry.snapshot()
    }

    /// Cached runtime availability; `None` until the first probe.
    pub fn runtime_availability(&self) -> Option<bool> {
        self.probe.cached()
    }

    /// Schedule teardown after `after`, replacing any armed eviction.
    ///
    /// The timer task races its sleep against the guard's cancellation token.
    /// Firing runs the full destroy path; since destroy drops this very
    /// guard, cancellation-after-firing must be (and is) a no-op.
    pub(super) fn arm_eviction(&self, session_id: &str, after: Duration) {
        let token = CancellationToken::new();
        let fire = token.clone();
        let service = self.clone();
        let id = session_id.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = fire.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    info!(session_id = %id, "idle timeout reached, destroying sandbox");
                    service.destroy_sandbox(&id).await;
                }
            }
        });

        self.registry.arm_eviction(session_id, EvictionGuard::new(token));
    }

    /// Mark the session simulated and arm its eviction.
    fn finalize_simulated(&self, session_id: &str) -> ContainerRef {
        let simulated = ContainerRef::simulated(session_id);
        let stored = simulated.clone();
        self.registry
            .update(session_id, |s| s.container_ref = stored);
        self.arm_eviction(session_id, self.config.idle_timeout);
        info!(session_id, "session running in simulation mode");
        simulated
    }

    /// Best-effort stop + volume removal for a sandbox name.
    async fn teardown_runtime(&self, name: &str) {
        if let Err(e) = self.runtime.stop(name).await {
            warn!(container = name, error = %e, "failed to stop sandbox");
        }

        let volume = volume_for(name);
        if let Err(e) = self.runtime.remove_volume(&volume).await {
            warn!(volume = %volume, error = %e, "failed to remove sandbox volume");
        }
    }

    /// Pick a host port: random start in the configured range, then scan
    /// forward (wrapping) past ports other sessions already claim.
    fn allocate_port(&self) -> Option<u16> {
        let start = self.config.port_range_start;
        let end = self.config.port_range_end;
        if start > end {
            return None;
        }

        let span = u32::from(end - start) + 1;
        let offset = rand::rng().random_range(0..span);

        for step in 0..span {
            let port = start + ((offset + step) % span) as u16;
            if !self.registry.port_in_use(port) {
                return Some(port);
            }
        }

        None
    }
}
