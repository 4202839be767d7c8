//! Command execution inside sandboxes.

use chrono::Utc;
use tracing::debug;

use super::error::{SandboxError, SandboxResult};
use super::models::{ExecResult, sandbox_name};
use super::service::SandboxService;

impl SandboxService {
    /// Run a shell command inside a session's sandbox.
    ///
    /// Unknown ids error with session-not-found. Simulation sessions answer
    /// with a canned result and no subprocess. For real sandboxes the
    /// command's own exit code travels in the result; only spawn-level and
    /// runtime-level failures (sandbox vanished, daemon unreachable) are
    /// errors.
    pub async fn exec(&self, session_id: &str, command: &str) -> SandboxResult<ExecResult> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| SandboxError::SessionNotFound(session_id.to_string()))?;

        self.registry
            .update(session_id, |s| s.last_accessed = Utc::now());

        if session.container_ref.is_simulated() {
            debug!(session_id, command, "simulated exec");
            return Ok(ExecResult::simulated(command));
        }

        let name = sandbox_name(session_id);
        let argv = ["sh".to_string(), "-c".to_string(), command.to_string()];
        let output = self.runtime.exec(&name, &argv).await?;

        debug!(session_id, exit_code = output.exit_code, "exec finished");
        Ok(ExecResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
        })
    }
}
