//! Starter-project bootstrap via the external scaffolding tool.

use tracing::{info, warn};

use super::models::{ProjectType, sandbox_name};
use super::service::SandboxService;

/// Longest stdout/stderr slice kept in bootstrap logs.
const LOG_SNIPPET_LEN: usize = 400;

impl SandboxService {
    /// Populate a fresh sandbox's workspace with a starter project.
    ///
    /// Runs the scaffolding tool by name inside the sandbox, non-interactive,
    /// with the template matching the project type. The exit code and a
    /// truncated output snippet are logged either way; failure is never
    /// propagated, the sandbox stays usable without starter files.
    pub(super) async fn bootstrap_project(&self, session_id: &str, project_type: ProjectType) {
        let name = sandbox_name(session_id);
        let command = format!(
            "{} new app --template {} --output . --yes",
            self.config.scaffold_command,
            project_type.template(),
        );

        let argv = ["sh".to_string(), "-c".to_string(), command];
        match self.runtime.exec(&name, &argv).await {
            Ok(output) if output.exit_code == 0 => {
                info!(
                    session_id,
                    template = project_type.template(),
                    exit_code = output.exit_code,
                    stdout = %truncate_for_log(&output.stdout),
                    "workspace bootstrapped"
                );
            }
            Ok(output) => {
                warn!(
                    session_id,
                    template = project_type.template(),
                    exit_code = output.exit_code,
                    stdout = %truncate_for_log(&output.stdout),
                    stderr = %truncate_for_log(&output.stderr),
                    "bootstrap command failed"
                );
            }
            Err(e) => {
                warn!(session_id, error = %e, "bootstrap command could not run");
            }
        }
    }
}

/// Trim command output for logging, keeping the head.
fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let total = trimmed.chars().count();
    if total <= LOG_SNIPPET_LEN {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(LOG_SNIPPET_LEN).collect();
        format!("{head}... ({total} chars total)")
    }
}
