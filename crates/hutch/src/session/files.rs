//! Workspace file listing and writes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, warn};

use super::error::{SandboxError, SandboxResult};
use super::models::{FileKind, FileNode, Session, WORKSPACE_DIR, sandbox_name};
use super::service::SandboxService;

/// How deep the workspace listing descends.
const MAX_LIST_DEPTH: u32 = 4;

impl SandboxService {
    /// Enumerate the sandbox workspace as a flat tree.
    ///
    /// Hidden entries and `node_modules` are pruned, depth is bounded, and
    /// file contents are read individually with a language tag derived from
    /// the extension. Fails soft: simulation sessions and listing failures
    /// yield an empty tree, an unreadable file yields a node without content.
    /// Only an unknown session id is an error.
    pub async fn list_files(&self, session_id: &str) -> SandboxResult<Vec<FileNode>> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| SandboxError::SessionNotFound(session_id.to_string()))?;

        if session.container_ref.is_simulated() {
            debug!(session_id, "empty listing for simulation session");
            return Ok(Vec::new());
        }

        let name = sandbox_name(session_id);
        let depth = MAX_LIST_DEPTH.to_string();
        let find_argv: Vec<String> = [
            "find",
            WORKSPACE_DIR,
            "-mindepth",
            "1",
            "-maxdepth",
            &depth,
            "(",
            "-name",
            "node_modules",
            "-o",
            "-name",
            ".*",
            ")",
            "-prune",
            "-o",
            "-print",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let listing = match self.runtime.exec(&name, &find_argv).await {
            Ok(output) if output.exit_code == 0 => output.stdout,
            Ok(output) => {
                warn!(
                    session_id,
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "workspace listing failed"
                );
                return Ok(Vec::new());
            }
            Err(e) => {
                warn!(session_id, error = %e, "workspace listing failed");
                return Ok(Vec::new());
            }
        };

        let workspace_prefix = format!("{WORKSPACE_DIR}/");
        let mut rel_paths: Vec<String> = listing
            .lines()
            .filter_map(|line| line.strip_prefix(workspace_prefix.as_str()))
            .filter(|rel| !rel.is_empty())
            .map(str::to_string)
            .collect();
        rel_paths.sort();

        let mut nodes = Vec::with_capacity(rel_paths.len());
        for rel in rel_paths {
            if looks_like_file(&rel) {
                let content = self.read_workspace_file(&name, &rel).await;
                nodes.push(FileNode {
                    language: Some(language_for(&rel).to_string()),
                    content,
                    path: rel,
                    kind: FileKind::File,
                });
            } else {
                nodes.push(FileNode {
                    path: rel,
                    kind: FileKind::Directory,
                    language: None,
                    content: None,
                });
            }
        }

        Ok(nodes)
    }

    /// Write one file into the sandbox workspace.
    ///
    /// Waits (bounded polling, fixed backoff) for the session to appear and
    /// for creation to settle, so callers may fire writes while
    /// `create_sandbox` is still in flight. Content travels base64-encoded
    /// through a single shell exec that also creates the parent directory for
    /// nested paths. Simulation sessions accept the write as a no-op.
    pub async fn write_file(
        &self,
        session_id: &str,
        path: &str,
        content: &str,
    ) -> SandboxResult<()> {
        let rel = normalize_rel_path(path)?;

        let session = self.wait_for_ready(session_id).await?;

        if session.container_ref.is_simulated() {
            debug!(session_id, path = %rel, "skipping write for simulation session");
            return Ok(());
        }

        let name = sandbox_name(session_id);
        let encoded = BASE64.encode(content.as_bytes());
        let target = format!("{WORKSPACE_DIR}/{rel}");

        let script = match rel.rsplit_once('/') {
            Some((parent, _)) => format!(
                "mkdir -p {} && printf %s {} | base64 -d > {}",
                shell_quote(&format!("{WORKSPACE_DIR}/{parent}")),
                shell_quote(&encoded),
                shell_quote(&target),
            ),
            None => format!(
                "printf %s {} | base64 -d > {}",
                shell_quote(&encoded),
                shell_quote(&target),
            ),
        };

        let argv = ["sh".to_string(), "-c".to_string(), script];
        let output = self.runtime.exec(&name, &argv).await?;

        if output.exit_code != 0 {
            return Err(SandboxError::WriteFailed {
                path: rel,
                detail: output.stderr.trim().to_string(),
            });
        }

        debug!(session_id, path = %rel, bytes = content.len(), "file written");
        Ok(())
    }

    /// Read one workspace file; `None` when it cannot be read.
    async fn read_workspace_file(&self, container: &str, rel: &str) -> Option<String> {
        let argv = ["cat".to_string(), format!("{WORKSPACE_DIR}/{rel}")];
        match self.runtime.exec(container, &argv).await {
            Ok(output) if output.exit_code == 0 => Some(output.stdout),
            Ok(output) => {
                debug!(container, rel, exit_code = output.exit_code, "unreadable file in listing");
                None
            }
            Err(e) => {
                debug!(container, rel, error = %e, "unreadable file in listing");
                None
            }
        }
    }

    /// Poll until the session exists and has left the placeholder state.
    ///
    /// Each phase gets the configured number of attempts; exhausting them
    /// errors instead of hanging. A session destroyed mid-wait surfaces as
    /// session-not-found.
    async fn wait_for_ready(&self, session_id: &str) -> SandboxResult<Session> {
        let attempts = self.config.write_wait_attempts.max(1);
        let backoff = self.config.write_wait_backoff;

        let mut polled = 0u32;
        let mut current = loop {
            if let Some(session) = self.registry.get(session_id) {
                break session;
            }
            polled += 1;
            if polled >= attempts {
                return Err(SandboxError::NotReady {
                    session_id: session_id.to_string(),
                    attempts,
                });
            }
            tokio::time::sleep(backoff).await;
        };

        let mut settled = 0u32;
        loop {
            if !current.container_ref.is_pending() {
                return Ok(current);
            }
            settled += 1;
            if settled >= attempts {
                return Err(SandboxError::NotReady {
                    session_id: session_id.to_string(),
                    attempts,
                });
            }
            tokio::time::sleep(backoff).await;
            current = self
                .registry
                .get(session_id)
                .ok_or_else(|| SandboxError::SessionNotFound(session_id.to_string()))?;
        }
    }
}

/// Classify a listing entry by name shape: a dot in the basename means file.
///
/// Extensionless files are misclassified as directories; that quirk is part
/// of the listing contract and callers rely on hidden entries already being
/// pruned.
fn looks_like_file(rel_path: &str) -> bool {
    rel_path
        .rsplit('/')
        .next()
        .is_some_and(|basename| basename.contains('.'))
}

/// Editor language tag for a path, from a fixed extension table.
fn language_for(rel_path: &str) -> &'static str {
    let extension = rel_path.rsplit('.').next().unwrap_or_default();
    match extension.to_lowercase().as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "json" => "json",
        "css" => "css",
        "html" => "html",
        "md" => "markdown",
        _ => "plaintext",
    }
}

/// Validate and normalize a caller-supplied workspace-relative path.
fn normalize_rel_path(path: &str) -> Result<String, SandboxError> {
    if path.is_empty() {
        return Err(SandboxError::InvalidPath("path must not be empty".to_string()));
    }
    if path.starts_with('/') {
        return Err(SandboxError::InvalidPath(format!(
            "path must be workspace-relative: {path}"
        )));
    }

    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments {
        if segment.is_empty() || *segment == "." || *segment == ".." {
            return Err(SandboxError::InvalidPath(format!(
                "path contains invalid segment: {path}"
            )));
        }
    }

    Ok(segments.join("/"))
}

/// Single-quote a string for `sh -c`, escaping embedded quotes.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
