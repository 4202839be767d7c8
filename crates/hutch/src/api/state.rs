//! Application state shared across handlers.

use crate::session::SandboxService;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Sandbox orchestrator.
    pub sandboxes: SandboxService,
}

impl AppState {
    pub fn new(sandboxes: SandboxService) -> Self {
        Self { sandboxes }
    }
}
