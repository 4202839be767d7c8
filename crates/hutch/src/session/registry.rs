//! Process-shared session registry.
//!
//! The registry is the only shared mutable state in the orchestrator. Every
//! mutation is a single dashmap operation, so logically-concurrent operations
//! never observe a half-applied update. It is handed around as an
//! `Arc<SessionRegistry>` rather than living in a global, so tests and
//! multiple orchestrators can each own their own.

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::models::Session;

/// Handle to a session's scheduled teardown.
///
/// Always stands for the *next* pending eviction. Dropping the guard cancels
/// the underlying timer task, which makes replace-on-reschedule and
/// cancel-on-destroy the same operation: swap or drop the guard. Cancelling a
/// token whose task has already fired is a no-op, so the eviction task itself
/// can safely trigger the destroy path that drops its own guard.
pub struct EvictionGuard {
    token: CancellationToken,
}

impl EvictionGuard {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for EvictionGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct SessionEntry {
    session: Session,
    eviction: Option<EvictionGuard>,
}

/// Map of session id to session record plus its eviction guard.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Insert or replace a session record.
    ///
    /// Replacing drops the old entry, which cancels any eviction armed for
    /// the previous incarnation of the id.
    pub fn insert(&self, session: Session) {
        let id = session.id.clone();
        self.sessions.insert(
            id,
            SessionEntry {
                session,
                eviction: None,
            },
        );
    }

    /// Snapshot of a session record.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|entry| entry.session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Apply a mutation to a session as one atomic step.
    ///
    /// Returns `None` when the session is absent, otherwise the closure's
    /// result.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.get_mut(id).map(|mut entry| f(&mut entry.session))
    }

    /// Remove a session record, returning it if present.
    ///
    /// Dropping the entry cancels any armed eviction.
    pub fn remove(&self, id: &str) -> Option<Session> {
        self.sessions.remove(id).map(|(_, entry)| entry.session)
    }

    /// Arm (or re-arm) the eviction guard for a session.
    ///
    /// The previous guard, if any, is dropped and its teardown cancelled. If
    /// the session is absent the new guard is dropped immediately, cancelling
    /// the task it protects.
    pub fn arm_eviction(&self, id: &str, guard: EvictionGuard) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.eviction = Some(guard);
        }
    }

    /// Drop the armed eviction guard, cancelling the pending teardown.
    pub fn clear_eviction(&self, id: &str) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            entry.eviction = None;
        }
    }

    /// Ids of all registered sessions.
    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of all session records.
    pub fn snapshot(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.session.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether any registered session already claims this host port.
    pub fn port_in_use(&self, port: u16) -> bool {
        self.sessions
            .iter()
            .any(|entry| entry.session.exposed_port == Some(port))
    }
}
