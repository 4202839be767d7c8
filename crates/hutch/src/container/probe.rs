//! Container runtime availability probe.
//!
//! The verdict is probed once and memoized for the process lifetime, in both
//! directions: a runtime that is down at first probe stays "unavailable" until
//! restart even if the daemon comes up later. The first positive verdict is
//! broadcast on a watch channel so the orphan reaper can run its startup
//! sweep.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tracing::{info, warn};

use super::ContainerRuntime;

/// Memoized reachability check for the container runtime.
pub struct RuntimeProbe {
    runtime: Arc<dyn ContainerRuntime>,
    verdict: OnceCell<bool>,
    available_tx: watch::Sender<bool>,
}

impl RuntimeProbe {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        let (available_tx, _) = watch::channel(false);
        Self {
            runtime,
            verdict: OnceCell::new(),
            available_tx,
        }
    }

    /// Whether the container runtime is reachable.
    ///
    /// The first call pings the runtime and logs the outcome; every later
    /// call returns the cached verdict without touching the runtime again.
    pub async fn is_available(&self) -> bool {
        if let Some(&verdict) = self.verdict.get() {
            return verdict;
        }

        let available = self.runtime.ping().await.is_ok();

        if self.verdict.set(available).is_ok() {
            if available {
                info!("container runtime detected, sandboxes will run in containers");
                let _ = self.available_tx.send(true);
            } else {
                warn!("container runtime unreachable, new sandboxes fall back to simulation mode");
            }
        }

        // A concurrent probe may have set the verdict first; report that one.
        self.verdict.get().copied().unwrap_or(available)
    }

    /// The cached verdict, if any probe has completed yet.
    pub fn cached(&self) -> Option<bool> {
        self.verdict.get().copied()
    }

    /// Subscribe to the availability signal.
    ///
    /// The value starts false and flips to true at most once, when the first
    /// probe finds the runtime reachable.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.available_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{
        ContainerError, ContainerResult, ExecOutput, SandboxListing, SandboxSpec,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FlakyRuntime {
        reachable: AtomicBool,
        pings: AtomicUsize,
    }

    impl FlakyRuntime {
        fn new(reachable: bool) -> Self {
            Self {
                reachable: AtomicBool::new(reachable),
                pings: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for FlakyRuntime {
        async fn ping(&self) -> ContainerResult<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.reachable.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ContainerError::NoRuntimeAvailable)
            }
        }

        async fn create_sandbox(&self, _spec: &SandboxSpec) -> ContainerResult<String> {
            unreachable!("probe tests only ping")
        }

        async fn exec(&self, _name: &str, _command: &[String]) -> ContainerResult<ExecOutput> {
            unreachable!("probe tests only ping")
        }

        async fn stop(&self, _name: &str) -> ContainerResult<()> {
            unreachable!("probe tests only ping")
        }

        async fn remove(&self, _name: &str, _force: bool) -> ContainerResult<()> {
            unreachable!("probe tests only ping")
        }

        async fn remove_volume(&self, _volume: &str) -> ContainerResult<()> {
            unreachable!("probe tests only ping")
        }

        async fn list_sandboxes(&self, _prefix: &str) -> ContainerResult<Vec<SandboxListing>> {
            unreachable!("probe tests only ping")
        }
    }

    #[tokio::test]
    async fn positive_verdict_is_memoized() {
        let runtime = Arc::new(FlakyRuntime::new(true));
        let probe = RuntimeProbe::new(runtime.clone());

        assert!(probe.is_available().await);
        runtime.reachable.store(false, Ordering::SeqCst);
        assert!(probe.is_available().await);
        assert_eq!(runtime.pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_verdict_is_pinned_for_process_lifetime() {
        let runtime = Arc::new(FlakyRuntime::new(false));
        let probe = RuntimeProbe::new(runtime.clone());

        assert!(!probe.is_available().await);
        runtime.reachable.store(true, Ordering::SeqCst);
        assert!(!probe.is_available().await);
        assert_eq!(runtime.pings.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_positive_probe_signals_watchers() {
        let probe = RuntimeProbe::new(Arc::new(FlakyRuntime::new(true)));
        let rx = probe.subscribe();

        assert!(!*rx.borrow());
        assert_eq!(probe.cached(), None);

        probe.is_available().await;
        assert!(*rx.borrow());
        assert_eq!(probe.cached(), Some(true));
    }

    #[tokio::test]
    async fn negative_probe_leaves_watchers_untriggered() {
        let probe = RuntimeProbe::new(Arc::new(FlakyRuntime::new(false)));
        let rx = probe.subscribe();

        probe.is_available().await;
        assert!(!*rx.borrow());
        assert_eq!(probe.cached(), Some(false));
    }
}
