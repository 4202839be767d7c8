//! Test utilities: a scriptable mock container runtime and app builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;

use hutch::api::{self, AppState};
use hutch::container::probe::RuntimeProbe;
use hutch::container::{
    ContainerError, ContainerResult, ContainerRuntime, ExecOutput, SandboxListing, SandboxSpec,
};
use hutch::session::{SandboxService, SandboxServiceConfig, SessionRegistry};

/// Scriptable in-memory stand-in for the container runtime CLI.
///
/// Tracks the containers and volumes a test has created, records every exec,
/// and answers execs from a FIFO of scripted outputs. An empty queue answers
/// with success and empty output, so tests only script the calls they care
/// about. Stopping a container drops it, matching the auto-remove behavior
/// of sandboxes started with `--rm`.
#[derive(Default)]
pub struct MockRuntime {
    available: AtomicBool,
    fail_create: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    containers: Mutex<HashMap<String, SandboxSpec>>,
    exec_log: Mutex<Vec<(String, Vec<String>)>>,
    exec_queue: Mutex<VecDeque<ExecOutput>>,
    listings: Mutex<Vec<SandboxListing>>,
    stopped: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    removed_volumes: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    created: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Control what `ping` reports.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every `create_sandbox` call fail.
    pub fn set_create_failure(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Delay `create_sandbox` so tests can race operations against it.
    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = Some(delay);
    }

    /// Queue a scripted response for the next unscripted exec.
    pub fn push_exec(&self, output: ExecOutput) {
        self.exec_queue.lock().unwrap().push_back(output);
    }

    /// Script what `list_sandboxes` reports.
    pub fn set_listings(&self, listings: Vec<SandboxListing>) {
        *self.listings.lock().unwrap() = listings;
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.containers.lock().unwrap().contains_key(name)
    }

    /// The creation spec recorded for a container, if it exists.
    pub fn spec_for(&self, name: &str) -> Option<SandboxSpec> {
        self.containers.lock().unwrap().get(name).cloned()
    }

    /// Every exec so far, as (container name, argv) pairs.
    pub fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.exec_log.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn removed_volumes(&self) -> Vec<String> {
        self.removed_volumes.lock().unwrap().clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> ContainerResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ContainerError::CommandFailed {
                command: "mock info".to_string(),
                message: "Cannot connect to the Docker daemon".to_string(),
            })
        }
    }

    async fn create_sandbox(&self, spec: &SandboxSpec) -> ContainerResult<String> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ContainerError::CommandFailed {
                command: "mock run".to_string(),
                message: "image pull failed".to_string(),
            });
        }

        self.containers
            .lock()
            .unwrap()
            .insert(spec.name.clone(), spec.clone());
        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("mock-container-{id}"))
    }

    async fn exec(&self, name: &str, command: &[String]) -> ContainerResult<ExecOutput> {
        if !self.containers.lock().unwrap().contains_key(name) {
            return Err(ContainerError::ContainerNotFound(name.to_string()));
        }

        self.exec_log
            .lock()
            .unwrap()
            .push((name.to_string(), command.to_vec()));
        Ok(self.exec_queue.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn stop(&self, name: &str) -> ContainerResult<()> {
        self.containers.lock().unwrap().remove(name);
        self.stopped.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str, _force: bool) -> ContainerResult<()> {
        self.containers.lock().unwrap().remove(name);
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, volume: &str) -> ContainerResult<()> {
        self.removed_volumes.lock().unwrap().push(volume.to_string());
        Ok(())
    }

    async fn list_sandboxes(&self, prefix: &str) -> ContainerResult<Vec<SandboxListing>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .filter(|listing| listing.name.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Service config with short polling waits so tests stay fast.
pub fn test_config() -> SandboxServiceConfig {
    SandboxServiceConfig {
        write_wait_attempts: 30,
        write_wait_backoff: Duration::from_millis(25),
        ..SandboxServiceConfig::default()
    }
}

/// Build a sandbox service over a fresh mock runtime.
pub fn test_service() -> (SandboxService, Arc<MockRuntime>) {
    test_service_with_config(test_config())
}

pub fn test_service_with_config(
    config: SandboxServiceConfig,
) -> (SandboxService, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new());
    let probe = Arc::new(RuntimeProbe::new(runtime.clone()));
    let registry = Arc::new(SessionRegistry::new());
    let service = SandboxService::new(registry, runtime.clone(), probe, config);
    (service, runtime)
}

/// Create a test application with a fresh mock runtime behind it.
pub fn test_app() -> Router {
    test_app_with_runtime().0
}

/// Create a test application, keeping a handle on the mock runtime.
pub fn test_app_with_runtime() -> (Router, Arc<MockRuntime>) {
    let (service, runtime) = test_service();
    let state = AppState::new(service);
    (api::create_router(state), runtime)
}
