//! Sandbox Session Backend Library
//!
//! Core components for provisioning short-lived, container-backed sandboxes:
//! the container runtime driver, the session orchestrator, and the HTTP API.

pub mod api;
pub mod container;
pub mod session;
