//! HTTP API surface.
//!
//! A thin axum layer over the sandbox orchestrator: every route maps to one
//! orchestrator operation.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
