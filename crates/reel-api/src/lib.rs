//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission and status polling
//! - Range streaming of locally served videos
//! - Health/readiness probes and Prometheus metrics
//! - Embedded queue, store and worker when no Redis is configured

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod runtime;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use runtime::Runtime;
pub use services::StaleStatusSweeper;
pub use state::AppState;
