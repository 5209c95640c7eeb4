//! Axum HTTP API server for Shortify.
//!
//! This crate provides:
//! - Job submission (remote URL or upload) and status polling
//! - Bearer token verification against the identity service
//! - Per-IP and per-user rate limiting, security headers
//! - Health probes and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use auth::{AuthUser, JwtVerifier};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
