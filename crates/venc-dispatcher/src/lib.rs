//! Request-facing dispatcher for the venc encoding service.
//!
//! This crate provides:
//! - The client HTTP API (job submission, SSE progress streaming)
//! - Worker selection (round-robin-seeded first-available scan)
//! - The per-job bridge relaying worker progress streams to subscribers
//! - Bearer-token auth and Prometheus metrics

pub mod auth;
pub mod balancer;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use balancer::Balancer;
pub use bridge::JobBridge;
pub use client::WorkerClient;
pub use config::DispatcherConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

/// Dispatcher build version, reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
