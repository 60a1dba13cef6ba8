//! Encoder worker for the venc encoding service.
//!
//! This crate provides:
//! - Bounded job admission with per-job cancellation
//! - The per-job encoding pipeline (preset → encode → validate → upload)
//! - The worker RPC surface (job submission with streamed progress,
//!   status, cancellation)
//! - Cost-driven idle shutdown

pub mod admission;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod server;

pub use admission::JobAdmission;
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use pipeline::WorkerContext;
pub use server::{create_router, WorkerState};

/// Worker build version, reported in status responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
