//! Shared data models for the venc encoding service.
//!
//! This crate provides the Serde-serializable types exchanged between the
//! dispatcher, the workers, and clients:
//! - Job submission requests and output configuration
//! - Progress events and job status
//! - Worker status and cancellation messages

pub mod job;
pub mod progress;
pub mod worker;

pub use job::{JobRequest, OutputConfig};
pub use progress::{JobStatus, ProgressEvent};
pub use worker::{CancelRequest, CancelResponse, WorkerStatus};
