//! FFmpeg plumbing for the venc encoding service.
//!
//! This crate provides:
//! - The preset registry (named encoder argument bundles + expectations)
//! - The encode runner (ffmpeg subprocess with progress parsing and cancellation)
//! - Media probing via ffprobe
//! - Output validation (structural and semantic checks before upload)

pub mod encode;
pub mod error;
pub mod preset;
pub mod probe;
pub mod progress;
pub mod validator;

pub use encode::{EncodeUpdate, Encoder};
pub use error::{MediaError, MediaResult};
pub use preset::{ExpectedMedia, OutputType, Preset};
pub use probe::{AudioStream, MediaInfo, VideoStream};
pub use progress::{EncodeProgress, ProgressGate};
pub use validator::{
    HlsDepth, ValidationIssue, ValidationLevel, ValidationOptions, ValidationReport, Validator,
};
