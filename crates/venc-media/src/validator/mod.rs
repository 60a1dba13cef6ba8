//! Output validation.
//!
//! Runs between encode and upload so broken artifacts never reach storage.
//! Media-layer problems populate coded `errors` and `warnings` on the
//! report; only infrastructure failures (timeouts, missing tools) surface
//! as `Err`.

pub mod decode;
pub mod hls;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};
use crate::preset::ExpectedMedia;
use crate::probe::{self, MediaInfo};

use hls::HlsError;

/// Validation issue codes.
pub mod codes {
    pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";
    pub const FILE_EMPTY: &str = "FILE_EMPTY";
    pub const FFPROBE_FAILED: &str = "FFPROBE_FAILED";
    pub const NO_VIDEO_STREAM: &str = "NO_VIDEO_STREAM";
    pub const CODEC_MISMATCH: &str = "CODEC_MISMATCH";
    pub const RESOLUTION_MISMATCH: &str = "RESOLUTION_MISMATCH";
    pub const DURATION_TOO_SHORT: &str = "DURATION_TOO_SHORT";
    pub const DURATION_TOO_LONG: &str = "DURATION_TOO_LONG";
    pub const BITRATE_TOO_LOW: &str = "BITRATE_TOO_LOW";
    pub const BITRATE_TOO_HIGH: &str = "BITRATE_TOO_HIGH";
    pub const NO_AUDIO_STREAM: &str = "NO_AUDIO_STREAM";
    pub const FILE_SIZE_ABNORMAL: &str = "FILE_SIZE_ABNORMAL";
    pub const HLS_PLAYLIST_SYNTAX_ERROR: &str = "HLS_PLAYLIST_SYNTAX_ERROR";
    pub const HLS_SEGMENT_MISSING: &str = "HLS_SEGMENT_MISSING";
    pub const DECODE_FAILED: &str = "DECODE_FAILED";
}

/// How thorough the validation pass should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationLevel {
    /// Existence and probe only
    Minimal,
    /// Stream comparison and structural checks
    Standard,
    /// Everything, including a full decode pass
    Strict,
}

/// How deep to descend into HLS output trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HlsDepth {
    /// Playlist syntax only
    Basic,
    /// Every referenced playlist and segment must exist
    Medium,
    /// Each segment is probed individually
    Full,
}

/// Options for a validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    pub level: ValidationLevel,
    pub hls_depth: HlsDepth,
    pub skip_decode_test: bool,
    pub timeout: Duration,
    /// Expectations derived from the preset
    pub expected: Option<ExpectedMedia>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            level: ValidationLevel::Standard,
            hls_depth: HlsDepth::Medium,
            skip_decode_test: false,
            timeout: Duration::from_secs(30),
            expected: None,
        }
    }
}

/// A single coded validation problem.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub code: &'static str,
    pub message: String,
    pub field: &'static str,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Result of a validation pass. `valid` is true iff `errors` is empty;
/// warnings never unset it.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub media_info: Option<MediaInfo>,
    pub duration: Duration,
}

impl ValidationReport {
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, field: &'static str) {
        self.errors.push(ValidationIssue {
            code,
            message: message.into(),
            field,
        });
    }

    fn warning(&mut self, code: &'static str, message: impl Into<String>, field: &'static str) {
        self.warnings.push(ValidationIssue {
            code,
            message: message.into(),
            field,
        });
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }
}

/// Structural and semantic validator for encoded outputs.
#[derive(Debug, Clone, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validate the artifact at `path` (a file, or a directory for
    /// segmented outputs).
    pub async fn validate(
        &self,
        path: impl AsRef<Path>,
        options: &ValidationOptions,
    ) -> MediaResult<ValidationReport> {
        let path = path.as_ref();
        let started = Instant::now();

        let mut report = tokio::time::timeout(options.timeout, self.run_checks(path, options))
            .await
            .map_err(|_| MediaError::Timeout(options.timeout))??;

        report.duration = started.elapsed();

        info!(
            path = %path.display(),
            valid = report.valid(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Validation completed"
        );

        Ok(report)
    }

    async fn run_checks(
        &self,
        path: &Path,
        options: &ValidationOptions,
    ) -> MediaResult<ValidationReport> {
        let mut report = ValidationReport::default();

        // 1. Existence.
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(_) => {
                report.error(
                    codes::FILE_NOT_FOUND,
                    format!("output does not exist: {}", path.display()),
                    "",
                );
                return Ok(report);
            }
        };
        if meta.is_dir() {
            let mut entries = tokio::fs::read_dir(path).await?;
            if entries.next_entry().await?.is_none() {
                report.error(
                    codes::FILE_EMPTY,
                    format!("output directory is empty: {}", path.display()),
                    "",
                );
                return Ok(report);
            }
        } else if meta.len() == 0 {
            report.error(
                codes::FILE_EMPTY,
                format!("output file is empty: {}", path.display()),
                "",
            );
            return Ok(report);
        }

        // 2. Probe. Directories are probed through their entry manifest.
        let probe_target = match probe_target(path, meta.is_dir()).await {
            Ok(target) => target,
            Err(e) => {
                report.error(codes::HLS_PLAYLIST_SYNTAX_ERROR, e.to_string(), "playlist");
                return Ok(report);
            }
        };
        let media_info = match probe::media_info(&probe_target).await {
            Ok(info) => info,
            Err(MediaError::FfprobeFailed { message, stderr }) => {
                let detail = stderr.unwrap_or_default();
                report.error(
                    codes::FFPROBE_FAILED,
                    format!("{}: {}", message, detail.trim()),
                    "",
                );
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        report.media_info = Some(media_info);

        // 3/4. Format dispatch and HLS structure. The size-sanity check
        // applies to single files only.
        if is_hls_output(path, meta.is_dir()) {
            self.check_hls(path, options, &mut report).await;
        } else if !meta.is_dir() {
            self.check_single_file(path, meta.len(), &mut report);
        }

        // 5. Stream comparison against preset expectations.
        if let Some(expected) = &options.expected {
            self.check_streams(expected, &mut report);
        }

        // 7. Decode test.
        if options.level >= ValidationLevel::Strict && !options.skip_decode_test {
            match decode::test_decode(&probe_target).await {
                Ok(None) => {}
                Ok(Some(problems)) => report.error(codes::DECODE_FAILED, problems, ""),
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn check_hls(&self, path: &Path, options: &ValidationOptions, report: &mut ValidationReport) {
        match hls::inspect(path, options.hls_depth).await {
            Ok(info) => {
                if let Some(media_info) = report.media_info.as_mut() {
                    media_info.hls = Some(info);
                }
            }
            Err(HlsError::Syntax { path, message }) => report.error(
                codes::HLS_PLAYLIST_SYNTAX_ERROR,
                format!("{}: {}", path.display(), message),
                "playlist",
            ),
            Err(HlsError::NoPlaylist(dir)) => report.error(
                codes::HLS_PLAYLIST_SYNTAX_ERROR,
                format!("no HLS playlist found in {}", dir.display()),
                "playlist",
            ),
            Err(HlsError::PlaylistMissing(p)) => report.error(
                codes::HLS_SEGMENT_MISSING,
                format!("referenced media playlist not found: {}", p.display()),
                "playlist",
            ),
            Err(HlsError::SegmentMissing(p)) => report.error(
                codes::HLS_SEGMENT_MISSING,
                format!("segment file not found: {}", p.display()),
                "segment",
            ),
            Err(HlsError::SegmentUnreadable { path, message }) => report.error(
                codes::FFPROBE_FAILED,
                format!("segment {} unreadable: {}", path.display(), message),
                "segment",
            ),
            Err(HlsError::Io(e)) => report.error(
                codes::HLS_PLAYLIST_SYNTAX_ERROR,
                format!("failed to read playlist: {}", e),
                "playlist",
            ),
        }
    }

    fn check_single_file(&self, path: &Path, size: u64, report: &mut ValidationReport) {
        let Some(info) = report.media_info.as_ref() else {
            return;
        };

        // 6. Size sanity: duration x bitrate / 8, within [0.5x, 2x].
        if info.duration > 0.0 && info.bitrate > 0 {
            let expected_size = (info.duration * info.bitrate as f64 / 8.0) as u64;
            if size < expected_size / 2 || size > expected_size * 2 {
                report.warning(
                    codes::FILE_SIZE_ABNORMAL,
                    format!(
                        "file size ({} bytes) differs significantly from expected ({} bytes) for {}",
                        size,
                        expected_size,
                        path.display()
                    ),
                    "size",
                );
            }
        }
    }

    fn check_streams(&self, expected: &ExpectedMedia, report: &mut ValidationReport) {
        let Some(info) = report.media_info.as_ref().cloned() else {
            return;
        };

        let Some(video) = info.video_streams.first() else {
            report.error(codes::NO_VIDEO_STREAM, "no video stream found", "video");
            return;
        };

        if let Some(codec) = &expected.video_codec {
            if &video.codec != codec {
                report.error(
                    codes::CODEC_MISMATCH,
                    format!("expected video codec {}, got {}", codec, video.codec),
                    "video.codec",
                );
            }
        }
        if let Some(width) = expected.width {
            if video.width != width {
                report.error(
                    codes::RESOLUTION_MISMATCH,
                    format!("expected width {}, got {}", width, video.width),
                    "video.width",
                );
            }
        }
        if let Some(height) = expected.height {
            if video.height != height {
                report.error(
                    codes::RESOLUTION_MISMATCH,
                    format!("expected height {}, got {}", height, video.height),
                    "video.height",
                );
            }
        }

        if let Some(min) = expected.min_duration {
            if info.duration < min {
                report.error(
                    codes::DURATION_TOO_SHORT,
                    format!("duration {:.2}s is less than minimum {:.2}s", info.duration, min),
                    "duration",
                );
            }
        }
        if let Some(max) = expected.max_duration {
            if info.duration > max {
                report.warning(
                    codes::DURATION_TOO_LONG,
                    format!("duration {:.2}s exceeds maximum {:.2}s", info.duration, max),
                    "duration",
                );
            }
        }

        if let Some(min) = expected.min_bitrate {
            if info.bitrate < min {
                report.warning(
                    codes::BITRATE_TOO_LOW,
                    format!("bitrate {} is less than minimum {}", info.bitrate, min),
                    "bitrate",
                );
            }
        }
        if let Some(max) = expected.max_bitrate {
            if info.bitrate > max {
                report.warning(
                    codes::BITRATE_TOO_HIGH,
                    format!("bitrate {} exceeds maximum {}", info.bitrate, max),
                    "bitrate",
                );
            }
        }

        if let Some(codec) = &expected.audio_codec {
            match info.audio_streams.first() {
                None => report.warning(
                    codes::NO_AUDIO_STREAM,
                    "no audio stream found (expected audio)",
                    "audio",
                ),
                Some(audio) if &audio.codec != codec => report.error(
                    codes::CODEC_MISMATCH,
                    format!("expected audio codec {}, got {}", codec, audio.codec),
                    "audio.codec",
                ),
                Some(_) => {}
            }
        }
    }
}

/// Where to point ffprobe: a file directly, a directory through its entry
/// manifest (HLS playlist or DASH manifest).
async fn probe_target(path: &Path, is_dir: bool) -> Result<PathBuf, HlsError> {
    if !is_dir {
        return Ok(path.to_path_buf());
    }
    if let Ok(entry) = hls::find_entry_playlist(path).await {
        return Ok(entry);
    }
    let manifest = path.join("manifest.mpd");
    if tokio::fs::try_exists(&manifest).await.unwrap_or(false) {
        return Ok(manifest);
    }
    Err(HlsError::NoPlaylist(path.to_path_buf()))
}

/// HLS outputs are directories containing an `.m3u8`, or `.m3u8` files
/// themselves.
fn is_hls_output(path: &Path, is_dir: bool) -> bool {
    if is_dir {
        match std::fs::read_dir(path) {
            Ok(entries) => entries.flatten().any(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| n.ends_with(".m3u8"))
                    .unwrap_or(false)
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read directory for HLS detection");
                false
            }
        }
    } else {
        path.extension().map(|e| e == "m3u8").unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ValidationOptions {
        ValidationOptions::default()
    }

    #[tokio::test]
    async fn test_missing_output_is_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let report = Validator::new()
            .validate(tmp.path().join("nope.mp4"), &options())
            .await
            .unwrap();

        assert!(!report.valid());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].code, codes::FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_output_is_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.mp4");
        tokio::fs::write(&path, b"").await.unwrap();

        let report = Validator::new().validate(&path, &options()).await.unwrap();
        assert!(!report.valid());
        assert_eq!(report.errors[0].code, codes::FILE_EMPTY);
    }

    #[tokio::test]
    async fn test_empty_directory_is_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("output");
        tokio::fs::create_dir(&dir).await.unwrap();

        let report = Validator::new().validate(&dir, &options()).await.unwrap();
        assert!(!report.valid());
        assert_eq!(report.errors[0].code, codes::FILE_EMPTY);
    }

    #[tokio::test]
    async fn test_directory_without_playlist_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("output");
        tokio::fs::create_dir(&dir).await.unwrap();
        tokio::fs::write(dir.join("segment_000.ts"), b"x").await.unwrap();

        let report = Validator::new().validate(&dir, &options()).await.unwrap();
        assert!(!report.valid());
        assert_eq!(report.errors[0].code, codes::HLS_PLAYLIST_SYNTAX_ERROR);
    }

    #[test]
    fn test_is_hls_output() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("playlist.m3u8"), "#EXTM3U\n").unwrap();
        assert!(is_hls_output(tmp.path(), true));
        assert!(is_hls_output(Path::new("out/playlist.m3u8"), false));
        assert!(!is_hls_output(Path::new("out/output.mp4"), false));
    }

    #[test]
    fn test_stream_comparison() {
        use crate::probe::{AudioStream, VideoStream};

        let mut report = ValidationReport {
            media_info: Some(MediaInfo {
                duration: 10.0,
                bitrate: 2_000_000,
                video_streams: vec![VideoStream {
                    codec: "h264".into(),
                    height: 480,
                    ..Default::default()
                }],
                audio_streams: vec![AudioStream {
                    codec: "mp3".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        };

        let expected = ExpectedMedia {
            video_codec: Some("h264".into()),
            height: Some(720),
            audio_codec: Some("aac".into()),
            ..Default::default()
        };

        Validator::new().check_streams(&expected, &mut report);

        let codes_found: Vec<&str> = report.errors.iter().map(|e| e.code).collect();
        assert!(codes_found.contains(&codes::RESOLUTION_MISMATCH));
        assert!(codes_found.contains(&codes::CODEC_MISMATCH));
        assert!(!report.valid());
    }

    #[test]
    fn test_duration_bounds() {
        let mut report = ValidationReport {
            media_info: Some(MediaInfo {
                duration: 2.0,
                video_streams: vec![Default::default()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let expected = ExpectedMedia {
            min_duration: Some(5.0),
            ..Default::default()
        };
        Validator::new().check_streams(&expected, &mut report);
        assert_eq!(report.errors[0].code, codes::DURATION_TOO_SHORT);

        // Too long is only a warning.
        let mut report = ValidationReport {
            media_info: Some(MediaInfo {
                duration: 100.0,
                video_streams: vec![Default::default()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let expected = ExpectedMedia {
            max_duration: Some(50.0),
            ..Default::default()
        };
        Validator::new().check_streams(&expected, &mut report);
        assert!(report.valid());
        assert_eq!(report.warnings[0].code, codes::DURATION_TOO_LONG);
    }

    #[test]
    fn test_missing_audio_is_warning() {
        let mut report = ValidationReport {
            media_info: Some(MediaInfo {
                video_streams: vec![Default::default()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let expected = ExpectedMedia {
            audio_codec: Some("aac".into()),
            ..Default::default()
        };
        Validator::new().check_streams(&expected, &mut report);
        assert!(report.valid());
        assert_eq!(report.warnings[0].code, codes::NO_AUDIO_STREAM);
    }

    #[test]
    fn test_file_size_sanity() {
        let info = MediaInfo {
            duration: 10.0,
            bitrate: 8_000_000, // expected size 10MB
            ..Default::default()
        };

        let mut report = ValidationReport {
            media_info: Some(info.clone()),
            ..Default::default()
        };
        Validator::new().check_single_file(Path::new("out.mp4"), 10_000_000, &mut report);
        assert!(report.warnings.is_empty());

        let mut report = ValidationReport {
            media_info: Some(info),
            ..Default::default()
        };
        Validator::new().check_single_file(Path::new("out.mp4"), 1_000_000, &mut report);
        assert_eq!(report.warnings[0].code, codes::FILE_SIZE_ABNORMAL);
        // Warnings never unset validity.
        assert!(report.valid());
    }
}
