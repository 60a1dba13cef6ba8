//! Encoding preset registry.
//!
//! Presets are static, process-global, and read-only. Lookup is by exact
//! name; an unknown name is an error at pipeline start.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{MediaError, MediaResult};

/// Shape of the encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// One output file
    Single,
    /// HLS playlist(s) plus segment files
    Hls,
    /// DASH manifest plus segment files
    Dash,
}

impl OutputType {
    /// True for outputs that land in a directory rather than a single file.
    pub fn is_segmented(&self) -> bool {
        matches!(self, OutputType::Hls | OutputType::Dash)
    }

    /// Manifest name used when the preset does not pin one.
    pub fn default_manifest_name(&self) -> Option<&'static str> {
        match self {
            OutputType::Single => None,
            OutputType::Hls => Some("playlist.m3u8"),
            OutputType::Dash => Some("manifest.mpd"),
        }
    }
}

/// Media characteristics the encoded output is expected to have, used by
/// the validator after encoding.
#[derive(Debug, Clone, Default)]
pub struct ExpectedMedia {
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub audio_codec: Option<String>,
    pub min_duration: Option<f64>,
    pub max_duration: Option<f64>,
    pub min_bitrate: Option<u64>,
    pub max_bitrate: Option<u64>,
}

/// A named, immutable bundle of encoder arguments plus expected output
/// characteristics.
#[derive(Debug, Clone)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    /// Ordered ffmpeg argument tokens, inserted between the input and the
    /// output name
    pub ffmpeg_args: &'static [&'static str],
    /// Output file extension for single-file outputs
    pub extension: &'static str,
    pub output_type: OutputType,
    /// Output manifest name for HLS/DASH (may contain ffmpeg's `%v` variant
    /// placeholder)
    pub output_manifest_name: Option<&'static str>,
    pub expected: ExpectedMedia,
}

impl Preset {
    /// File or manifest name passed as ffmpeg's final argument. For
    /// segmented outputs this is relative to the output directory.
    pub fn output_name(&self) -> String {
        match self.output_type {
            OutputType::Single => format!("output.{}", self.extension),
            _ => self
                .output_manifest_name
                .or_else(|| self.output_type.default_manifest_name())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

fn expected(video_codec: &str, height: u32, audio_codec: Option<&str>) -> ExpectedMedia {
    ExpectedMedia {
        video_codec: Some(video_codec.to_string()),
        width: None,
        height: Some(height),
        audio_codec: audio_codec.map(String::from),
        min_duration: None,
        max_duration: None,
        // Wide sanity bounds; anything outside is suspicious for every preset.
        min_bitrate: Some(100_000),
        max_bitrate: Some(50_000_000),
    }
}

static PRESETS: LazyLock<HashMap<&'static str, Preset>> = LazyLock::new(|| {
    let presets = [
        Preset {
            name: "480p_h264",
            description: "SD 480p with H.264 encoding",
            ffmpeg_args: &[
                "-vf", "scale=-2:480",
                "-c:v", "libx264",
                "-preset", "fast",
                "-crf", "24",
                "-c:a", "aac",
                "-b:a", "96k",
                "-movflags", "+faststart",
            ],
            extension: "mp4",
            output_type: OutputType::Single,
            output_manifest_name: None,
            expected: expected("h264", 480, Some("aac")),
        },
        Preset {
            name: "720p_h264",
            description: "HD 720p with H.264 encoding",
            ffmpeg_args: &[
                "-vf", "scale=-2:720",
                "-c:v", "libx264",
                "-preset", "medium",
                "-crf", "23",
                "-c:a", "aac",
                "-b:a", "128k",
                "-movflags", "+faststart",
            ],
            extension: "mp4",
            output_type: OutputType::Single,
            output_manifest_name: None,
            expected: expected("h264", 720, Some("aac")),
        },
        Preset {
            name: "1080p_h264",
            description: "Full HD 1080p with H.264 encoding",
            ffmpeg_args: &[
                "-vf", "scale=-2:1080",
                "-c:v", "libx264",
                "-preset", "medium",
                "-crf", "23",
                "-c:a", "aac",
                "-b:a", "192k",
                "-movflags", "+faststart",
            ],
            extension: "mp4",
            output_type: OutputType::Single,
            output_manifest_name: None,
            expected: expected("h264", 1080, Some("aac")),
        },
        Preset {
            name: "hls_720p",
            description: "HLS 720p single variant with audio",
            ffmpeg_args: &[
                "-vf", "scale=-2:720",
                "-c:v", "libx264",
                "-b:v", "2500k",
                "-c:a", "aac",
                "-b:a", "128k",
                "-f", "hls",
                "-hls_time", "6",
                "-hls_playlist_type", "vod",
                "-hls_segment_filename", "segment_%03d.ts",
            ],
            extension: "m3u8",
            output_type: OutputType::Hls,
            output_manifest_name: Some("playlist.m3u8"),
            expected: expected("h264", 720, Some("aac")),
        },
        Preset {
            name: "hls_720p_abr",
            description: "HLS with 3 quality variants (720p, 480p, 360p) and audio",
            ffmpeg_args: &[
                "-filter_complex",
                "[0:v]split=3[v1][v2][v3];\
                 [v1]scale=w=1280:h=720[v1out];\
                 [v2]scale=w=854:h=480[v2out];\
                 [v3]scale=w=640:h=360[v3out]",
                "-map", "[v1out]",
                "-c:v:0", "libx264",
                "-b:v:0", "2800k",
                "-maxrate:v:0", "3000k",
                "-bufsize:v:0", "6000k",
                "-map", "[v2out]",
                "-c:v:1", "libx264",
                "-b:v:1", "1400k",
                "-maxrate:v:1", "1500k",
                "-bufsize:v:1", "3000k",
                "-map", "[v3out]",
                "-c:v:2", "libx264",
                "-b:v:2", "800k",
                "-maxrate:v:2", "900k",
                "-bufsize:v:2", "1800k",
                "-map", "a:0",
                "-map", "a:0",
                "-map", "a:0",
                "-c:a", "aac",
                "-b:a", "128k",
                "-ac", "2",
                "-f", "hls",
                "-hls_time", "6",
                "-hls_playlist_type", "vod",
                "-hls_segment_filename", "segment_%v_%03d.ts",
                "-master_pl_name", "master.m3u8",
                "-var_stream_map", "v:0,a:0 v:1,a:1 v:2,a:2",
                "-hls_segment_type", "mpegts",
            ],
            extension: "m3u8",
            output_type: OutputType::Hls,
            output_manifest_name: Some("stream_%v.m3u8"),
            expected: expected("h264", 720, Some("aac")),
        },
        Preset {
            name: "dash_720p",
            description: "DASH 720p single representation with audio",
            ffmpeg_args: &[
                "-vf", "scale=-2:720",
                "-c:v", "libx264",
                "-b:v", "2500k",
                "-c:a", "aac",
                "-b:a", "128k",
                "-f", "dash",
                "-seg_duration", "6",
                "-use_template", "1",
                "-use_timeline", "1",
            ],
            extension: "mpd",
            output_type: OutputType::Dash,
            output_manifest_name: Some("manifest.mpd"),
            expected: expected("h264", 720, Some("aac")),
        },
    ];

    presets.into_iter().map(|p| (p.name, p)).collect()
});

/// Look up a preset by exact name.
pub fn get(name: &str) -> MediaResult<&'static Preset> {
    PRESETS
        .get(name)
        .ok_or_else(|| MediaError::PresetNotFound(name.to_string()))
}

/// All registered presets, in no particular order.
pub fn list() -> Vec<&'static Preset> {
    PRESETS.values().collect()
}

/// Whether a preset with this name exists.
pub fn exists(name: &str) -> bool {
    PRESETS.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_preset() {
        let preset = get("720p_h264").unwrap();
        assert_eq!(preset.output_type, OutputType::Single);
        assert_eq!(preset.extension, "mp4");
        assert_eq!(preset.expected.height, Some(720));
        assert_eq!(preset.expected.video_codec.as_deref(), Some("h264"));
    }

    #[test]
    fn test_lookup_unknown_preset() {
        let err = get("nonexistent").unwrap_err();
        assert!(matches!(err, MediaError::PresetNotFound(name) if name == "nonexistent"));
    }

    #[test]
    fn test_output_names() {
        assert_eq!(get("720p_h264").unwrap().output_name(), "output.mp4");
        assert_eq!(get("hls_720p").unwrap().output_name(), "playlist.m3u8");
        assert_eq!(get("hls_720p_abr").unwrap().output_name(), "stream_%v.m3u8");
        assert_eq!(get("dash_720p").unwrap().output_name(), "manifest.mpd");
    }

    #[test]
    fn test_segmented_presets_have_manifest_names() {
        for preset in list() {
            if preset.output_type.is_segmented() {
                assert!(
                    preset.output_manifest_name.is_some()
                        || preset.output_type.default_manifest_name().is_some(),
                    "segmented preset {} has no manifest name",
                    preset.name
                );
            }
        }
    }

    #[test]
    fn test_exists() {
        assert!(exists("hls_720p_abr"));
        assert!(!exists("8k_av1"));
    }
}
