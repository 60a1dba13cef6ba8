//! Media inspection via ffprobe.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::validator::hls::HlsInfo;

/// Structured description of a media artifact, produced by ffprobe and
/// enriched by the validator for streaming outputs.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    /// Container format name
    pub format: String,
    /// Duration in seconds
    pub duration: f64,
    /// Size in bytes
    pub size: u64,
    /// Total bitrate in bits/second
    pub bitrate: u64,
    pub video_streams: Vec<VideoStream>,
    pub audio_streams: Vec<AudioStream>,
    /// Present only for HLS outputs
    pub hls: Option<HlsInfo>,
}

/// One video stream of a probed artifact.
#[derive(Debug, Clone, Default)]
pub struct VideoStream {
    pub codec: String,
    pub profile: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pixel_format: String,
    pub bitrate: u64,
}

/// One audio stream of a probed artifact.
#[derive(Debug, Clone, Default)]
pub struct AudioStream {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub channel_layout: String,
    pub bitrate: u64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    #[serde(default)]
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    bit_rate: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a local media artifact for format and stream information.
pub async fn media_info(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    debug!("Probing {}", path.display());

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("ffprobe exited with {}", output.status),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    parse_probe_output(&output.stdout)
}

/// Total duration of an input in seconds. Works on URLs as well as local
/// files; used only to scale progress percentages.
pub async fn input_duration(input_url: &str) -> MediaResult<f64> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
            input_url,
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("ffprobe exited with {}", output.status),
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    text.trim()
        .parse::<f64>()
        .map_err(|_| MediaError::ffprobe_failed(format!("unparseable duration: {}", text.trim()), None))
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let mut info = MediaInfo {
        format: probe.format.format_name.unwrap_or_default(),
        duration: parse_opt(&probe.format.duration),
        size: parse_opt(&probe.format.size),
        bitrate: parse_opt(&probe.format.bit_rate),
        ..Default::default()
    };

    for stream in probe.streams {
        match stream.codec_type.as_deref() {
            Some("video") => info.video_streams.push(VideoStream {
                codec: stream.codec_name.unwrap_or_default(),
                profile: stream.profile.unwrap_or_default(),
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                frame_rate: stream
                    .r_frame_rate
                    .as_deref()
                    .or(stream.avg_frame_rate.as_deref())
                    .and_then(parse_frame_rate)
                    .unwrap_or(0.0),
                pixel_format: stream.pix_fmt.unwrap_or_default(),
                bitrate: parse_opt(&stream.bit_rate),
            }),
            Some("audio") => info.audio_streams.push(AudioStream {
                codec: stream.codec_name.unwrap_or_default(),
                sample_rate: parse_opt(&stream.sample_rate),
                channels: stream.channels.unwrap_or(0),
                channel_layout: stream.channel_layout.unwrap_or_default(),
                bitrate: parse_opt(&stream.bit_rate),
            }),
            _ => {}
        }
    }

    Ok(info)
}

fn parse_opt<T: std::str::FromStr + Default>(value: &Option<String>) -> T {
    value
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or_default()
}

/// Parse a frame rate string such as "30000/1001" or "29.97".
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "format": {
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "12.480000",
            "size": "3145728",
            "bit_rate": "2016492"
        },
        "streams": [
            {
                "codec_type": "video",
                "codec_name": "h264",
                "profile": "High",
                "width": 1280,
                "height": 720,
                "pix_fmt": "yuv420p",
                "r_frame_rate": "30000/1001",
                "bit_rate": "1890000"
            },
            {
                "codec_type": "audio",
                "codec_name": "aac",
                "sample_rate": "48000",
                "channels": 2,
                "channel_layout": "stereo",
                "bit_rate": "128000"
            }
        ]
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE.as_bytes()).unwrap();
        assert!((info.duration - 12.48).abs() < 0.001);
        assert_eq!(info.size, 3_145_728);
        assert_eq!(info.video_streams.len(), 1);
        assert_eq!(info.audio_streams.len(), 1);

        let video = &info.video_streams[0];
        assert_eq!(video.codec, "h264");
        assert_eq!(video.height, 720);
        assert!((video.frame_rate - 29.97).abs() < 0.01);

        let audio = &info.audio_streams[0];
        assert_eq!(audio.codec, "aac");
        assert_eq!(audio.sample_rate, 48_000);
    }

    #[test]
    fn test_parse_probe_output_no_streams() {
        let info = parse_probe_output(br#"{"format": {"duration": "1.0"}}"#).unwrap();
        assert!(info.video_streams.is_empty());
        assert!(info.audio_streams.is_empty());
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
        assert!(parse_frame_rate("garbage").is_none());
    }
}
