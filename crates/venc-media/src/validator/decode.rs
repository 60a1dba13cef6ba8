//! Decode test: run the artifact through a full null-output decode pass.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};

/// stderr lines containing these fragments are noise, not decode failures.
const BENIGN_PATTERNS: &[&str] = &["deprecated", "metadata", "estimating duration"];

/// Decode the whole artifact to a null muxer. Returns `Ok(None)` on a clean
/// pass, `Ok(Some(message))` when decode problems were reported, and `Err`
/// only when the tool itself could not run.
pub async fn test_decode(path: &Path) -> MediaResult<Option<String>> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-f", "null", "-"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
    let mut lines = BufReader::new(stderr).lines();

    let mut problems = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            problems.push(line);
        }
    }

    let status = child.wait().await?;

    let critical = filter_benign(&problems);
    if !status.success() {
        let message = if critical.is_empty() {
            format!("decode test exited with {}", status)
        } else {
            critical.join("; ")
        };
        return Ok(Some(message));
    }

    if critical.is_empty() {
        Ok(None)
    } else {
        Ok(Some(critical.join("; ")))
    }
}

/// Drop known-benign stderr lines, keeping everything else.
fn filter_benign(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            !BENIGN_PATTERNS.iter().any(|p| lower.contains(p))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_benign_drops_noise() {
        let lines = vec![
            "Some option is deprecated, use other instead".to_string(),
            "Incomplete metadata block".to_string(),
            "Estimating duration from bitrate, this may be inaccurate".to_string(),
        ];
        assert!(filter_benign(&lines).is_empty());
    }

    #[test]
    fn test_filter_benign_keeps_real_errors() {
        let lines = vec![
            "corrupt decoded frame in stream 0".to_string(),
            "some deprecated thing".to_string(),
        ];
        let critical = filter_benign(&lines);
        assert_eq!(critical.len(), 1);
        assert!(critical[0].contains("corrupt"));
    }

    #[test]
    fn test_filter_benign_is_case_insensitive() {
        let lines = vec!["DEPRECATED pixel format used".to_string()];
        assert!(filter_benign(&lines).is_empty());
    }
}
