//! FFmpeg encode runner with progress reporting and cancellation.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::preset::{OutputType, Preset};
use crate::progress::{parse_progress_line, EncodeProgress, ProgressGate};

/// How many trailing stderr lines to keep for error reporting.
const STDERR_TAIL: usize = 50;

/// Frame-count delta between updates when the input duration is unknown.
const FRAME_UPDATE_INTERVAL: u64 = 500;

/// One throttled progress update from a running encode.
#[derive(Debug, Clone)]
pub struct EncodeUpdate {
    /// Percent complete; 0 when the input duration could not be probed
    pub percent: f32,
    pub message: String,
}

/// Runs ffmpeg for a single job inside a per-job working directory.
#[derive(Debug, Clone)]
pub struct Encoder {
    work_dir: PathBuf,
}

impl Encoder {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Per-job working directory under the configured work root.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.work_dir.join(job_id)
    }

    /// Remove a job's working directory. Missing directories are fine.
    pub async fn cleanup(&self, job_id: &str) -> std::io::Result<()> {
        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Encode `input_url` with the given preset, streaming throttled
    /// progress updates into `updates`.
    ///
    /// Returns the output path: a file for single outputs, the output
    /// directory for HLS/DASH. The child is killed when `cancel` fires or
    /// when the update receiver goes away.
    pub async fn encode(
        &self,
        job_id: &str,
        input_url: &str,
        preset: &Preset,
        duration_secs: Option<f64>,
        mut cancel: watch::Receiver<bool>,
        updates: mpsc::Sender<EncodeUpdate>,
    ) -> MediaResult<PathBuf> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let job_dir = self.job_dir(job_id);
        tokio::fs::create_dir_all(&job_dir).await?;

        let (output_path, output_arg, cwd) = resolve_output(&job_dir, preset).await?;

        let mut args: Vec<String> = vec![
            "-i".into(),
            input_url.into(),
            "-progress".into(),
            "pipe:2".into(),
            "-y".into(),
        ];
        args.extend(preset.ffmpeg_args.iter().map(|a| a.to_string()));
        args.push(output_arg);

        info!(
            job_id,
            preset = preset.name,
            input = input_url,
            output = %output_path.display(),
            "Starting ffmpeg"
        );
        debug!(job_id, "ffmpeg args: {}", args.join(" "));

        let mut cmd = Command::new("ffmpeg");
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // HLS/DASH encoders emit manifests and segments relative to their
        // working directory, not the parent process's.
        if let Some(dir) = &cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stderr not captured", None, None))?;
        let mut lines = BufReader::new(stderr).lines();

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let mut progress = EncodeProgress::default();
        let mut gate = ProgressGate::default();
        let mut last_reported_frame = 0u64;

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        return self.abort(job_id, &mut child).await;
                    }
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if tail.len() == STDERR_TAIL {
                                tail.pop_front();
                            }
                            tail.push_back(line.clone());

                            let Some(snapshot) = parse_progress_line(&line, &mut progress) else {
                                continue;
                            };
                            if let Some(update) = next_update(
                                &snapshot,
                                duration_secs,
                                &mut gate,
                                &mut last_reported_frame,
                            ) {
                                if update.percent > 0.0 {
                                    info!(job_id, progress = update.percent, "Encoding progress");
                                }
                                if updates.send(update).await.is_err() {
                                    // Receiver gone: nobody is listening for
                                    // this job any more.
                                    return self.abort(job_id, &mut child).await;
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(job_id, error = %e, "Failed to read ffmpeg stderr");
                            break;
                        }
                    }
                }
            }
        }

        let status = tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    return self.abort(job_id, &mut child).await;
                }
                child.wait().await?
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            let stderr_tail: Vec<String> = tail.into_iter().collect();
            return Err(MediaError::ffmpeg_failed(
                format!("ffmpeg exited with {}", status),
                Some(stderr_tail.join("\n")),
                status.code(),
            ));
        }

        info!(job_id, output = %output_path.display(), "Encoding completed");
        Ok(output_path)
    }

    async fn abort(&self, job_id: &str, child: &mut Child) -> MediaResult<PathBuf> {
        info!(job_id, "Encode cancelled, killing ffmpeg");
        let _ = child.kill().await;
        Err(MediaError::Cancelled)
    }
}

/// Resolve (result path, ffmpeg output argument, working directory).
///
/// Single outputs are one absolute file path. Segmented outputs get an
/// `output/` subdirectory as cwd and a relative manifest name so every
/// emitted file lands inside it.
async fn resolve_output(
    job_dir: &Path,
    preset: &Preset,
) -> MediaResult<(PathBuf, String, Option<PathBuf>)> {
    match preset.output_type {
        OutputType::Single => {
            let path = job_dir.join(preset.output_name());
            let arg = path.to_string_lossy().to_string();
            Ok((path, arg, None))
        }
        OutputType::Hls | OutputType::Dash => {
            let out_dir = job_dir.join("output");
            tokio::fs::create_dir_all(&out_dir).await?;
            Ok((out_dir.clone(), preset.output_name(), Some(out_dir)))
        }
    }
}

fn next_update(
    snapshot: &EncodeProgress,
    duration_secs: Option<f64>,
    gate: &mut ProgressGate,
    last_reported_frame: &mut u64,
) -> Option<EncodeUpdate> {
    if let Some(percent) = duration_secs.and_then(|d| snapshot.percentage(d)) {
        if gate.admit(percent) {
            return Some(EncodeUpdate {
                percent,
                message: format!("Encoding: {:.1}% (frame {})", percent, snapshot.frame),
            });
        }
        return None;
    }

    // No duration available: fall back to frame-count reporting.
    if snapshot.frame >= *last_reported_frame + FRAME_UPDATE_INTERVAL || snapshot.is_complete {
        *last_reported_frame = snapshot.frame;
        return Some(EncodeUpdate {
            percent: 0.0,
            message: format!("Encoding frame {}", snapshot.frame),
        });
    }

    None
}
