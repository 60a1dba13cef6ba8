//! FFmpeg progress parsing and emission throttling.

/// Progress state accumulated from ffmpeg's `-progress` output.
///
/// ffmpeg writes key=value blocks terminated by a `progress=continue|end`
/// line. Both `out_time_ms` and `out_time_us` carry microseconds.
#[derive(Debug, Clone, Default)]
pub struct EncodeProgress {
    /// Current frame number
    pub frame: u64,
    /// Encoder fps
    pub fps: f64,
    /// Output time in microseconds
    pub out_time_us: i64,
    /// Encoding speed relative to realtime (1.5 = 1.5x)
    pub speed: f64,
    /// Set once ffmpeg reports `progress=end`
    pub is_complete: bool,
}

impl EncodeProgress {
    /// Percent complete against a known input duration in seconds.
    /// Returns `None` when the duration is unknown.
    pub fn percentage(&self, duration_secs: f64) -> Option<f32> {
        if duration_secs <= 0.0 {
            return None;
        }
        let pct = (self.out_time_us as f64 / 1_000_000.0) / duration_secs * 100.0;
        Some(pct.min(100.0) as f32)
    }
}

/// Fold one line of `-progress` output into `current`.
///
/// Returns `Some` with a snapshot when the line completes a progress block
/// (`progress=...`), `None` otherwise.
pub fn parse_progress_line(line: &str, current: &mut EncodeProgress) -> Option<EncodeProgress> {
    let line = line.trim();

    let (key, value) = line.split_once('=')?;
    match key {
        "out_time_ms" | "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_us = us;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Throttle for progress emissions: passes a value through at most once per
/// `step` percentage points, and always at 100.
#[derive(Debug)]
pub struct ProgressGate {
    step: f32,
    last_emitted: f32,
}

impl ProgressGate {
    pub fn new(step: f32) -> Self {
        Self {
            step,
            last_emitted: -step,
        }
    }

    /// Record a new percentage; returns true when it should be emitted.
    pub fn admit(&mut self, percent: f32) -> bool {
        let due = percent - self.last_emitted >= self.step
            || (percent >= 100.0 && self.last_emitted < 100.0);
        if due {
            self.last_emitted = percent;
        }
        due
    }
}

impl Default for ProgressGate {
    fn default() -> Self {
        Self::new(10.0)
    }
}
