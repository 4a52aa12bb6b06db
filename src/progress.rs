//! yt-dlp progress lines in, progress bar and status text out.

use serde::Deserialize;

use crate::model::{ProgressPhase, ProgressSnapshot};

/// Prefix yt-dlp writes in front of every progress record (see `--progress-template`).
pub const PROGRESS_MARKER: &str = "tubegrab-progress:";

/// Status line shown once bytes are done but post-processing may still run.
pub const PROCESSING_STATUS: &str = "Download completed! Processing file...";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawStatus {
    Downloading,
    Finished,
    #[serde(other)]
    Other,
}

/// The subset of yt-dlp's progress dict we read. Numbers may arrive as floats or null.
#[derive(Deserialize)]
struct RawProgress {
    status: RawStatus,
    downloaded_bytes: Option<f64>,
    total_bytes: Option<f64>,
    total_bytes_estimate: Option<f64>,
    speed: Option<f64>,
    eta: Option<f64>,
}

/// Parses one stdout line. Returns `None` for anything that is not a progress record.
pub fn parse_progress_from_line(line: &str) -> Option<ProgressSnapshot> {
    let json = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let raw: RawProgress = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::debug!(%err, "unreadable progress record");
            return None;
        }
    };
    let phase = match raw.status {
        RawStatus::Downloading => ProgressPhase::Downloading,
        RawStatus::Finished => ProgressPhase::Finished,
        RawStatus::Other => return None,
    };
    Some(ProgressSnapshot {
        phase,
        downloaded_bytes: raw.downloaded_bytes.map(to_count).unwrap_or(0),
        total_bytes: raw.total_bytes.or(raw.total_bytes_estimate).map(to_count),
        speed_bytes_per_sec: raw.speed.filter(|s| s.is_finite() && *s >= 0.0),
        eta_seconds: raw.eta.map(to_count),
    })
}

fn to_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 { value.round() as u64 } else { 0 }
}

/// Renders an ETA as `H:MM:SS`; zero or missing is `Unknown`.
pub fn format_eta(eta_seconds: Option<u64>) -> String {
    match eta_seconds {
        Some(secs) if secs > 0 => {
            format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        _ => "Unknown".to_string(),
    }
}

/// What the progress bar and status line currently show
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressView {
    /// 0.0 to 100.0
    pub percentage: f64,
    pub status: String,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self { percentage: 0.0, status: "Ready to download".to_string() }
    }
}

impl ProgressView {
    /// Folds one snapshot into the view. Without a known total the percentage keeps its last value.
    pub fn apply(&mut self, snapshot: &ProgressSnapshot) {
        if snapshot.phase == ProgressPhase::Finished {
            self.percentage = 100.0;
            self.status = PROCESSING_STATUS.to_string();
            return;
        }

        let downloaded = snapshot.downloaded_bytes as f64;
        let speed_mb = snapshot.speed_bytes_per_sec.unwrap_or(0.0) / BYTES_PER_MB;
        let eta = format_eta(snapshot.eta_seconds);

        match snapshot.total_bytes.filter(|t| *t > 0) {
            Some(total) => {
                let total = total as f64;
                self.percentage = (downloaded / total * 100.0).min(100.0);
                self.status = format!(
                    "Downloaded: {:.1}MB of {:.1}MB ({:.1}%) at {:.1}MB/s - ETA: {}",
                    downloaded / BYTES_PER_MB,
                    total / BYTES_PER_MB,
                    self.percentage,
                    speed_mb,
                    eta
                );
            }
            None => {
                self.status = format!(
                    "Downloaded: {:.1}MB at {:.1}MB/s - ETA: {}",
                    downloaded / BYTES_PER_MB,
                    speed_mb,
                    eta
                );
            }
        }
    }

    /// Progress as the 0.0–1.0 fraction egui's progress bar wants
    pub fn fraction(&self) -> f32 {
        (self.percentage / 100.0).clamp(0.0, 1.0) as f32
    }

    pub fn reset(&mut self, status: impl Into<String>) {
        self.percentage = 0.0;
        self.status = status.into();
    }
}
