// Runtime settings
//
// Defaults come from constants.rs; the binary overlays its command-line flags.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    CAPTURE_SECONDS, FRAMES_FOLDER, LOG_BACKUP_COUNT, LOG_FILENAME, LOG_MAX_BYTES,
    MAX_CAPACITY_BYTES, NOTIFY_INTERVAL_MINUTES, SLACK_CHANNEL, STREAM_URL, WARN_FRACTION,
};
use crate::error::{CollectorError, Result};
use crate::tools;

/// Advisory disk budget for the archive directory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiskBudget {
    pub max_capacity: u64,
    pub warn_fraction: f64,
}

impl DiskBudget {
    /// Size at which a warning is due.
    pub fn threshold(&self) -> f64 {
        self.max_capacity as f64 * self.warn_fraction
    }

    /// Inclusive: sitting exactly on the threshold counts.
    pub fn is_exceeded(&self, size: u64) -> bool {
        size as f64 >= self.threshold()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_capacity == 0 {
            return Err(CollectorError::Config("max capacity must be greater than zero".to_string()));
        }
        if !(self.warn_fraction > 0.0 && self.warn_fraction <= 1.0) {
            return Err(CollectorError::Config(format!(
                "warn fraction must be in (0, 1], got {}",
                self.warn_fraction
            )));
        }
        Ok(())
    }
}

impl Default for DiskBudget {
    fn default() -> Self {
        Self {
            max_capacity: MAX_CAPACITY_BYTES,
            warn_fraction: WARN_FRACTION,
        }
    }
}

/// Paths of the external collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub youtube_dl: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            youtube_dl: tools::youtube_dl_path(),
            ffmpeg: tools::ffmpeg_path(),
            ffprobe: tools::ffprobe_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub stream_url: String,
    pub capture_duration: Duration,
    pub notify_interval: Duration,
    pub disk_budget: DiskBudget,
    /// Holds in-flight artifacts and freshly extracted frames.
    pub work_dir: PathBuf,
    /// Durable archive of renamed frames.
    pub archive_dir: PathBuf,
    pub log_path: PathBuf,
    pub log_max_bytes: u64,
    pub log_backups: usize,
    #[serde(skip_serializing)]
    pub slack_token: String,
    pub slack_channel: String,
    pub tools: ToolPaths,
}

impl Settings {
    /// Defaults rooted at `work_dir`, with the archive in its `frames` folder.
    pub fn new(work_dir: impl Into<PathBuf>, slack_token: impl Into<String>) -> Self {
        let work_dir = work_dir.into();
        Self {
            stream_url: STREAM_URL.to_string(),
            capture_duration: Duration::from_secs(CAPTURE_SECONDS),
            notify_interval: Duration::from_secs(NOTIFY_INTERVAL_MINUTES * 60),
            disk_budget: DiskBudget::default(),
            archive_dir: work_dir.join(FRAMES_FOLDER),
            log_path: work_dir.join(LOG_FILENAME),
            work_dir,
            log_max_bytes: LOG_MAX_BYTES,
            log_backups: LOG_BACKUP_COUNT,
            slack_token: slack_token.into(),
            slack_channel: SLACK_CHANNEL.to_string(),
            tools: ToolPaths::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.slack_token.trim().is_empty() {
            return Err(CollectorError::Config("a Slack token is required".to_string()));
        }
        if self.stream_url.trim().is_empty() {
            return Err(CollectorError::Config("stream URL is empty".to_string()));
        }
        if self.log_max_bytes == 0 {
            return Err(CollectorError::Config("log size cap must be greater than zero".to_string()));
        }
        self.disk_budget.validate()
    }

    /// Create the archive directory if it does not exist yet.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.work_dir)?;
        std::fs::create_dir_all(&self.archive_dir)?;
        Ok(())
    }
}
