// Capture Controller - records one fixed-length segment of the live stream
//
// youtube-dl is started against the stream, left running for the capture
// duration, then interrupted with SIGINT. It writes into a staging folder and
// the file is promoted into the work directory only after the process exits,
// so an archival pass never sees a half-written artifact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike};

use crate::clock::Clock;
use crate::config::Settings;
use crate::constants::{CAPTURE_STAGING_FOLDER, INTERRUPT_MARKER, VIDEO_EXTENSION};
use crate::error::{CollectorError, Result};
use crate::process::{CommandSpec, Launcher, ProcessOutput};
use crate::timestamp::artifact_file_name;

/// A captured video segment waiting for frame extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureArtifact {
    pub start_time: NaiveDateTime,
    pub path: PathBuf,
}

pub struct CaptureController {
    launcher: Arc<dyn Launcher>,
    clock: Arc<dyn Clock>,
    youtube_dl: PathBuf,
    stream_url: String,
    work_dir: PathBuf,
    capture_duration: Duration,
}

impl CaptureController {
    pub fn new(launcher: Arc<dyn Launcher>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        Self {
            launcher,
            clock,
            youtube_dl: settings.tools.youtube_dl.clone(),
            stream_url: settings.stream_url.clone(),
            work_dir: settings.work_dir.clone(),
            capture_duration: settings.capture_duration,
        }
    }

    pub fn capture_duration(&self) -> Duration {
        self.capture_duration
    }

    fn staging_dir(&self) -> PathBuf {
        self.work_dir.join(CAPTURE_STAGING_FOLDER)
    }

    /// Record one segment. Blocks for the whole capture duration.
    pub fn capture_once(&self) -> Result<CaptureArtifact> {
        log::info!("Beginning video download");

        let now = self.clock.now();
        let start_time = now.with_nanosecond(0).unwrap_or(now);
        let file_name = artifact_file_name(&start_time);

        let staging_dir = self.staging_dir();
        std::fs::create_dir_all(&staging_dir)?;
        self.recover_staged(&staging_dir);

        let spec = CommandSpec::new(&self.youtube_dl)
            .args(["--no-part", "-f", "mp4", "-o"])
            .arg(&file_name)
            .arg(&self.stream_url)
            .current_dir(&staging_dir);

        let mut handle = self.launcher.start(&spec)?;

        std::thread::sleep(self.capture_duration);

        if let Err(e) = handle.request_graceful_stop() {
            log::warn!("Could not interrupt capture process: {}", e);
        }
        let output = handle.wait_with_output()?;

        let path = self.work_dir.join(&file_name);
        let promoted = promote(&staging_dir.join(&file_name), &path)?;

        classify_exit(&output)?;

        if !promoted {
            return Err(CollectorError::Capture {
                stderr: format!("capture exited cleanly but wrote no {}", file_name),
            });
        }

        log::info!("Video downloaded successfully");
        Ok(CaptureArtifact { start_time, path })
    }

    /// Promote recordings an earlier capture left in staging, so the
    /// archiver picks them up. Captures run one at a time, so anything found
    /// here is orphaned.
    fn recover_staged(&self, staging_dir: &Path) {
        let entries = match std::fs::read_dir(staging_dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not scan {}: {}", staging_dir.display(), e);
                return;
            }
        };

        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_video = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(VIDEO_EXTENSION))
                .unwrap_or(false);
            if !is_video || !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let dest = self.work_dir.join(entry.file_name());
            match promote(&path, &dest) {
                Ok(_) => log::warn!("Recovered unfinished capture {}", dest.display()),
                Err(e) => log::warn!("Could not recover {}: {}", path.display(), e),
            }
        }
    }
}

/// Move a finished recording out of staging. A partial file from a failed
/// capture is promoted too; frame extraction decides whether it is usable.
fn promote(staged: &Path, dest: &Path) -> Result<bool> {
    if !staged.exists() {
        return Ok(false);
    }
    std::fs::rename(staged, dest)?;
    Ok(true)
}

/// Exit 0 is success. A non-zero exit is still success when stderr shows the
/// process was stopped by our own interrupt.
pub fn classify_exit(output: &ProcessOutput) -> Result<()> {
    if output.success() {
        return Ok(());
    }

    let stderr = output.stderr_text();
    if stderr.contains(INTERRUPT_MARKER) {
        return Ok(());
    }

    Err(CollectorError::Capture { stderr })
}
