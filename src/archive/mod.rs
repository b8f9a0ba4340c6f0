// Frame Archiver - turns captured videos into timestamped stills
//
// Each pass scans the work directory for every pending artifact, not just the
// most recent capture, so artifacts left behind by a crash are picked up on
// the next run. Per artifact:
//   1. extract numbered frames with ffmpeg
//   2. recover the start instant from the filename, probe the duration
//   3. spread the frames evenly over [start, start + duration)
//   4. move each frame into the archive named by its instant
//   5. delete the artifact
// One artifact failing never stops the rest of the pass.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};

use crate::config::Settings;
use crate::constants::VIDEO_EXTENSION;
use crate::error::{CollectorError, Result};
use crate::media;
use crate::notify::Notifier;
use crate::process::Launcher;
use crate::timestamp::{artifact_start_time, frame_file_name, interpolate};


/// Wall-clock span covered by one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, duration: TimeDelta) -> Self {
        Self { start, end: start + duration }
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Synthesized instant for each of `count` frames, in extraction order.
    pub fn frame_times(&self, count: usize) -> Vec<NaiveDateTime> {
        interpolate(self.start, self.duration(), count)
    }
}

/// Outcome of one archival pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub processed: usize,
    pub failed: usize,
    pub frames_archived: usize,
}

pub struct FrameArchiver {
    launcher: Arc<dyn Launcher>,
    notifier: Arc<Notifier>,
    work_dir: PathBuf,
    archive_dir: PathBuf,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a pass ends, even by panic.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FrameArchiver {
    pub fn new(launcher: Arc<dyn Launcher>, notifier: Arc<Notifier>, settings: &Settings) -> Self {
        Self {
            launcher,
            notifier,
            work_dir: settings.work_dir.clone(),
            archive_dir: settings.archive_dir.clone(),
            ffmpeg: settings.tools.ffmpeg.clone(),
            ffprobe: settings.tools.ffprobe.clone(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run a pass unless one is already running. Returns `None` when skipped.
    pub fn try_process_pending(&self) -> Option<ArchiveReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Archival pass already running, skipping");
            return None;
        }
        let _guard = PassGuard(&self.in_flight);
        Some(self.process_pending())
    }

    /// Archive every pending artifact in the work directory.
    pub fn process_pending(&self) -> ArchiveReport {
        let mut report = ArchiveReport::default();

        let artifacts = match self.pending_artifacts() {
            Ok(a) => a,
            Err(e) => {
                self.notifier.handle_error(
                    &format!("Could not scan {} for videos: {}", self.work_dir.display(), e),
                    None,
                );
                return report;
            }
        };

        if artifacts.is_empty() {
            log::info!("No videos to process");
            return report;
        }
        log::debug!("Found following videos to process: {:?}", artifacts);

        for artifact in &artifacts {
            log::info!("Processing file {}", artifact.display());
            match self.archive_artifact(artifact) {
                Ok(frames) => {
                    report.processed += 1;
                    report.frames_archived += frames;
                    log::info!("Successfully processed file ({} frames)", frames);
                }
                Err(e) => {
                    report.failed += 1;
                    self.notifier.report(&e);
                }
            }
        }

        report
    }

    /// Video files directly in the work directory, oldest name first.
    pub fn pending_artifacts(&self) -> Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        for entry in std::fs::read_dir(&self.work_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let is_video = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(VIDEO_EXTENSION))
                .unwrap_or(false);
            if is_video {
                artifacts.push(path);
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }

    /// Archive one artifact. Returns the number of frames moved.
    ///
    /// ffmpeg rejecting the video or an unparseable name discards the artifact
    /// so it is not retried forever. A tool that could not run, a failed probe
    /// or an empty frame set leave it in place for the next pass.
    pub fn archive_artifact(&self, artifact: &Path) -> Result<usize> {
        let stale = media::clear_frames(&self.work_dir)?;
        if stale > 0 {
            log::warn!("Removed {} stale frames left by an earlier pass", stale);
        }

        if let Err(e) = media::extract_frames(self.launcher.as_ref(), &self.ffmpeg, artifact, &self.work_dir) {
            self.abandon(artifact, &e);
            return Err(e);
        }
        log::debug!("Successfully split video into frames");

        let window = match self.time_window(artifact) {
            Ok(w) => w,
            Err(e) => {
                self.abandon(artifact, &e);
                return Err(e);
            }
        };

        let frames = media::list_frames(&self.work_dir)?;
        if frames.is_empty() {
            let name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            return Err(CollectorError::EmptyFrameSet(name));
        }

        let moved = self.move_frames(&frames, &window)?;
        log::debug!("Successfully moved and renamed frames");

        std::fs::remove_file(artifact)?;
        Ok(moved)
    }

    fn time_window(&self, artifact: &Path) -> Result<TimeWindow> {
        let start = artifact_start_time(artifact)?;
        let seconds = media::probe_duration(self.launcher.as_ref(), &self.ffprobe, artifact)?;
        Ok(TimeWindow::new(start, media::duration_from_seconds(seconds)))
    }

    /// Rename frames into the archive. Frames landing on the same second
    /// overwrite each other.
    fn move_frames(&self, frames: &[PathBuf], window: &TimeWindow) -> Result<usize> {
        std::fs::create_dir_all(&self.archive_dir)?;

        let times = window.frame_times(frames.len());
        for (frame, instant) in frames.iter().zip(times.iter()) {
            let dest = self.archive_dir.join(frame_file_name(instant));
            move_file(frame, &dest)?;
        }

        Ok(frames.len())
    }

    /// Clean up after a failed artifact. Only failures that will repeat on
    /// every pass delete the video; its frames are always removed.
    fn abandon(&self, artifact: &Path, err: &CollectorError) {
        if is_permanent(err) {
            if let Err(e) = std::fs::remove_file(artifact) {
                log::warn!("Could not delete {}: {}", artifact.display(), e);
            }
        } else {
            log::warn!("Keeping {} for a later pass", artifact.display());
        }
        match media::clear_frames(&self.work_dir) {
            Ok(0) => {}
            Ok(n) => log::debug!("Removed {} frames from the failed video", n),
            Err(e) => log::warn!("Could not clear frames after a failed video: {}", e),
        }
    }
}

/// ffmpeg exiting abnormally or a name that is not a capture instant.
fn is_permanent(err: &CollectorError) -> bool {
    matches!(err, CollectorError::Extraction { .. } | CollectorError::Timestamp { .. })
}

/// Rename, falling back to copy + delete when the archive is on another device.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if std::fs::copy(from, to).is_err() {
                return Err(CollectorError::Io(rename_err));
            }
            std::fs::remove_file(from)?;
            Ok(())
        }
    }
}
