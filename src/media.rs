// FFprobe/FFmpeg wrappers for duration probing and frame extraction

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::TimeDelta;
use regex::Regex;

use crate::constants::{FRAME_EXTENSION, FRAME_PATTERN, FRAME_PREFIX};
use crate::error::{CollectorError, Result};
use crate::process::{CommandSpec, Launcher};

/// Probe a video's duration in seconds.
pub fn probe_duration(launcher: &dyn Launcher, ffprobe: &Path, video: &Path) -> Result<f64> {
    let spec = CommandSpec::new(ffprobe)
        .args([
            "-v", "error",
            "-show_entries", "format=duration",
            "-of", "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(video);

    let output = launcher
        .run(&spec)
        .map_err(|e| CollectorError::Probe(format!("Failed to run ffprobe: {}", e)))?;

    if !output.success() {
        return Err(CollectorError::Probe(format!("ffprobe failed: {}", output.stderr_text())));
    }

    parse_duration_seconds(&output.stdout_text())
}

/// Parse ffprobe's bare duration output, e.g. `30.016000\n`.
pub fn parse_duration_seconds(text: &str) -> Result<f64> {
    let trimmed = text.trim();
    let seconds: f64 = trimmed
        .parse()
        .map_err(|_| CollectorError::Probe(format!("Unexpected ffprobe output: '{}'", trimmed)))?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(CollectorError::Probe(format!("Invalid duration: {}", seconds)));
    }

    Ok(seconds)
}

/// Convert probed seconds to a TimeDelta at millisecond resolution.
pub fn duration_from_seconds(seconds: f64) -> TimeDelta {
    TimeDelta::milliseconds((seconds * 1000.0).round() as i64)
}

/// Split a video into numbered stills (`thumb0001.jpg`, ...) inside `work_dir`.
pub fn extract_frames(
    launcher: &dyn Launcher,
    ffmpeg: &Path,
    video: &Path,
    work_dir: &Path,
) -> Result<()> {
    let spec = CommandSpec::new(ffmpeg)
        .arg("-i")
        .arg(video)
        .arg(FRAME_PATTERN)
        .arg("-hide_banner")
        .current_dir(work_dir);

    let output = launcher.run(&spec)?;

    if !output.success() {
        return Err(CollectorError::Extraction { stderr: output.stderr_text() });
    }

    Ok(())
}

fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(
            r"^{}(\d+)\.{}$",
            regex::escape(FRAME_PREFIX),
            regex::escape(FRAME_EXTENSION)
        );
        Regex::new(&pattern).expect("frame pattern is a valid regex")
    })
}

/// Sequence index of an extracted frame name, `None` for anything else.
pub fn frame_index(file_name: &str) -> Option<u64> {
    frame_regex()
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Extracted frames in `dir`, ascending by sequence index.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames: Vec<(u64, PathBuf)> = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(frame_index) {
            frames.push((index, entry.path()));
        }
    }

    frames.sort();
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Remove extracted frames from `dir`. Returns how many were removed.
pub fn clear_frames(dir: &Path) -> Result<usize> {
    let frames = list_frames(dir)?;
    for frame in &frames {
        std::fs::remove_file(frame)?;
    }
    Ok(frames.len())
}
