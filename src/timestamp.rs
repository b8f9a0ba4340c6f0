// Instants embedded in filenames
//
// Capture artifacts are named by the instant capture began and archived frames
// by their synthesized instant. Both go through format_instant/parse_instant so
// the writer and the reader can never disagree on the layout.

use std::path::Path;

use chrono::{NaiveDateTime, TimeDelta};

use crate::constants::{FILENAME_TIME_FORMAT, FRAME_EXTENSION, VIDEO_EXTENSION};
use crate::error::{CollectorError, Result};

/// Render an instant at second precision. Sub-second parts are dropped.
pub fn format_instant(instant: &NaiveDateTime) -> String {
    instant.format(FILENAME_TIME_FORMAT).to_string()
}

/// Parse an instant written by `format_instant`.
pub fn parse_instant(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, FILENAME_TIME_FORMAT).map_err(|source| {
        CollectorError::Timestamp { value: value.to_string(), source }
    })
}

/// `2024-01-01 00:00:00.mp4`
pub fn artifact_file_name(start: &NaiveDateTime) -> String {
    format!("{}.{}", format_instant(start), VIDEO_EXTENSION)
}

/// `2024-01-01 00:00:10.jpg`
pub fn frame_file_name(instant: &NaiveDateTime) -> String {
    format!("{}.{}", format_instant(instant), FRAME_EXTENSION)
}

/// Recover the capture start instant from an artifact path.
pub fn artifact_start_time(path: &Path) -> Result<NaiveDateTime> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CollectorError::Other(format!("Artifact has no usable name: {}", path.display())))?;
    parse_instant(stem)
}

/// Spread `count` instants evenly over `[start, start + duration)`.
///
/// Frame `i` lands on `start + i * (duration / count)`. The interval is kept at
/// millisecond resolution so rounding only happens when the instant is
/// rendered into a filename.
pub fn interpolate(start: NaiveDateTime, duration: TimeDelta, count: usize) -> Vec<NaiveDateTime> {
    if count == 0 {
        return Vec::new();
    }

    let interval_ms = duration.num_milliseconds() / count as i64;
    let interval = TimeDelta::milliseconds(interval_ms);

    (0..count)
        .map(|i| start + interval * i as i32)
        .collect()
}
