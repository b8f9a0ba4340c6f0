// Notifier - rate-limited error and disk usage reporting
//
// One limiter per Notifier covers every outbound message. Errors and disk
// warnings share the same quota. The first message always goes out; after
// that at most one message per interval.

pub mod slack;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDateTime, TimeDelta};
use walkdir::WalkDir;

use crate::clock::Clock;
use crate::config::{DiskBudget, Settings};
use crate::constants::LOG_TAIL_LINES;
use crate::error::{CollectorError, Result};

pub use slack::SlackClient;

/// Bytes read from the end of the log when building a tail.
const TAIL_WINDOW_BYTES: u64 = 64 * 1024;

/// Outbound chat client.
pub trait MessageTransport: Send + Sync {
    fn post_message(&self, channel: &str, text: &str) -> Result<()>;
}

/// Archive directory size measured against the budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub used_bytes: u64,
    pub budget: DiskBudget,
}

impl DiskUsage {
    pub fn is_over_threshold(&self) -> bool {
        self.budget.is_exceeded(self.used_bytes)
    }

    pub fn percent_of_capacity(&self) -> f64 {
        self.used_bytes as f64 / self.budget.max_capacity as f64 * 100.0
    }

    pub fn report(&self, dir: &Path) -> String {
        format!(
            "Disk usage warning: {} holds {} of {} ({:.1}%, warning at {:.0}%)",
            dir.display(),
            format_bytes(self.used_bytes),
            format_bytes(self.budget.max_capacity),
            self.percent_of_capacity(),
            self.budget.warn_fraction * 100.0
        )
    }
}

pub struct Notifier {
    transport: Box<dyn MessageTransport>,
    clock: Arc<dyn Clock>,
    channel: String,
    interval: TimeDelta,
    budget: DiskBudget,
    log_path: Option<PathBuf>,
    last_sent_at: Mutex<Option<NaiveDateTime>>,
}

impl Notifier {
    pub fn new(
        transport: Box<dyn MessageTransport>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        Self {
            transport,
            clock,
            channel: settings.slack_channel.clone(),
            interval: TimeDelta::from_std(settings.notify_interval).unwrap_or(TimeDelta::MAX),
            budget: settings.disk_budget,
            log_path: Some(settings.log_path.clone()),
            last_sent_at: Mutex::new(None),
        }
    }

    /// Log an error and, quota permitting, post it with the log tail attached.
    pub fn handle_error(&self, message: &str, raw_error: Option<&[u8]>) {
        log::error!("{}", message);
        if let Some(raw) = raw_error {
            log::error!("{}", String::from_utf8_lossy(raw).trim_end());
        }

        if !self.acquire_slot() {
            log::debug!("Error notification suppressed by rate limit");
            return;
        }

        let text = match self.log_tail() {
            Some(tail) if !tail.is_empty() => format!("{}\n```\n{}\n```", message, tail),
            _ => message.to_string(),
        };
        self.transmit(&text);
    }

    /// Report a collector error through `handle_error`.
    pub fn report(&self, err: &CollectorError) {
        self.handle_error(&err.headline(), err.detail());
    }

    /// Post a message unless the limiter says no. Returns whether it was sent.
    pub fn send_message(&self, message: &str) -> bool {
        if !self.acquire_slot() {
            log::debug!("Notification suppressed by rate limit: {}", message);
            return false;
        }
        self.transmit(message);
        true
    }

    /// Measure the archive directory and warn when it reaches the budget.
    /// Advisory only: nothing is deleted.
    pub fn check_disk_usage(&self, dir: &Path) -> Result<DiskUsage> {
        let usage = DiskUsage {
            used_bytes: directory_size(dir)?,
            budget: self.budget,
        };

        log::debug!(
            "Archive size {} ({:.1}% of capacity)",
            format_bytes(usage.used_bytes),
            usage.percent_of_capacity()
        );

        if usage.is_over_threshold() {
            let report = usage.report(dir);
            log::warn!("{}", report);
            self.send_message(&report);
        }

        Ok(usage)
    }

    /// Check and claim the single shared quota slot.
    fn acquire_slot(&self) -> bool {
        let now = self.clock.now();
        let mut last = self.last_sent_at.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(prev) = *last {
            if now - prev < self.interval {
                return false;
            }
        }

        *last = Some(now);
        true
    }

    /// Transport failures are logged and swallowed.
    fn transmit(&self, text: &str) {
        if let Err(e) = self.transport.post_message(&self.channel, text) {
            log::error!("Failed to send notification: {}", e);
        }
    }

    fn log_tail(&self) -> Option<String> {
        let path = self.log_path.as_ref()?;
        match log_tail(path, LOG_TAIL_LINES) {
            Ok(tail) => Some(tail),
            Err(e) => {
                log::warn!("Could not read log tail from {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Total size of regular files directly inside `dir` (not recursive).
pub fn directory_size(dir: &Path) -> Result<u64> {
    // Surface a missing directory instead of reporting zero
    std::fs::metadata(dir)?;

    let mut total = 0u64;
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        // A frame may be renamed or removed between listing and stat
        if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }

    Ok(total)
}

/// Last `lines` lines of a text file.
pub fn log_tail(path: &Path, lines: usize) -> Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let start = len.saturating_sub(TAIL_WINDOW_BYTES);
    file.seek(SeekFrom::Start(start))?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    let mut tail: Vec<&str> = text.lines().rev().take(lines).collect();
    tail.reverse();
    Ok(tail.join("\n"))
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::RecordingTransport;
    use chrono::NaiveDate;
    use std::time::Duration;
    use tempfile::TempDir;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn notifier(
        dir: &Path,
        interval: Duration,
        budget: DiskBudget,
    ) -> (Notifier, Arc<RecordingTransport>, Arc<ManualClock>) {
        let transport = Arc::new(RecordingTransport::default());
        let clock = Arc::new(ManualClock::new(start()));
        let mut settings = Settings::new(dir, "xoxb-test");
        settings.notify_interval = interval;
        settings.disk_budget = budget;
        let n = Notifier::new(Box::new(Arc::clone(&transport)), clock.clone(), &settings);
        (n, transport, clock)
    }

    #[test]
    fn test_first_message_always_sent() {
        let tmp = TempDir::new().unwrap();
        let (n, transport, _) = notifier(tmp.path(), Duration::from_secs(3600), DiskBudget::default());
        assert!(n.send_message("hello"));
        assert_eq!(transport.sent(), vec![("errors".to_string(), "hello".to_string())]);
    }

    #[test]
    fn test_rate_limit_within_interval() {
        let tmp = TempDir::new().unwrap();
        let (n, transport, clock) = notifier(tmp.path(), Duration::from_secs(60), DiskBudget::default());
        assert!(n.send_message("one"));
        clock.advance(TimeDelta::seconds(59));
        assert!(!n.send_message("two"));
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_rate_limit_at_interval_boundary() {
        let tmp = TempDir::new().unwrap();
        let (n, transport, clock) = notifier(tmp.path(), Duration::from_secs(60), DiskBudget::default());
        assert!(n.send_message("one"));
        clock.advance(TimeDelta::seconds(60));
        assert!(n.send_message("two"));
        assert_eq!(transport.sent().len(), 2);
    }

    #[test]
    fn test_suppressed_call_does_not_extend_window() {
        let tmp = TempDir::new().unwrap();
        let (n, _, clock) = notifier(tmp.path(), Duration::from_secs(60), DiskBudget::default());
        assert!(n.send_message("one"));
        clock.advance(TimeDelta::seconds(30));
        assert!(!n.send_message("two"));
        clock.advance(TimeDelta::seconds(30));
        assert!(n.send_message("three"));
    }

    #[test]
    fn test_errors_and_disk_warnings_share_quota() {
        let tmp = TempDir::new().unwrap();
        let budget = DiskBudget { max_capacity: 10, warn_fraction: 0.5 };
        let (n, transport, _) = notifier(tmp.path(), Duration::from_secs(60), budget);
        let archive = tmp.path().join("frames");
        std::fs::create_dir(&archive).unwrap();
        std::fs::write(archive.join("a.jpg"), [0u8; 5]).unwrap();

        n.handle_error("boom", None);
        let usage = n.check_disk_usage(&archive).unwrap();
        assert!(usage.is_over_threshold());
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_handle_error_appends_log_tail() {
        let tmp = TempDir::new().unwrap();
        let (n, transport, _) = notifier(tmp.path(), Duration::from_secs(60), DiskBudget::default());
        let lines: Vec<String> = (1..=15).map(|i| format!("line {}", i)).collect();
        std::fs::write(tmp.path().join("log"), lines.join("\n") + "\n").unwrap();

        n.handle_error("Could not download video from source", Some(b"HTTP Error 403"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let text = &sent[0].1;
        assert!(text.starts_with("Could not download video from source"));
        assert!(text.contains("line 15"));
        assert!(text.contains("line 6"));
        assert!(!text.contains("line 5\n"));
    }

    #[test]
    fn test_handle_error_without_log_file() {
        let tmp = TempDir::new().unwrap();
        let (n, transport, _) = notifier(tmp.path(), Duration::from_secs(60), DiskBudget::default());
        n.handle_error("no log yet", None);
        assert_eq!(transport.sent()[0].1, "no log yet");
    }

    #[test]
    fn test_transport_failure_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::new(tmp.path(), "xoxb-test");
        let clock = Arc::new(ManualClock::new(start()));
        let n = Notifier::new(Box::new(RecordingTransport::failing()), clock, &settings);
        assert!(n.send_message("still counts"));
        // The failed attempt consumed the slot
        assert!(!n.send_message("second"));
    }

    #[test]
    fn test_disk_usage_boundary() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("frames");
        std::fs::create_dir(&archive).unwrap();
        std::fs::write(archive.join("a.jpg"), [0u8; 49]).unwrap();

        let budget = DiskBudget { max_capacity: 100, warn_fraction: 0.5 };
        let (n, transport, _) = notifier(tmp.path(), Duration::from_secs(60), budget);
        let usage = n.check_disk_usage(&archive).unwrap();
        assert_eq!(usage.used_bytes, 49);
        assert!(transport.sent().is_empty());

        std::fs::write(archive.join("b.jpg"), [0u8; 1]).unwrap();
        let usage = n.check_disk_usage(&archive).unwrap();
        assert_eq!(usage.used_bytes, 50);
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("Disk usage warning"));
    }

    #[test]
    fn test_directory_size_is_not_recursive() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.jpg"), [0u8; 10]).unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("b.jpg"), [0u8; 100]).unwrap();
        assert_eq!(directory_size(tmp.path()).unwrap(), 10);
    }

    #[test]
    fn test_directory_size_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(directory_size(&tmp.path().join("missing")).is_err());
    }

    #[test]
    fn test_log_tail_short_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log");
        std::fs::write(&path, "a\nb\n").unwrap();
        assert_eq!(log_tail(&path, 10).unwrap(), "a\nb");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(50 * 1024 * 1024 * 1024), "50.00 GB");
    }

    #[test]
    fn test_concurrent_senders_get_one_slot() {
        let tmp = TempDir::new().unwrap();
        let (n, transport, _) = notifier(tmp.path(), Duration::from_secs(60), DiskBudget::default());
        let n = Arc::new(n);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let n = Arc::clone(&n);
                std::thread::spawn(move || n.send_message(&format!("msg {}", i)))
            })
            .collect();
        let sent = handles.into_iter().map(|h| h.join().unwrap()).filter(|s| *s).count();

        assert_eq!(sent, 1);
        assert_eq!(transport.sent().len(), 1);
    }
}
