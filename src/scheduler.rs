// Scheduler - drives capture, archival and disk checks forever
//
// Capture runs on the calling thread and paces the loop, even when it fails
// before recording anything. Archival and the
// disk check are handed to a TaskSpawner and never joined: work from one
// cycle may still be running when the next capture starts. Nothing here
// times out a background task; a hung ffmpeg stays hung and the archiver's
// single-flight guard makes later passes skip instead of piling up.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::archive::FrameArchiver;
use crate::capture::CaptureController;
use crate::notify::Notifier;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget task submission.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, name: &str, task: Task);
}

/// One named OS thread per task. Panics are caught and logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl TaskSpawner for ThreadSpawner {
    fn spawn(&self, name: &str, task: Task) {
        let label = name.to_string();
        let result = std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
                if outcome.is_err() {
                    log::error!("Background task '{}' panicked (recovered)", label);
                }
            });

        if let Err(e) = result {
            log::error!("Failed to spawn background task '{}': {}", name, e);
        }
    }
}

pub struct Scheduler {
    capture: CaptureController,
    archiver: Arc<FrameArchiver>,
    notifier: Arc<Notifier>,
    spawner: Box<dyn TaskSpawner>,
    archive_dir: PathBuf,
}

impl Scheduler {
    pub fn new(
        capture: CaptureController,
        archiver: Arc<FrameArchiver>,
        notifier: Arc<Notifier>,
        spawner: Box<dyn TaskSpawner>,
        archive_dir: PathBuf,
    ) -> Self {
        Self { capture, archiver, notifier, spawner, archive_dir }
    }

    /// One iteration: capture, then launch archival and the disk check.
    /// Takes at least the capture duration.
    pub fn run_cycle(&self) {
        let started = Instant::now();
        if let Err(e) = self.capture.capture_once() {
            self.notifier.report(&e);
        }
        if let Some(rest) = self.capture.capture_duration().checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }

        let archiver = Arc::clone(&self.archiver);
        self.spawner.spawn(
            "archive-pass",
            Box::new(move || {
                archiver.try_process_pending();
            }),
        );

        let notifier = Arc::clone(&self.notifier);
        let archive_dir = self.archive_dir.clone();
        self.spawner.spawn(
            "disk-check",
            Box::new(move || {
                if let Err(e) = notifier.check_disk_usage(&archive_dir) {
                    notifier.handle_error(&format!("Could not check disk usage: {}", e), None);
                }
            }),
        );
    }

    /// Never returns. The process is stopped from outside.
    pub fn run_forever(&self) -> ! {
        log::info!("Scheduler started");
        loop {
            self.run_cycle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{DiskBudget, Settings};
    use crate::process::ProcessOutput;
    use crate::testing::{FakeLauncher, RecordingTransport};
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Runs tasks immediately on the caller's thread and records their names.
    #[derive(Default)]
    struct InlineSpawner {
        names: Arc<Mutex<Vec<String>>>,
    }

    impl TaskSpawner for InlineSpawner {
        fn spawn(&self, name: &str, task: Task) {
            self.names.lock().unwrap().push(name.to_string());
            task();
        }
    }

    fn youtube_dl(code: i32, stderr: &'static str) -> FakeLauncher {
        FakeLauncher::new()
            .on("youtube-dl", move |spec| {
                let dir = spec.current_dir.clone().unwrap();
                std::fs::write(dir.join(&spec.args[4]), vec![0u8; 64])?;
                Ok(FakeLauncher::exited(code, stderr))
            })
            .on("ffmpeg", |spec| {
                let dir = spec.current_dir.clone().unwrap();
                std::fs::write(dir.join("thumb0001.jpg"), vec![0u8; 64])?;
                std::fs::write(dir.join("thumb0002.jpg"), vec![0u8; 64])?;
                Ok(FakeLauncher::exited(0, ""))
            })
            .on("ffprobe", |_| {
                Ok(ProcessOutput { code: Some(0), stdout: b"10.0".to_vec(), stderr: Vec::new() })
            })
    }

    type Harness = (Scheduler, Arc<RecordingTransport>, Arc<Mutex<Vec<String>>>);

    fn scheduler(tmp: &TempDir, launcher: FakeLauncher, budget: DiskBudget) -> Harness {
        paced_scheduler(tmp, launcher, budget, Duration::ZERO)
    }

    fn paced_scheduler(
        tmp: &TempDir,
        launcher: FakeLauncher,
        budget: DiskBudget,
        capture_duration: Duration,
    ) -> Harness {
        let mut settings = Settings::new(tmp.path(), "xoxb-test");
        settings.capture_duration = capture_duration;
        settings.disk_budget = budget;
        settings.tools.youtube_dl = PathBuf::from("youtube-dl");
        settings.tools.ffmpeg = PathBuf::from("ffmpeg");
        settings.tools.ffprobe = PathBuf::from("ffprobe");
        settings.ensure_directories().unwrap();

        let launcher = Arc::new(launcher);
        let clock = Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
        ));
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Arc::new(Notifier::new(Box::new(Arc::clone(&transport)), clock.clone(), &settings));
        let capture = CaptureController::new(launcher.clone(), clock, &settings);
        let archiver = Arc::new(FrameArchiver::new(launcher, Arc::clone(&notifier), &settings));

        let spawner = InlineSpawner::default();
        let names = Arc::clone(&spawner.names);
        let s = Scheduler::new(capture, archiver, notifier, Box::new(spawner), settings.archive_dir.clone());
        (s, transport, names)
    }

    #[test]
    fn test_cycle_captures_then_archives() {
        let tmp = TempDir::new().unwrap();
        let (s, transport, names) = scheduler(&tmp, youtube_dl(1, "ERROR: Interrupted by user"), DiskBudget::default());

        s.run_cycle();

        assert_eq!(*names.lock().unwrap(), vec!["archive-pass", "disk-check"]);
        let frames = tmp.path().join("frames");
        assert!(frames.join("2024-01-01 09:00:00.jpg").exists());
        assert!(frames.join("2024-01-01 09:00:05.jpg").exists());
        assert!(!tmp.path().join("2024-01-01 09:00:00.mp4").exists());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_capture_failure_reported_and_cycle_continues() {
        let tmp = TempDir::new().unwrap();
        let (s, transport, names) = scheduler(&tmp, youtube_dl(2, "ERROR: unable to open stream"), DiskBudget::default());

        s.run_cycle();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("Could not download video from source"));
        // Background work still launched
        assert_eq!(names.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_disk_warning_from_cycle() {
        let tmp = TempDir::new().unwrap();
        let budget = DiskBudget { max_capacity: 100, warn_fraction: 0.5 };
        let (s, transport, _) = scheduler(&tmp, youtube_dl(0, ""), budget);

        s.run_cycle();

        // Two 64 byte frames archived, 128 >= 50
        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("Disk usage warning"));
    }

    #[test]
    fn test_failed_capture_still_paces_the_loop() {
        let tmp = TempDir::new().unwrap();
        // No youtube-dl script: every capture fails before recording
        let (s, transport, names) = paced_scheduler(
            &tmp,
            FakeLauncher::new(),
            DiskBudget::default(),
            Duration::from_millis(200),
        );

        let started = std::time::Instant::now();
        for _ in 0..3 {
            s.run_cycle();
        }

        assert!(started.elapsed() >= Duration::from_millis(600));
        assert_eq!(names.lock().unwrap().len(), 6);
        // Rate limited to the first failure
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_thread_spawner_survives_panic() {
        let (tx, rx) = std::sync::mpsc::channel();
        ThreadSpawner.spawn("panics", Box::new(|| panic!("boom")));
        ThreadSpawner.spawn("reports", Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
