// Frame Collector - Library Entry Point
//
// Captures short segments of a live stream, turns each one into timestamped
// stills in the archive directory, and reports failures and disk pressure to
// Slack without flooding the channel.

pub mod constants;
pub mod error;
pub mod config;
pub mod tools;
pub mod clock;
pub mod timestamp;
pub mod process;
pub mod media;
pub mod capture;
pub mod archive;
pub mod notify;
pub mod scheduler;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use clock::{Clock, SystemClock};
use config::Settings;
use notify::{Notifier, SlackClient};
use process::{Launcher, SystemLauncher};

pub use archive::{ArchiveReport, FrameArchiver};
pub use capture::{CaptureArtifact, CaptureController};
pub use error::{CollectorError, Result};
pub use scheduler::{Scheduler, ThreadSpawner};

/// Fully wired components sharing one Notifier.
pub struct Collector {
    pub notifier: Arc<Notifier>,
    pub archiver: Arc<FrameArchiver>,
    pub scheduler: Scheduler,
}

impl Collector {
    /// Wire the production collaborators: real processes, the system clock,
    /// Slack, and one thread per background task.
    pub fn from_settings(settings: &Settings) -> Self {
        let launcher: Arc<dyn Launcher> = Arc::new(SystemLauncher);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let slack = SlackClient::new(settings.slack_token.clone());

        let notifier = Arc::new(Notifier::new(Box::new(slack), Arc::clone(&clock), settings));
        let archiver = Arc::new(FrameArchiver::new(Arc::clone(&launcher), Arc::clone(&notifier), settings));
        let capture = CaptureController::new(launcher, clock, settings);

        let scheduler = Scheduler::new(
            capture,
            Arc::clone(&archiver),
            Arc::clone(&notifier),
            Box::new(ThreadSpawner),
            settings.archive_dir.clone(),
        );

        Self { notifier, archiver, scheduler }
    }
}
