// Frame Collector CLI binary

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use frame_collector::config::Settings;
use frame_collector::constants::{
    CAPTURE_SECONDS, MAX_CAPACITY_BYTES, NOTIFY_INTERVAL_MINUTES, SLACK_CHANNEL, STREAM_URL,
    WARN_FRACTION,
};
use frame_collector::notify::format_bytes;
use frame_collector::process::SystemLauncher;
use frame_collector::{logging, tools, Collector};

#[derive(Parser)]
#[command(name = "frame-collector")]
#[command(about = "Frame Collector - archive a live stream as timestamped stills", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture and archive forever (default)
    Run,

    /// Archive pending videos once and exit
    Archive,

    /// Report archive size against the disk budget
    DiskUsage,

    /// Check that youtube-dl, ffmpeg and ffprobe can be run
    CheckTools,
}

#[derive(Args)]
struct Options {
    /// Slack bot token for notifications
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true, global = true)]
    slack_token: Option<String>,

    /// Directory holding in-flight videos; frames are archived under <work-dir>/frames
    #[arg(short, long, default_value = ".", global = true)]
    work_dir: PathBuf,

    /// Stream to capture
    #[arg(long, default_value = STREAM_URL, global = true)]
    stream_url: String,

    /// Seconds of stream per capture
    #[arg(long, default_value_t = CAPTURE_SECONDS, global = true)]
    capture_seconds: u64,

    /// Minimum minutes between two notifications
    #[arg(long, default_value_t = NOTIFY_INTERVAL_MINUTES, global = true)]
    notify_interval_minutes: u64,

    /// Disk budget for the archive directory, in bytes
    #[arg(long, default_value_t = MAX_CAPACITY_BYTES, global = true)]
    max_capacity_bytes: u64,

    /// Fraction of the budget at which to warn (0 < f <= 1)
    #[arg(long, default_value_t = WARN_FRACTION, global = true)]
    warn_fraction: f64,

    /// Slack channel for notifications
    #[arg(long, default_value = SLACK_CHANNEL, global = true)]
    channel: String,

    /// Log file (defaults to <work-dir>/log)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

impl Options {
    fn into_settings(self) -> Settings {
        let mut settings = Settings::new(self.work_dir, self.slack_token.unwrap_or_default());
        settings.stream_url = self.stream_url;
        settings.capture_duration = Duration::from_secs(self.capture_seconds);
        settings.notify_interval = Duration::from_secs(self.notify_interval_minutes * 60);
        settings.disk_budget.max_capacity = self.max_capacity_bytes;
        settings.disk_budget.warn_fraction = self.warn_fraction;
        settings.slack_channel = self.channel;
        if let Some(log_file) = self.log_file {
            settings.log_path = log_file;
        }
        settings
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.options.into_settings();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(settings),
        Commands::Archive => cmd_archive(settings),
        Commands::DiskUsage => cmd_disk_usage(settings),
        Commands::CheckTools => cmd_check_tools(settings),
    }
}

/// Validate, create the directories and start logging.
fn bootstrap(settings: &Settings) -> Result<()> {
    settings.validate()?;
    settings.ensure_directories()?;
    logging::init_logging(&settings.log_path, settings.log_max_bytes, settings.log_backups)?;
    log::debug!("Settings: {}", serde_json::to_string(settings)?);
    Ok(())
}

fn cmd_run(settings: Settings) -> Result<()> {
    bootstrap(&settings)?;
    log::info!("Collecting frames from {} into {}", settings.stream_url, settings.archive_dir.display());

    let collector = Collector::from_settings(&settings);
    collector.scheduler.run_forever()
}

fn cmd_archive(settings: Settings) -> Result<()> {
    bootstrap(&settings)?;

    let collector = Collector::from_settings(&settings);
    let report = collector.archiver.process_pending();

    println!("Archive pass complete:");
    println!("  Processed:  {}", report.processed);
    println!("  Failed:     {}", report.failed);
    println!("  Frames:     {}", report.frames_archived);

    Ok(())
}

fn cmd_disk_usage(settings: Settings) -> Result<()> {
    bootstrap(&settings)?;

    let collector = Collector::from_settings(&settings);
    let usage = collector.notifier.check_disk_usage(&settings.archive_dir)?;

    println!("Archive:    {}", settings.archive_dir.display());
    println!("Used:       {}", format_bytes(usage.used_bytes));
    println!("Capacity:   {}", format_bytes(usage.budget.max_capacity));
    println!("Usage:      {:.1}%", usage.percent_of_capacity());
    if usage.is_over_threshold() {
        println!("Over the {:.0}% warning threshold", usage.budget.warn_fraction * 100.0);
    }

    Ok(())
}

fn cmd_check_tools(settings: Settings) -> Result<()> {
    let checks = [
        ("youtube-dl", &settings.tools.youtube_dl),
        ("ffmpeg", &settings.tools.ffmpeg),
        ("ffprobe", &settings.tools.ffprobe),
    ];

    let mut missing = 0;
    for (name, path) in checks {
        let available = tools::is_tool_available(&SystemLauncher, path);
        if !available {
            missing += 1;
        }
        println!(
            "{:<12} {:<10} {}",
            name,
            if available { "ok" } else { "MISSING" },
            path.display()
        );
    }

    if missing > 0 {
        anyhow::bail!("{} required tool(s) unavailable", missing);
    }
    Ok(())
}
