// Frame Collector Constants
// Defaults for every tunable. The binary can override each of them from the command line.

// Source stream
pub const STREAM_URL: &str =
    "https://56cdb389b57ec.streamlock.net:1935/nps/faithful.stream/chunklist_w940365989.m3u8";
pub const CAPTURE_SECONDS: u64 = 10;

// Stream capture process reports this on stderr when it was stopped by SIGINT
pub const INTERRUPT_MARKER: &str = "ERROR: Interrupted by user";

// Notifications
pub const NOTIFY_INTERVAL_MINUTES: u64 = 60;
pub const SLACK_CHANNEL: &str = "errors";
pub const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";
pub const SLACK_TIMEOUT_SECONDS: u64 = 15;
pub const LOG_TAIL_LINES: usize = 10;

// Disk budget (advisory only)
pub const MAX_CAPACITY_BYTES: u64 = 50 * 1024 * 1024 * 1024; // 50 GiB
pub const WARN_FRACTION: f64 = 0.8;

// Paths
pub const FRAMES_FOLDER: &str = "frames";
pub const LOG_FILENAME: &str = "log";
pub const CAPTURE_STAGING_FOLDER: &str = ".capturing";

// Log rotation
pub const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024; // 5 MiB
pub const LOG_BACKUP_COUNT: usize = 1;

// Filenames carry the capture instant at second precision
pub const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Media
pub const VIDEO_EXTENSION: &str = "mp4";
pub const FRAME_EXTENSION: &str = "jpg";
pub const FRAME_PREFIX: &str = "thumb";
pub const FRAME_PATTERN: &str = "thumb%04d.jpg";
