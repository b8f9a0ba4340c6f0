// External tool resolver for youtube-dl/ffmpeg/ffprobe
//
// Resolution order:
// 1) Environment variable override (FRAMECOL_FFPROBE_PATH, etc.)
// 2) Binary next to the executable
// 3) bin/ subdirectory next to the executable
// 4) PATH fallback

use std::env;
use std::path::{Path, PathBuf};

use crate::process::{CommandSpec, Launcher};

/// Get the directory containing the current executable
fn exe_dir() -> Option<PathBuf> {
    env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}

/// Resolve an external tool path.
fn resolve_tool(env_key: &str, default_name: &str) -> PathBuf {
    if let Ok(v) = env::var(env_key) {
        let p = PathBuf::from(&v);
        if p.exists() {
            return p;
        }
    }

    let mut filename = default_name.to_string();
    if cfg!(windows) && !filename.to_lowercase().ends_with(".exe") {
        filename.push_str(".exe");
    }

    if let Some(dir) = exe_dir() {
        let candidate = dir.join(&filename);
        if candidate.exists() {
            return candidate;
        }

        let bin_candidate = dir.join("bin").join(&filename);
        if bin_candidate.exists() {
            return bin_candidate;
        }
    }

    PathBuf::from(default_name)
}

/// Get path to the stream capture tool
pub fn youtube_dl_path() -> PathBuf {
    resolve_tool("FRAMECOL_YTDL_PATH", "youtube-dl")
}

/// Get path to ffmpeg binary
pub fn ffmpeg_path() -> PathBuf {
    resolve_tool("FRAMECOL_FFMPEG_PATH", "ffmpeg")
}

/// Get path to ffprobe binary
pub fn ffprobe_path() -> PathBuf {
    resolve_tool("FRAMECOL_FFPROBE_PATH", "ffprobe")
}

/// Check if a tool answers its version flag.
/// ffmpeg/ffprobe take `-version`, youtube-dl takes `--version`.
pub fn is_tool_available(launcher: &dyn Launcher, path: &Path) -> bool {
    let is_ytdl = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.contains("youtube-dl") || s.contains("yt-dlp"))
        .unwrap_or(false);
    let flag = if is_ytdl { "--version" } else { "-version" };

    launcher
        .run(&CommandSpec::new(path).arg(flag))
        .map(|o| o.success())
        .unwrap_or(false)
}
