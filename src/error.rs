// Frame Collector Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stream capture exited abnormally without the interrupt marker.
    #[error("Could not download video from source: {stderr}")]
    Capture { stderr: String },

    /// Frame extraction exited abnormally.
    #[error("Could not split video into frames using FFmpeg: {stderr}")]
    Extraction { stderr: String },

    #[error("Archival invoked but no frames found for {0}")]
    EmptyFrameSet(String),

    #[error("FFprobe error: {0}")]
    Probe(String),

    #[error("Invalid timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("{0} not found - is it installed?")]
    ToolNotFound(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl CollectorError {
    /// Raw collaborator output worth logging next to the message, if any.
    pub fn detail(&self) -> Option<&[u8]> {
        match self {
            CollectorError::Capture { stderr } | CollectorError::Extraction { stderr } => {
                Some(stderr.as_bytes())
            }
            _ => None,
        }
    }

    /// Short headline used as the notification text.
    pub fn headline(&self) -> String {
        match self {
            CollectorError::Capture { .. } => "Could not download video from source".to_string(),
            CollectorError::Extraction { .. } => {
                "Could not split video into frames using FFmpeg".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for CollectorError {
    fn from(err: anyhow::Error) -> Self {
        CollectorError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_headline_excludes_stderr() {
        let err = CollectorError::Capture { stderr: "HTTP Error 404".to_string() };
        assert_eq!(err.headline(), "Could not download video from source");
        assert_eq!(err.detail(), Some("HTTP Error 404".as_bytes()));
        assert!(err.to_string().contains("HTTP Error 404"));
    }

    #[test]
    fn test_empty_frame_set_has_no_detail() {
        let err = CollectorError::EmptyFrameSet("a.mp4".to_string());
        assert!(err.detail().is_none());
        assert!(err.headline().contains("no frames found"));
    }
}
