// Error types for the download pipeline

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// URL is not a YouTube watch-page or short link, or carries no valid id
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Platform returned no metadata for the video
    #[error("Video metadata unavailable: {0}")]
    MetadataUnavailable(String),

    /// Selected stream is not part of the video's catalog
    #[error("Format not found: {0}")]
    FormatNotFound(String),

    /// Platform could not serve the stream bytes
    #[error("Stream unavailable: {0}")]
    StreamUnavailable(String),

    /// ffmpeg exited with a non-zero status
    #[error("ffmpeg process failed with exit code {0}")]
    MuxFailed(i32),

    /// ffmpeg did not finish in time and was killed
    #[error("ffmpeg did not finish within {0}s")]
    MuxTimedOut(u64),

    /// yt-dlp or ffmpeg could not be started
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// User dismissed the save prompt
    #[error("Save file not selected")]
    SaveCanceled,

    /// User canceled the download
    #[error("Download canceled")]
    Canceled,

    /// Configuration file could not be read or parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Pipeline task ended without reporting an outcome
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Workspace I/O error at {path}: {source}")]
    WorkspaceIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    pub fn workspace_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WorkspaceIo {
            path: path.into(),
            source,
        }
    }

    /// Outcomes caused by the user rather than by the system.
    /// The UI should not present these as errors.
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, Self::SaveCanceled | Self::Canceled)
    }

    /// Raised before any network or subprocess work starts
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidUrl(_) | Self::FormatNotFound(_))
    }

    /// Short machine-friendly classification, used in logs and by the front end
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "invalid_url",
            Self::MetadataUnavailable(_) => "metadata_unavailable",
            Self::FormatNotFound(_) => "format_not_found",
            Self::StreamUnavailable(_) => "stream_unavailable",
            Self::MuxFailed(_) => "mux_failed",
            Self::MuxTimedOut(_) => "mux_timed_out",
            Self::ToolNotFound(_) => "tool_not_found",
            Self::SaveCanceled => "save_canceled",
            Self::Canceled => "canceled",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Internal(_) => "internal",
            Self::WorkspaceIo { .. } => "workspace_io",
        }
    }
}

// Classify raw yt-dlp stderr from a metadata call
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("no such file") || lower.contains("command not found") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("invalid url") || lower.contains("unsupported url") {
            return Self::InvalidUrl(s);
        }

        Self::MetadataUnavailable(s)
    }
}
