// Common data models for the downloader

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::DownloadError;
use super::video_id::VideoId;

/// Track type carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One downloadable audio or video track variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Platform format id (e.g., "137", "140"), stable within one catalog
    pub id: String,
    pub kind: StreamKind,
    /// Container extension (mp4, webm, m4a)
    pub extension: String,
    /// Bitrate in kbps
    pub bitrate_kbps: u32,
    /// Quality label for video streams (e.g., "1080p")
    pub quality_label: Option<String>,
    /// Video-only stream without embedded audio
    pub adaptive: bool,
    /// Direct media URL; signed, may expire
    #[serde(skip_serializing, default)]
    pub url: String,
    /// Size in bytes when the platform knows it
    pub content_length: Option<u64>,
    /// Request headers the platform expects when fetching `url`
    #[serde(skip)]
    pub http_headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    pub fn audio(id: &str, extension: &str, bitrate_kbps: u32, url: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: StreamKind::Audio,
            extension: extension.to_string(),
            bitrate_kbps,
            quality_label: None,
            adaptive: false,
            url: url.to_string(),
            content_length: None,
            http_headers: BTreeMap::new(),
        }
    }

    /// Video stream; `adaptive` marks it as video-only
    pub fn video(
        id: &str,
        quality_label: &str,
        extension: &str,
        bitrate_kbps: u32,
        adaptive: bool,
        url: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind: StreamKind::Video,
            extension: extension.to_string(),
            bitrate_kbps,
            quality_label: Some(quality_label.to_string()),
            adaptive,
            url: url.to_string(),
            content_length: None,
            http_headers: BTreeMap::new(),
        }
    }

    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.http_headers = headers;
        self
    }

    /// Human-readable label shown in format pickers
    pub fn display_label(&self) -> String {
        match (self.kind, &self.quality_label) {
            (StreamKind::Video, Some(quality)) => {
                format!("{} - {} - {} kbps", quality, self.extension, self.bitrate_kbps)
            }
            _ => format!("{} - {} kbps", self.extension, self.bitrate_kbps),
        }
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_label())
    }
}

/// Raw video information from the platform client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub video_streams: Vec<StreamDescriptor>,
    pub audio_streams: Vec<StreamDescriptor>,
}

/// Formats and display metadata for one video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoCatalog {
    pub video_id: VideoId,
    pub title: String,
    pub thumbnail_url: String,
    /// Adaptive (video-only) streams
    pub video_streams: Vec<StreamDescriptor>,
    pub audio_streams: Vec<StreamDescriptor>,
}

impl VideoCatalog {
    /// Catalog with no formats, used when metadata could not be fetched
    pub fn empty(video_id: VideoId, thumbnail_url: String) -> Self {
        Self {
            video_id,
            title: String::new(),
            thumbnail_url,
            video_streams: Vec::new(),
            audio_streams: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video_streams.is_empty() && self.audio_streams.is_empty()
    }

    pub fn find_video(&self, id: &str) -> Option<&StreamDescriptor> {
        self.video_streams.iter().find(|s| s.id == id)
    }

    pub fn find_audio(&self, id: &str) -> Option<&StreamDescriptor> {
        self.audio_streams.iter().find(|s| s.id == id)
    }
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub video_id: VideoId,
    pub title: String,
    pub thumbnail_url: String,
}

/// What the user asked to download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadType {
    AudioOnly,
    VideoAndAudio,
}

impl DownloadType {
    /// Extension of the placed artifact
    pub fn output_extension(&self) -> &'static str {
        match self {
            Self::AudioOnly => "mp3",
            Self::VideoAndAudio => "mp4",
        }
    }

    /// Extensions offered by the save prompt, preferred first
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::AudioOnly => &["mp3", "wav"],
            Self::VideoAndAudio => &["mp4", "mkv"],
        }
    }
}

/// One user-initiated download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub video_id: VideoId,
    pub video: Option<StreamDescriptor>,
    pub audio: Option<StreamDescriptor>,
    pub download_type: DownloadType,
}

impl DownloadRequest {
    pub fn audio_only(video_id: VideoId, audio: StreamDescriptor) -> Self {
        Self {
            video_id,
            video: None,
            audio: Some(audio),
            download_type: DownloadType::AudioOnly,
        }
    }

    pub fn video_and_audio(
        video_id: VideoId,
        video: StreamDescriptor,
        audio: StreamDescriptor,
    ) -> Self {
        Self {
            video_id,
            video: Some(video),
            audio: Some(audio),
            download_type: DownloadType::VideoAndAudio,
        }
    }
}

/// Pipeline state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    ResolvingFormats,
    Fetching,
    Merging,
    Placing,
    Succeeded,
    Failed,
    Canceled,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// Terminal outcome as seen by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadStatus {
    Succeeded { path: PathBuf },
    Failed { kind: String, message: String },
    Canceled,
}

impl From<&Result<PathBuf, DownloadError>> for DownloadStatus {
    fn from(result: &Result<PathBuf, DownloadError>) -> Self {
        match result {
            Ok(path) => Self::Succeeded { path: path.clone() },
            Err(DownloadError::Canceled) => Self::Canceled,
            Err(e) => Self::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Per-stream progress update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub kind: StreamKind,
    /// 0.0 to 1.0
    pub fraction: f32,
}

/// Events published by a running pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Stage { stage: PipelineStage },
    Progress(DownloadProgress),
    Finished { outcome: DownloadStatus },
}
