// Downloader module - resolve formats, fetch streams, merge, place

pub mod backends;
pub mod catalog;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod muxer;
pub mod pipeline;
pub mod placer;
pub mod tools;
pub mod traits;
pub mod utils;
pub mod video_id;

pub use catalog::FormatCatalog;
pub use config::DownloaderConfig;
pub use errors::{DownloadError, Result};
pub use models::{
    DownloadProgress, DownloadRequest, DownloadStatus, DownloadType, PipelineEvent, PipelineStage,
    SearchResult, StreamDescriptor, StreamKind, VideoCatalog, VideoInfo,
};
pub use pipeline::{DownloadPipeline, PipelineHandle};
pub use traits::{ArtifactPlacer, ByteStream, PlatformClient};
pub use video_id::VideoId;
