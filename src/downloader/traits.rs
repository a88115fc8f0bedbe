// Seams between the pipeline and its external collaborators

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use super::errors::Result;
use super::models::{SearchResult, StreamDescriptor, VideoInfo};
use super::video_id::VideoId;

/// Body of one media stream, yielded chunk by chunk
pub struct ByteStream {
    /// Total size when known up front
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

impl ByteStream {
    pub fn new(content_length: Option<u64>, chunks: BoxStream<'static, Result<Bytes>>) -> Self {
        Self {
            content_length,
            chunks,
        }
    }
}

/// Video platform API client
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Name of the client (for logging)
    fn name(&self) -> &'static str;

    /// Search videos by free-text query
    async fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>>;

    /// Title and every stream the platform offers for the video
    async fn get_video_info(&self, video_id: &VideoId) -> Result<VideoInfo>;

    /// Start retrieving the bytes of one stream.
    ///
    /// Fails with `StreamUnavailable` when the platform refuses to serve it.
    async fn open_stream(&self, descriptor: &StreamDescriptor) -> Result<ByteStream>;
}

/// Picks where the finished artifact goes
#[async_trait]
pub trait ArtifactPlacer: Send + Sync {
    /// Returns `None` when the user dismissed the prompt
    async fn choose_destination(
        &self,
        suggested_name: &str,
        allowed_extensions: &[&str],
    ) -> Option<PathBuf>;
}
