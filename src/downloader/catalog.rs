// FormatCatalog - available streams and display metadata for one video

use std::sync::Arc;

use tracing::{error, info, warn};

use super::errors::{DownloadError, Result};
use super::models::{SearchResult, VideoCatalog};
use super::traits::PlatformClient;
use super::video_id::VideoId;

/// Max-resolution thumbnail. Not every video has one.
pub fn thumbnail_url(video_id: &VideoId) -> String {
    format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", video_id)
}

/// Thumbnail that exists for every public video
pub fn fallback_thumbnail_url(video_id: &VideoId) -> String {
    format!("https://img.youtube.com/vi/{}/hqdefault.jpg", video_id)
}

pub struct FormatCatalog {
    client: Arc<dyn PlatformClient>,
}

impl FormatCatalog {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self { client }
    }

    /// Query the platform for the video's streams.
    ///
    /// Video streams are limited to adaptive (video-only) ones, since the
    /// pipeline always downloads audio separately and muxes.
    pub async fn fetch(&self, video_id: &VideoId) -> Result<VideoCatalog> {
        info!("[Catalog] Fetching formats for {} via {}", video_id, self.client.name());

        let info = self.client.get_video_info(video_id).await?;

        if info.video_streams.is_empty() && info.audio_streams.is_empty() {
            return Err(DownloadError::MetadataUnavailable(format!(
                "no streams reported for {}",
                video_id
            )));
        }

        let total_video = info.video_streams.len();
        let video_streams: Vec<_> = info
            .video_streams
            .into_iter()
            .filter(|s| s.adaptive)
            .collect();

        info!(
            video_id = %video_id,
            video = video_streams.len(),
            skipped_muxed = total_video - video_streams.len(),
            audio = info.audio_streams.len(),
            "[Catalog] Resolved \"{}\"",
            info.title
        );

        Ok(VideoCatalog {
            video_id: video_id.clone(),
            title: info.title,
            thumbnail_url: thumbnail_url(video_id),
            video_streams,
            audio_streams: info.audio_streams,
        })
    }

    /// Like `fetch`, but failures yield an empty catalog so the UI stays usable
    pub async fn fetch_or_empty(&self, video_id: &VideoId) -> VideoCatalog {
        match self.fetch(video_id).await {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("[Catalog] Error fetching formats for {}: {}", video_id, e);
                VideoCatalog::empty(video_id.clone(), thumbnail_url(video_id))
            }
        }
    }

    /// Parse the URL, then fetch
    pub async fn fetch_url(&self, url: &str) -> Result<VideoCatalog> {
        let video_id = VideoId::parse(url)?;
        self.fetch(&video_id).await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.client.search_videos(query, limit.max(1)).await?;
        info!("[Catalog] Search \"{}\" returned {} results", query, results.len());
        Ok(results)
    }

    /// Check that the max-resolution thumbnail exists, falling back to the
    /// always-present one when the platform answers with an error status.
    /// Network failures keep the best-effort guess.
    pub async fn verify_thumbnail(http: &reqwest::Client, video_id: &VideoId) -> String {
        let url = thumbnail_url(video_id);
        match http.head(&url).send().await {
            Ok(resp) if resp.status().is_success() => url,
            Ok(resp) => {
                warn!(
                    "[Catalog] No max-resolution thumbnail for {} (HTTP {}), using fallback",
                    video_id,
                    resp.status()
                );
                fallback_thumbnail_url(video_id)
            }
            Err(e) => {
                warn!("[Catalog] Thumbnail check failed for {}: {}", video_id, e);
                url
            }
        }
    }
}
