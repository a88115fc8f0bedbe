// yt-dlp platform client
//
// Metadata and search go through the `yt-dlp` executable (`--dump-json`).
// Stream bytes are fetched directly from the media URLs it reports.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use crate::downloader::catalog::thumbnail_url;
use crate::downloader::config::DownloaderConfig;
use crate::downloader::diagnostics::{diagnose_error, summarize};
use crate::downloader::errors::{DownloadError, Result};
use crate::downloader::models::{SearchResult, StreamDescriptor, VideoInfo};
use crate::downloader::traits::{ByteStream, PlatformClient};
use crate::downloader::utils::{find_binary, run_output_with_timeout};
use crate::downloader::video_id::VideoId;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

pub struct YtDlpClient {
    ytdlp_path: PathBuf,
    proxy: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

impl YtDlpClient {
    pub fn new(config: &DownloaderConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(15));

        if let Some(proxy_url) = config.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                DownloadError::InvalidConfig(format!("invalid proxy {}: {}", proxy_url, e))
            })?;
            info!("[yt-dlp] Using proxy: {}", proxy_url);
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|e| DownloadError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            ytdlp_path: find_binary("yt-dlp", config.ytdlp_path.as_deref()),
            proxy: config.proxy.clone(),
            timeout: config.metadata_timeout(),
            http,
        })
    }

    /// Shared HTTP client (also used for thumbnail checks)
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
            "--retries".to_string(),
            "2".to_string(),
            "--user-agent".to_string(),
            USER_AGENT.to_string(),
        ];
        if let Some(proxy) = &self.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args
    }

    async fn run_ytdlp(&self, args: Vec<String>) -> Result<Vec<u8>> {
        debug!("[yt-dlp] {} {}", self.ytdlp_path.display(), args.join(" "));

        let output = run_output_with_timeout(&self.ytdlp_path, args, self.timeout).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let transient = diagnose_error(&stderr).is_some_and(|r| r.is_transient());
            warn!(transient, "[yt-dlp] Exited with {}: {}", output.status, stderr.trim());
            return Err(DownloadError::from(summarize(&stderr)));
        }
        Ok(output.stdout)
    }
}

/// Parse `yt-dlp --dump-json` output into stream descriptors.
///
/// Only formats with a direct http(s) URL are kept; manifests and
/// storyboards cannot be fetched as one byte stream.
pub fn parse_video_info(stdout: &[u8]) -> Result<VideoInfo> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| DownloadError::MetadataUnavailable(format!("Failed to parse JSON: {}", e)))?;

    let formats = json["formats"]
        .as_array()
        .ok_or_else(|| DownloadError::MetadataUnavailable("No formats array in JSON".to_string()))?;

    let mut video_streams = Vec::new();
    let mut audio_streams = Vec::new();

    for f in formats {
        let url = match f["url"].as_str() {
            Some(u) if !u.is_empty() => u,
            _ => continue,
        };
        let protocol = f["protocol"].as_str().unwrap_or("https");
        if protocol != "https" && protocol != "http" {
            continue;
        }

        let vcodec = f["vcodec"].as_str().unwrap_or("none");
        let acodec = f["acodec"].as_str().unwrap_or("none");
        let has_video = vcodec != "none";
        let has_audio = acodec != "none";

        let id = f["format_id"].as_str().unwrap_or_default();
        let ext = f["ext"].as_str().unwrap_or("mp4");
        let bitrate = f["tbr"]
            .as_f64()
            .or_else(|| f["vbr"].as_f64())
            .or_else(|| f["abr"].as_f64())
            .unwrap_or(0.0)
            .round() as u32;
        let size = f["filesize"].as_u64().or_else(|| f["filesize_approx"].as_u64());
        let headers: BTreeMap<String, String> = f["http_headers"]
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        if has_video {
            let quality = f["format_note"]
                .as_str()
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .or_else(|| f["height"].as_u64().map(|h| format!("{}p", h)))
                .unwrap_or_else(|| "unknown".to_string());

            video_streams.push(
                StreamDescriptor::video(id, &quality, ext, bitrate, !has_audio, url)
                    .with_content_length(size)
                    .with_headers(headers),
            );
        } else if has_audio {
            audio_streams.push(
                StreamDescriptor::audio(id, ext, bitrate, url)
                    .with_content_length(size)
                    .with_headers(headers),
            );
        }
    }

    Ok(VideoInfo {
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        video_streams,
        audio_streams,
    })
}

/// Parse `--flat-playlist --dump-json` output: one JSON object per line
pub fn parse_search_results(stdout: &[u8]) -> Vec<SearchResult> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let json: serde_json::Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    warn!("[yt-dlp] Skipping unparsable search entry: {}", e);
                    return None;
                }
            };
            let video_id: VideoId = json["id"].as_str()?.parse().ok()?;
            Some(SearchResult {
                thumbnail_url: thumbnail_url(&video_id),
                title: json["title"].as_str().unwrap_or("Unknown").to_string(),
                video_id,
            })
        })
        .collect()
}

#[async_trait]
impl PlatformClient for YtDlpClient {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let mut args = self.base_args();
        args.push("--flat-playlist".to_string());
        args.push(format!("ytsearch{}:{}", limit, query));

        let stdout = self.run_ytdlp(args).await?;
        Ok(parse_search_results(&stdout))
    }

    async fn get_video_info(&self, video_id: &VideoId) -> Result<VideoInfo> {
        let mut args = self.base_args();
        args.push("--no-playlist".to_string());
        args.push(video_id.watch_url());

        let stdout = self.run_ytdlp(args).await?;
        parse_video_info(&stdout)
    }

    async fn open_stream(&self, descriptor: &StreamDescriptor) -> Result<ByteStream> {
        let mut request = self.http.get(&descriptor.url);
        for (name, value) in &descriptor.http_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            DownloadError::StreamUnavailable(format!("{}: {}", descriptor.display_label(), e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::StreamUnavailable(summarize(&format!(
                "ERROR: HTTP Error {} for {}",
                status,
                descriptor.display_label()
            ))));
        }

        let content_length = response.content_length().or(descriptor.content_length);
        let chunks = response
            .bytes_stream()
            .map_err(|e| DownloadError::StreamUnavailable(e.to_string()))
            .boxed();

        Ok(ByteStream::new(content_length, chunks))
    }
}
