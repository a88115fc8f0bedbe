// Downloader configuration: defaults, optional JSON file, environment overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{DownloadError, Result};

pub const ENV_YTDLP: &str = "MEDIA_GETTER_YTDLP";
pub const ENV_FFMPEG: &str = "MEDIA_GETTER_FFMPEG";
pub const ENV_PROXY: &str = "MEDIA_GETTER_PROXY";
pub const ENV_TEMP_DIR: &str = "MEDIA_GETTER_TEMP_DIR";
pub const ENV_DOWNLOAD_DIR: &str = "MEDIA_GETTER_DOWNLOAD_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    /// yt-dlp executable; discovered on PATH when unset
    pub ytdlp_path: Option<PathBuf>,
    /// ffmpeg executable; discovered on PATH when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// SOCKS5/HTTP proxy URL (e.g., "socks5h://127.0.0.1:1080")
    pub proxy: Option<String>,
    /// Limit for one yt-dlp metadata or search call
    pub metadata_timeout_secs: u64,
    /// Longest gap between two received chunks
    pub stall_timeout_secs: u64,
    /// Limit for one ffmpeg run
    pub mux_timeout_secs: u64,
    /// Parent of the per-run workspaces; system temp dir when unset
    pub temp_root: Option<PathBuf>,
    /// Where non-interactive downloads are saved
    pub download_dir: PathBuf,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            proxy: None,
            metadata_timeout_secs: 30,
            stall_timeout_secs: 30,
            mux_timeout_secs: 600,
            temp_root: None,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl DownloaderConfig {
    /// Defaults, then the optional JSON file, then the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let config = match file {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        Ok(config.apply_env(|key| std::env::var(key).ok()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DownloadError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| DownloadError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    /// Override fields from environment-style lookups
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_YTDLP) {
            self.ytdlp_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_FFMPEG) {
            self.ffmpeg_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_PROXY) {
            self.proxy = Some(v);
        }
        if let Some(v) = non_empty(ENV_TEMP_DIR) {
            self.temp_root = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_DOWNLOAD_DIR) {
            self.download_dir = PathBuf::from(v);
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        if proxy.is_some() {
            self.proxy = proxy;
        }
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<PathBuf>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_ffmpeg_path(mut self, path: Option<PathBuf>) -> Self {
        self.ffmpeg_path = path;
        self
    }

    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = dir;
        self
    }

    pub fn with_stall_timeout(mut self, seconds: u64) -> Self {
        self.stall_timeout_secs = seconds;
        self
    }

    pub fn with_mux_timeout(mut self, seconds: u64) -> Self {
        self.mux_timeout_secs = seconds;
        self
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs.max(1))
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }

    pub fn mux_timeout(&self) -> Duration {
        Duration::from_secs(self.mux_timeout_secs.max(1))
    }
}
