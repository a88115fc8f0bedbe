// External tool status: yt-dlp and ffmpeg

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::DownloaderConfig;
use super::utils::{find_binary, run_output_with_timeout};

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: PathBuf,
    pub is_available: bool,
}

pub struct ToolManager {
    ytdlp_path: PathBuf,
    ffmpeg_path: PathBuf,
}

impl ToolManager {
    pub fn new(config: &DownloaderConfig) -> Self {
        Self {
            ytdlp_path: find_binary("yt-dlp", config.ytdlp_path.as_deref()),
            ffmpeg_path: find_binary("ffmpeg", config.ffmpeg_path.as_deref()),
        }
    }

    pub async fn get_tool_info(&self, tool_type: ToolType) -> ToolInfo {
        let path = match tool_type {
            ToolType::YtDlp => self.ytdlp_path.clone(),
            ToolType::Ffmpeg => self.ffmpeg_path.clone(),
        };
        let version = get_version(&path, tool_type).await;

        ToolInfo {
            name: tool_type.as_str().to_string(),
            tool_type,
            is_available: version.is_some(),
            version,
            path,
        }
    }

    pub async fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp).await,
            self.get_tool_info(ToolType::Ffmpeg).await,
        ]
    }
}

async fn get_version(path: &Path, tool_type: ToolType) -> Option<String> {
    let args = vec![tool_type.version_arg().to_string()];
    match run_output_with_timeout(path, args, VERSION_TIMEOUT).await {
        Ok(output) if output.status.success() => {
            parse_version(tool_type, &String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            debug!("[Tools] {} exited with {}", path.display(), output.status);
            None
        }
        Err(e) => {
            debug!("[Tools] {} unavailable: {}", path.display(), e);
            None
        }
    }
}

/// yt-dlp prints just the version; ffmpeg prints "ffmpeg version X Copyright ..."
fn parse_version(tool_type: ToolType, stdout: &str) -> Option<String> {
    let first = stdout.lines().next()?.trim();
    let version = match tool_type {
        ToolType::YtDlp => first,
        ToolType::Ffmpeg => first
            .strip_prefix("ffmpeg version ")
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or(first),
    };
    (!version.is_empty()).then(|| version.to_string())
}
