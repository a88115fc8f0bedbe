// VideoId - canonical YouTube video identifier parsed from a URL

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::{DownloadError, Result};

const WATCH_PREFIX: &str = "https://www.youtube.com/watch?";
const SHORT_PREFIX: &str = "https://youtu.be/";

lazy_static::lazy_static! {
    // `v=` must be a query parameter and the id must end at a separator
    static ref WATCH_ID_RE: Regex =
        Regex::new(r"[?&]v=([0-9A-Za-z_-]{11})(?:$|[&#])").unwrap();
    static ref SHORT_ID_RE: Regex =
        Regex::new(r"^https://youtu\.be/([0-9A-Za-z_-]{11})(?:$|[?&#/])").unwrap();
    static ref BARE_ID_RE: Regex = Regex::new(r"^[0-9A-Za-z_-]{11}$").unwrap();
}

/// 11-character platform identifier, immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Parse a watch-page or short-link URL
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();

        let caps = if url.starts_with(WATCH_PREFIX) {
            WATCH_ID_RE.captures(url)
        } else if url.starts_with(SHORT_PREFIX) {
            SHORT_ID_RE.captures(url)
        } else {
            return Err(DownloadError::InvalidUrl(format!(
                "{} (expected {} or {})",
                url, WATCH_PREFIX, SHORT_PREFIX
            )));
        };

        caps.and_then(|c| c.get(1))
            .map(|m| Self(m.as_str().to_string()))
            .ok_or_else(|| {
                DownloadError::InvalidUrl(format!("{} (unable to extract video ID)", url))
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch-page URL for this id
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl FromStr for VideoId {
    type Err = DownloadError;

    /// Accepts either a bare id or a URL
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if BARE_ID_RE.is_match(s) {
            return Ok(Self(s.to_string()));
        }
        Self::parse(s)
    }
}

impl TryFrom<String> for VideoId {
    type Error = DownloadError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
