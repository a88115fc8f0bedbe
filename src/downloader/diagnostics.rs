// Failure diagnostics - turns raw yt-dlp stderr into a readable reason
//
// Only used to build messages. Control flow never depends on the result.

use serde::{Deserialize, Serialize};

/// Why the platform refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingReason {
    /// HTTP 403 Forbidden - signed URL expired or access denied
    Http403Forbidden,
    /// Age-restricted content requiring login
    AgeRestricted,
    /// Private video requiring authorization
    PrivateVideo,
    /// Video deleted or unavailable
    VideoUnavailable,
    /// Geographic restriction
    GeoBlocked,
    /// Rate limiting (429 or similar)
    RateLimited,
    /// Bot detection triggered
    BotDetection,
    /// Network timeout (soft IP block)
    NetworkTimeout,
    /// DRM-protected content; cannot be downloaded at all
    DrmProtected,
    Unknown,
}

impl BlockingReason {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Http403Forbidden => "Access denied (HTTP 403)",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited by YouTube",
            Self::BotDetection => "Bot detection triggered",
            Self::NetworkTimeout => "Network timeout (possible IP throttling)",
            Self::DrmProtected => "DRM-protected content",
            Self::Unknown => "Unknown error",
        }
    }

    /// Retrying later, or through a proxy, may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http403Forbidden | Self::RateLimited | Self::BotDetection | Self::NetworkTimeout
        )
    }

    /// What the user can try next
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Http403Forbidden => Some("Reload the formats and try again; stream links expire."),
            Self::GeoBlocked => Some("Use a proxy server in an allowed region."),
            Self::RateLimited | Self::BotDetection => {
                Some("Wait and try again later, or enable a proxy.")
            }
            Self::NetworkTimeout => Some("Check the network connection or proxy settings."),
            Self::DrmProtected => Some("This content cannot be downloaded as a file."),
            _ => None,
        }
    }
}

/// Analyze error text and return the blocking reason
pub fn diagnose_error(error: &str) -> Option<BlockingReason> {
    if error.trim().is_empty() {
        return None;
    }

    let lower = error.to_lowercase();

    // Ordered from most to least specific
    if lower.contains("drm") || lower.contains("widevine") || lower.contains("requires payment") {
        return Some(BlockingReason::DrmProtected);
    }

    if lower.contains("age-restricted") || lower.contains("sign in to confirm your age") {
        return Some(BlockingReason::AgeRestricted);
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return Some(BlockingReason::PrivateVideo);
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
    {
        return Some(BlockingReason::VideoUnavailable);
    }

    if lower.contains("not available in your country") || lower.contains("blocked in your country") {
        return Some(BlockingReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit") {
        return Some(BlockingReason::RateLimited);
    }

    if lower.contains("confirm you're not a bot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return Some(BlockingReason::BotDetection);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(BlockingReason::Http403Forbidden);
    }

    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection refused") {
        return Some(BlockingReason::NetworkTimeout);
    }

    Some(BlockingReason::Unknown)
}

/// One-line summary of tool stderr: the reason plus the first ERROR line
pub fn summarize(stderr: &str) -> String {
    let detail = stderr
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| stderr.lines().map(str::trim).rev().find(|l| !l.is_empty()))
        .unwrap_or("no output");

    let reason = match diagnose_error(stderr) {
        Some(BlockingReason::Unknown) | None => return detail.to_string(),
        Some(reason) => reason,
    };

    let label = if reason.is_transient() {
        format!("{} (temporary)", reason.description())
    } else {
        reason.description().to_string()
    };
    match reason.hint() {
        Some(hint) => format!("{} | {} {}", label, detail, hint),
        None => format!("{} | {}", label, detail),
    }
}
