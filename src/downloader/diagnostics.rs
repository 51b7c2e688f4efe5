// Failure diagnostics - classifies yt-dlp stderr
//
// Decides whether a failed tier was an upstream anti-automation rejection
// (worth telling the caller to retry later) or an ordinary failure.

use serde::Serialize;

/// Why upstream refused or failed a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingReason {
    /// "Sign in to confirm you're not a bot" and friends
    BotDetection,

    /// HTTP 429 / too many requests
    RateLimited,

    /// HTTP 403 Forbidden
    Forbidden,

    AgeRestricted,

    GeoBlocked,

    PrivateVideo,

    /// Deleted, removed, or otherwise gone
    VideoUnavailable,

    /// Socket timeout or connection failure
    NetworkTimeout,

    Unknown,
}

impl BlockingReason {
    /// Anti-automation responses; these usually clear up on their own
    pub fn is_upstream_rejection(&self) -> bool {
        matches!(self, Self::BotDetection | Self::RateLimited | Self::Forbidden)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::BotDetection => "Bot detection triggered",
            Self::RateLimited => "Rate limited by upstream",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::PrivateVideo => "Private video",
            Self::VideoUnavailable => "Video unavailable",
            Self::NetworkTimeout => "Network timeout",
            Self::Unknown => "Unknown failure",
        }
    }
}

/// Classify stderr text from a failed attempt.
pub fn diagnose(stderr: &str) -> BlockingReason {
    // Normalise typographic apostrophes so "you’re" matches "you're"
    let lower = stderr.to_lowercase().replace('\u{2019}', "'");

    if lower.contains("confirm you're not a bot")
        || lower.contains("not a robot")
        || lower.contains("captcha")
        || lower.contains("unusual traffic")
    {
        return BlockingReason::BotDetection;
    }

    if lower.contains("http error 429")
        || lower.contains("too many requests")
        || lower.contains("rate limit")
    {
        return BlockingReason::RateLimited;
    }

    if lower.contains("sign in to confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("age restricted")
    {
        return BlockingReason::AgeRestricted;
    }

    if lower.contains("private video") || lower.contains("video is private") {
        return BlockingReason::PrivateVideo;
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restricted")
        || lower.contains("geo-restricted")
    {
        return BlockingReason::GeoBlocked;
    }

    if lower.contains("video unavailable")
        || lower.contains("video has been removed")
        || lower.contains("no longer available")
    {
        return BlockingReason::VideoUnavailable;
    }

    if lower.contains("http error 403") || lower.contains("403: forbidden") {
        return BlockingReason::Forbidden;
    }

    if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network is unreachable")
    {
        return BlockingReason::NetworkTimeout;
    }

    BlockingReason::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_marker_is_rejection() {
        let stderr = "ERROR: [youtube] abc123: Sign in to confirm you're not a bot. Use --cookies-from-browser";
        let reason = diagnose(stderr);
        assert_eq!(reason, BlockingReason::BotDetection);
        assert!(reason.is_upstream_rejection());
    }

    #[test]
    fn typographic_apostrophe_matches() {
        let stderr = "ERROR: Sign in to confirm you\u{2019}re not a bot";
        assert_eq!(diagnose(stderr), BlockingReason::BotDetection);
    }

    #[test]
    fn rate_limit_and_forbidden_are_rejections() {
        assert_eq!(diagnose("ERROR: HTTP Error 429: Too Many Requests"), BlockingReason::RateLimited);
        assert_eq!(diagnose("ERROR: unable to download video data: HTTP Error 403: Forbidden"), BlockingReason::Forbidden);
        assert!(BlockingReason::Forbidden.is_upstream_rejection());
    }

    #[test]
    fn ordinary_failures_are_not_rejections() {
        for stderr in [
            "ERROR: [youtube] abc: Video unavailable",
            "ERROR: [youtube] abc: Private video. Sign in if you've been granted access",
            "ERROR: Requested format is not available",
            "Timed out after 30s",
            "",
        ] {
            assert!(!diagnose(stderr).is_upstream_rejection(), "{stderr}");
        }
    }

    #[test]
    fn age_gate_is_not_bot_detection() {
        assert_eq!(diagnose("Sign in to confirm your age"), BlockingReason::AgeRestricted);
    }

    #[test]
    fn descriptions_are_human_readable() {
        assert_eq!(BlockingReason::Forbidden.description(), "Access denied (HTTP 403)");
        assert_eq!(diagnose("ERROR: Private video").description(), "Private video");
    }
}
