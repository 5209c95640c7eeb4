//! Input validation for submitted sources.
//!
//! Remote URLs are handed to the downloader, so anything pointing at
//! loopback, private ranges or cloud metadata endpoints is rejected here.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

use shortify_models::normalize_video_reference;

/// Maximum URL length.
const MAX_URL_LENGTH: usize = 2048;

/// Maximum stored length of an uploaded file name.
const MAX_FILENAME_LENGTH: usize = 255;

static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://127\.",
        r"^https?://0\.0\.0\.0",
        r"^https?://localhost",
        r"^https?://10\.",
        r"^https?://172\.(1[6-9]|2[0-9]|3[0-1])\.",
        r"^https?://192\.168\.",
        r"^https?://169\.254\.",
        r"^https?://\[::1\]",
        r"^https?://\[fd",
        r"^https?://\[fe80",
        r"^https?://metadata\.",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Result of URL validation.
#[derive(Debug, PartialEq, Eq)]
pub enum UrlValidationResult {
    Valid(String),
    /// Malformed or unsupported protocol.
    Invalid(String),
    /// Targets an internal or restricted endpoint.
    Blocked(String),
    TooLong,
}

impl UrlValidationResult {
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Valid(url) => Ok(url),
            Self::Invalid(msg) | Self::Blocked(msg) => Err(msg),
            Self::TooLong => Err(format!("URL exceeds maximum length of {} characters", MAX_URL_LENGTH)),
        }
    }
}

/// Validate a remote video URL.
///
/// A bare video ID is accepted and expanded to its watch URL.
pub fn validate_video_url(url: &str) -> UrlValidationResult {
    if url.len() > MAX_URL_LENGTH {
        return UrlValidationResult::TooLong;
    }

    let url = normalize_video_reference(url);
    if url.is_empty() {
        return UrlValidationResult::Invalid("URL cannot be empty".to_string());
    }

    let parsed = match Url::parse(&url) {
        Ok(u) => u,
        Err(e) => return UrlValidationResult::Invalid(format!("Invalid URL format: {}", e)),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return UrlValidationResult::Invalid(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            ))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return UrlValidationResult::Invalid("URL must have a valid domain".to_string());
    }

    let lowered = url.to_lowercase();
    if BLOCKED_PATTERNS.iter().any(|pattern| pattern.is_match(&lowered)) {
        warn!(url = %url, "Blocked URL pattern detected");
        return UrlValidationResult::Blocked(
            "URL appears to target an internal or restricted endpoint".to_string(),
        );
    }

    UrlValidationResult::Valid(url)
}

/// Strip directories and control characters from an uploaded file name.
pub fn sanitize_filename(input: &str) -> String {
    let base = input.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_LENGTH)
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.mp4".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_are_accepted() {
        assert_eq!(
            validate_video_url(" https://www.youtube.com/watch?v=dQw4w9WgXcQ "),
            UrlValidationResult::Valid("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );
        assert!(matches!(
            validate_video_url("https://cdn.example.com/talk.mp4"),
            UrlValidationResult::Valid(_)
        ));
    }

    #[test]
    fn test_bare_video_id_becomes_watch_url() {
        assert_eq!(
            validate_video_url("dQw4w9WgXcQ"),
            UrlValidationResult::Valid("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string())
        );
        assert!(matches!(validate_video_url("not-an-id"), UrlValidationResult::Invalid(_)));
    }

    #[test]
    fn test_blocked_internal_hosts() {
        for url in [
            "http://127.0.0.1/video.mp4",
            "http://LOCALHOST:8080/video.mp4",
            "http://192.168.1.1/video.mp4",
            "http://169.254.169.254/latest/meta-data/",
            "http://metadata.google.internal/computeMetadata",
        ] {
            assert!(matches!(validate_video_url(url), UrlValidationResult::Blocked(_)), "{url}");
        }
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(validate_video_url(""), UrlValidationResult::Invalid(_)));
        assert!(matches!(validate_video_url("ftp://example.com/v"), UrlValidationResult::Invalid(_)));
        assert!(matches!(validate_video_url("javascript:alert(1)"), UrlValidationResult::Invalid(_)));
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert_eq!(validate_video_url(&long), UrlValidationResult::TooLong);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\talk.mov"), "talk.mov");
        assert_eq!(sanitize_filename(".hidden.mp4"), "hidden.mp4");
        assert_eq!(sanitize_filename(""), "upload.mp4");
    }
}
