//! Video reference normalization.

use thiserror::Error;
use url::Url;

/// Errors that can occur during video ID extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoIdError {
    #[error("not a YouTube video reference")]
    NotYoutube,
    #[error("video ID has invalid format")]
    InvalidVideoId,
    #[error("video ID not found in URL")]
    VideoIdNotFound,
}

/// Result type for video ID extraction.
pub type VideoIdResult<T> = Result<T, VideoIdError>;

/// Length of a YouTube video ID.
pub const VIDEO_ID_LEN: usize = 11;

/// Markers that precede the video ID, in lookup order.
const ID_MARKERS: &[&str] = &["?v=", "&v=", "youtu.be/", "/shorts/", "/embed/", "/v/"];

/// Hosts (and their subdomains) served by YouTube.
const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];

/// Normalize a video reference to its 11-character video ID.
///
/// Accepts a bare ID or any of:
/// - `https://www.youtube.com/watch?v=ID` (also with `&v=`)
/// - `https://youtu.be/ID`
/// - `https://youtube.com/shorts/ID`
/// - `https://youtube.com/embed/ID`
/// - `https://youtube.com/v/ID`
///
/// Query strings and fragments after the ID are ignored.
pub fn extract_video_id(reference: &str) -> VideoIdResult<String> {
    let reference = reference.trim();

    if is_valid_video_id(reference) {
        return Ok(reference.to_string());
    }

    if !is_youtube_reference(reference) {
        return Err(VideoIdError::NotYoutube);
    }

    let lower = reference.to_ascii_lowercase();
    for marker in ID_MARKERS {
        if let Some(pos) = lower.find(marker) {
            let rest = &reference[pos + marker.len()..];
            let end = rest.find(['&', '#', '?', '/']).unwrap_or(rest.len());
            let id = rest[..end].trim();
            if id.is_empty() {
                continue;
            }
            return if is_valid_video_id(id) {
                Ok(id.to_string())
            } else {
                Err(VideoIdError::InvalidVideoId)
            };
        }
    }

    Err(VideoIdError::VideoIdNotFound)
}

/// Whether the reference points at YouTube: a bare video ID, or a URL whose
/// host is a YouTube domain. Query strings and paths are not consulted.
pub fn is_youtube_reference(reference: &str) -> bool {
    let reference = reference.trim();
    if is_valid_video_id(reference) {
        return true;
    }

    let parsed = Url::parse(reference).or_else(|_| Url::parse(&format!("https://{reference}")));
    let Some(host) = parsed.ok().and_then(|u| u.host_str().map(str::to_ascii_lowercase)) else {
        return false;
    };
    YOUTUBE_HOSTS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Canonical watch URL for a video ID.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Expand a bare video ID into its watch URL. Anything else is returned
/// trimmed and otherwise untouched.
pub fn normalize_video_reference(reference: &str) -> String {
    let reference = reference.trim();
    if is_valid_video_id(reference) {
        watch_url(reference)
    } else {
        reference.to_string()
    }
}

fn is_valid_video_id(s: &str) -> bool {
    s.len() == VIDEO_ID_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
