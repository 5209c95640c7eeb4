//! Object key layout.
//!
//! ```text
//! temp/{job_id}/source.{ext}               raw source, deleted at settlement
//! shorts/{owner}/{job_id}/short-{n}.mp4    published shorts, n is 1-based
//! ```

use shortify_models::JobId;

pub const SHORT_CONTENT_TYPE: &str = "video/mp4";

/// Key for the raw source of a job.
pub fn temp_source_key(job_id: &JobId, extension: &str) -> String {
    format!("temp/{}/source.{}", sanitize(job_id.as_str()), sanitize(extension))
}

/// Key for the `number`-th short of a job.
pub fn short_key(owner: &str, job_id: &JobId, number: usize) -> String {
    format!(
        "shorts/{}/{}/short-{}.mp4",
        sanitize(owner),
        sanitize(job_id.as_str()),
        number
    )
}

/// Content type for a source file extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        _ => "application/octet-stream",
    }
}

/// Keep keys to a safe character set so owner IDs cannot escape their prefix.
fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
