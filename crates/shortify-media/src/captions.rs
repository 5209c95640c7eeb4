//! Published captions via yt-dlp.

use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use shortify_models::TranscriptEntry;

use crate::command::{check_ytdlp, run_tool};
use crate::error::{MediaError, MediaResult};
use crate::scratch::ScratchDir;

const CAPTIONS_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetch manual or automatic captions for a video ID in `lang`.
///
/// `lang` may be a locale (`en-US`); only the primary subtag is used to pick
/// the caption track.
pub async fn fetch_captions(video_id: &str, lang: &str) -> MediaResult<Vec<TranscriptEntry>> {
    check_ytdlp()?;

    let scratch = ScratchDir::new()?;
    let primary = lang.split(['-', '_']).next().unwrap_or("en").to_lowercase();
    let url = format!("https://www.youtube.com/watch?v={video_id}");

    let args = vec![
        "--skip-download".to_string(),
        "--write-subs".to_string(),
        "--write-auto-subs".to_string(),
        "--sub-langs".to_string(),
        format!("{primary}.*,{primary}"),
        "--sub-format".to_string(),
        "vtt".to_string(),
        "-o".to_string(),
        scratch.file("captions").to_string_lossy().to_string(),
        url,
    ];

    info!(video_id, lang = %primary, "Fetching captions");
    let output = run_tool("yt-dlp", &args, CAPTIONS_TIMEOUT).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::captions_unavailable(format!(
            "yt-dlp failed: {}",
            stderr.lines().last().unwrap_or("unknown error")
        )));
    }

    let vtt = read_first_vtt(scratch.path())
        .await?
        .ok_or_else(|| MediaError::captions_unavailable("video has no captions"))?;

    let entries = parse_vtt(&vtt);
    if entries.is_empty() {
        return Err(MediaError::captions_unavailable("caption track is empty"));
    }
    debug!(video_id, entries = entries.len(), "Parsed captions");
    Ok(entries)
}

async fn read_first_vtt(dir: &Path) -> MediaResult<Option<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().and_then(|e| e.to_str()) == Some("vtt") {
            candidates.push(entry.path());
        }
    }
    // Manual tracks sort before "-orig" auto tracks.
    candidates.sort();

    match candidates.first() {
        Some(path) => Ok(Some(tokio::fs::read_to_string(path).await?)),
        None => Ok(None),
    }
}

/// Parse WebVTT into transcript entries.
///
/// Automatic captions repeat the previous line at the top of every cue
/// ("rolling" captions); repeated lines are dropped so each spoken line
/// appears once, timed by the cue that introduced it.
pub fn parse_vtt(content: &str) -> Vec<TranscriptEntry> {
    let mut entries = Vec::new();
    let mut last_line = String::new();
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        let Some((start, end)) = parse_cue_timing(line) else {
            continue;
        };

        let mut fresh = Vec::new();
        while let Some(text) = lines.peek() {
            if text.trim().is_empty() {
                break;
            }
            let cleaned = strip_tags(text);
            lines.next();
            if cleaned.is_empty() || cleaned == last_line {
                continue;
            }
            last_line = cleaned.clone();
            fresh.push(cleaned);
        }

        if !fresh.is_empty() {
            entries.push(TranscriptEntry::new(
                fresh.join(" "),
                start,
                (end - start).max(0.0),
            ));
        }
    }

    entries
}

fn parse_cue_timing(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim()).ok()?, parse_timestamp(end).ok()?))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm` to seconds.
pub fn parse_timestamp(ts: &str) -> MediaResult<f64> {
    let invalid = || MediaError::InvalidTimestamp(ts.to_string());
    let parts: Vec<&str> = ts.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err(invalid()),
    };

    let hours: f64 = hours.parse().map_err(|_| invalid())?;
    let minutes: f64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        assert!((parse_timestamp("00:00:00.000").unwrap()).abs() < 0.001);
        assert!((parse_timestamp("00:01:00.000").unwrap() - 60.0).abs() < 0.001);
        assert!((parse_timestamp("01:00:00.000").unwrap() - 3600.0).abs() < 0.001);
        assert!((parse_timestamp("02:30.500").unwrap() - 150.5).abs() < 0.001);
        assert!(parse_timestamp("bogus").is_err());
    }

    #[test]
    fn test_parse_manual_vtt() {
        let vtt = "WEBVTT\n\n1\n00:00:01.000 --> 00:00:04.000\nHello <b>world</b>\n\n2\n00:00:04.000 --> 00:00:06.500\nSecond line\n";
        let entries = parse_vtt(vtt);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Hello world");
        assert!((entries[0].start - 1.0).abs() < 0.001);
        assert!((entries[0].duration - 3.0).abs() < 0.001);
        assert!((entries[1].duration - 2.5).abs() < 0.001);
    }

    #[test]
    fn test_rolling_auto_captions_are_deduplicated() {
        let vtt = "WEBVTT\nKind: captions\n\n\
00:00:00.160 --> 00:00:02.310 align:start position:0%\n\
so<00:00:00.400><c> today</c><00:00:00.800><c> we</c>\n\n\
00:00:02.310 --> 00:00:02.320 align:start position:0%\n\
so today we\n \n\n\
00:00:02.320 --> 00:00:05.000 align:start position:0%\n\
so today we\nare talking about rust\n";

        let entries = parse_vtt(vtt);
        let texts: Vec<_> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["so today we", "are talking about rust"]);
        assert!((entries[1].start - 2.32).abs() < 0.001);
    }

    #[test]
    fn test_strip_tags_and_entities() {
        assert_eq!(strip_tags("<c.colorE5E5E5>Tom &amp; Jerry</c>"), "Tom & Jerry");
    }
}
