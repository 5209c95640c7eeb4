//! Progress parsing for FFmpeg and yt-dlp output.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg's `-progress pipe:2` stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Calculate progress percentage given total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Fold one `key=value` progress line into `current`.
///
/// Returns a snapshot when a `progress=` line closes a block.
pub(crate) fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        // Despite the name, FFmpeg reports microseconds here too.
        "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            current.is_complete = value == "end";
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Whether a stderr line is part of the progress stream rather than a diagnostic.
pub(crate) fn is_progress_line(line: &str) -> bool {
    matches!(
        line.split_once('=').map(|(k, _)| k),
        Some(
            "frame" | "fps" | "stream_0_0_q" | "bitrate" | "total_size" | "out_time_us"
                | "out_time_ms" | "out_time" | "dup_frames" | "drop_frames" | "speed"
                | "progress"
        )
    )
}

/// Parse a yt-dlp `--newline` progress line such as
/// `[download]  42.3% of ~ 10.00MiB at  1.00MiB/s ETA 00:05`.
pub fn parse_ytdlp_percent(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("[download]")?;
    let token = rest.split_whitespace().next()?;
    let value: f64 = token.strip_suffix('%')?.parse().ok()?;
    Some(value.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_block() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("out_time_us=5000000", &mut progress).is_none());
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let snapshot = parse_progress_line("progress=end", &mut progress).unwrap();
        assert!(snapshot.is_complete);
        assert!((snapshot.percentage(10_000) - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_progress_line_classification() {
        assert!(is_progress_line("frame=120"));
        assert!(is_progress_line("progress=continue"));
        assert!(!is_progress_line("[h264 @ 0x55] Invalid NAL unit size"));
    }

    #[test]
    fn test_ytdlp_percent() {
        assert_eq!(
            parse_ytdlp_percent("[download]  42.3% of ~ 10.00MiB at 1.00MiB/s ETA 00:05"),
            Some(42.3)
        );
        assert_eq!(parse_ytdlp_percent("[download] 100% of 10.00MiB"), Some(100.0));
        assert_eq!(parse_ytdlp_percent("[download] Destination: out.mp4"), None);
        assert_eq!(parse_ytdlp_percent("[info] Downloading format"), None);
    }
}
