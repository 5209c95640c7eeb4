//! Byte-buffer transcoding operations.
//!
//! Every operation takes the source as an in-memory buffer, writes it into a
//! private scratch directory, runs FFmpeg and reads the result back. Nothing
//! survives the call on disk.
//!
//! Segment cutting runs in two stages:
//! 1. trim everything after the segment end with stream copy into an
//!    intermediate file
//! 2. seek to the segment start and re-encode through the layout filter with
//!    regenerated timestamps, so the short starts exactly at `start` and its
//!    first frame is at zero
//!
//! Stream copy can only cut on keyframes, so the head is never trimmed in
//! stage 1; the decoder-side seek in stage 2 is frame accurate.

use bytes::Bytes;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use shortify_models::encoding::SPEECH_SAMPLE_RATE;
use shortify_models::{EncodingConfig, Layout};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::layout_filter;
use crate::probe::probe_media;
use crate::scratch::ScratchDir;

/// Default chunk length for speech recognition.
pub const DEFAULT_CHUNK_SECONDS: f64 = 60.0;

/// Audio container produced by [`Transcoder::extract_audio`].
pub const SPEECH_AUDIO_FORMAT: &str = "flac";

/// One piece of a longer audio track.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Position of the chunk (0-based)
    pub index: usize,
    /// Offset of the chunk start within the full track (seconds)
    pub start: f64,
    pub bytes: Bytes,
}

/// FFmpeg-backed transcoder operating on byte buffers.
#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    runner: FfmpegRunner,
    encoding: EncodingConfig,
}

impl Transcoder {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self {
            runner: FfmpegRunner::new(),
            encoding,
        }
    }

    /// Override the per-process timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// Demux the audio track into mono 16 kHz FLAC.
    pub async fn extract_audio(&self, video: &[u8]) -> MediaResult<Bytes> {
        if video.is_empty() {
            return Err(MediaError::invalid_argument("empty input"));
        }

        let scratch = ScratchDir::new()?;
        let input = scratch.write("source", video).await?;
        let output = scratch.file(&format!("audio.{SPEECH_AUDIO_FORMAT}"));

        let cmd = FfmpegCommand::new(&input, &output)
            .no_video()
            .mono_audio(SPEECH_SAMPLE_RATE)
            .audio_codec(SPEECH_AUDIO_FORMAT);
        self.runner.run(&cmd).await?;

        let audio = scratch.read_output(&output).await?;
        debug!(input_bytes = video.len(), audio_bytes = audio.len(), "Extracted audio");
        Ok(Bytes::from(audio))
    }

    /// Cut `[start, start + duration)` out of `video` and render it onto the
    /// 1080x1920 canvas using `layout`.
    pub async fn cut_segment(
        &self,
        video: &[u8],
        start: f64,
        duration: f64,
        layout: Layout,
    ) -> MediaResult<Bytes> {
        validate_range(start, duration)?;
        if video.is_empty() {
            return Err(MediaError::invalid_argument("empty input"));
        }

        let scratch = ScratchDir::new()?;
        let input = scratch.write("source", video).await?;
        let trimmed = scratch.file("trimmed.mp4");
        let output = scratch.file("short.mp4");

        info!(
            start_secs = start,
            duration_secs = duration,
            layout = %layout,
            "Cutting segment"
        );

        self.runner.run(&trim_command(&input, &trimmed, start, duration)).await?;
        scratch.read_output(&trimmed).await?;

        let available = probe_media(&trimmed).await?.duration;
        if available > 0.0 && start >= available {
            return Err(MediaError::EmptyOutput(format!(
                "segment starts at {start:.3}s but the source ends at {available:.3}s"
            )));
        }

        let render = render_command(&trimmed, &output, start, duration, layout, &self.encoding);
        self.runner.run(&render).await?;

        let clip = scratch.read_output(&output).await?;
        info!(clip_bytes = clip.len(), "Segment rendered");
        Ok(Bytes::from(clip))
    }

    /// First `seconds` of an audio buffer.
    pub async fn slice_audio(&self, audio: &[u8], seconds: f64) -> MediaResult<Bytes> {
        validate_range(0.0, seconds)?;

        let scratch = ScratchDir::new()?;
        let input = scratch.write(&format!("audio.{SPEECH_AUDIO_FORMAT}"), audio).await?;
        let output = scratch.file(&format!("head.{SPEECH_AUDIO_FORMAT}"));

        let cmd = FfmpegCommand::new(&input, &output)
            .duration(seconds)
            .codec_copy();
        self.runner.run(&cmd).await?;

        Ok(Bytes::from(scratch.read_output(&output).await?))
    }

    /// Split an audio buffer into consecutive chunks of at most `chunk_seconds`.
    pub async fn split_audio(&self, audio: &[u8], chunk_seconds: f64) -> MediaResult<Vec<AudioChunk>> {
        validate_range(0.0, chunk_seconds)?;

        let scratch = ScratchDir::new()?;
        let input = scratch.write(&format!("audio.{SPEECH_AUDIO_FORMAT}"), audio).await?;
        let total = probe_media(&input).await?.duration;

        let count = chunk_count(total, chunk_seconds);
        if count <= 1 {
            return Ok(vec![AudioChunk {
                index: 0,
                start: 0.0,
                bytes: Bytes::copy_from_slice(audio),
            }]);
        }

        let mut chunks = Vec::with_capacity(count);
        for index in 0..count {
            let start = index as f64 * chunk_seconds;
            let output = scratch.file(&format!("chunk-{index:04}.{SPEECH_AUDIO_FORMAT}"));
            let cmd = FfmpegCommand::new(&input, &output)
                .seek(start)
                .duration(chunk_seconds)
                .codec_copy();
            self.runner.run(&cmd).await?;

            chunks.push(AudioChunk {
                index,
                start,
                bytes: Bytes::from(scratch.read_output(&output).await?),
            });
        }

        debug!(total_secs = total, chunks = chunks.len(), "Split audio");
        Ok(chunks)
    }
}

/// Stage 1: drop everything after `start + duration` without re-encoding.
fn trim_command(input: &Path, trimmed: &Path, start: f64, duration: f64) -> FfmpegCommand {
    FfmpegCommand::new(input, trimmed)
        .duration(start + duration)
        .generate_pts()
        .codec_copy()
        .reset_timestamps()
}

/// Stage 2: seek to `start` while decoding and render onto the canvas.
fn render_command(
    trimmed: &Path,
    output: &Path,
    start: f64,
    duration: f64,
    layout: Layout,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(trimmed, output)
        .seek(start)
        .duration(duration)
        .generate_pts()
        .video_filter(layout_filter(layout))
        .output_args(encoding.to_ffmpeg_args())
}

fn validate_range(start: f64, duration: f64) -> MediaResult<()> {
    if !start.is_finite() || start < 0.0 {
        return Err(MediaError::invalid_argument(format!("invalid start {start}")));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaError::invalid_argument(format!(
            "invalid duration {duration}"
        )));
    }
    Ok(())
}

/// Number of chunks needed to cover `total` seconds.
fn chunk_count(total: f64, chunk_seconds: f64) -> usize {
    if total <= 0.0 {
        return 1;
    }
    (total / chunk_seconds).ceil().max(1.0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0.0, 60.0), 1);
        assert_eq!(chunk_count(59.9, 60.0), 1);
        assert_eq!(chunk_count(60.0, 60.0), 1);
        assert_eq!(chunk_count(60.1, 60.0), 2);
        assert_eq!(chunk_count(185.0, 60.0), 4);
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0.0, 30.0).is_ok());
        assert!(validate_range(-1.0, 30.0).is_err());
        assert!(validate_range(10.0, 0.0).is_err());
        assert!(validate_range(f64::NAN, 5.0).is_err());
    }

    #[tokio::test]
    async fn test_cut_rejects_zero_duration_before_running() {
        let transcoder = Transcoder::default();
        let err = transcoder
            .cut_segment(b"not a video", 5.0, 0.0, Layout::Auto)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidArgument(_)));
        assert!(err.is_transcode_failure());
    }

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|a| a == flag)
    }

    #[test]
    fn test_trim_stage_keeps_the_head() {
        let args = trim_command(Path::new("in.mp4"), Path::new("trimmed.mp4"), 30.0, 28.0).build_args();
        assert!(position(&args, "-ss").is_none());
        let t = position(&args, "-t").unwrap();
        assert_eq!(args[t + 1], "58.000");
        assert!(t < position(&args, "-i").unwrap());
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    }

    #[test]
    fn test_render_stage_seeks_while_encoding() {
        let args = render_command(
            Path::new("trimmed.mp4"),
            Path::new("short.mp4"),
            30.0,
            28.0,
            Layout::Fit,
            &EncodingConfig::default(),
        )
        .build_args();

        let input = position(&args, "-i").unwrap();
        let seek = position(&args, "-ss").unwrap();
        assert!(seek < input);
        assert_eq!(args[seek + 1], "30.000");
        assert_eq!(args[position(&args, "-t").unwrap() + 1], "28.000");
        assert!(position(&args, "-vf").unwrap() > input);
        assert!(!args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
    }

    /// Red for the first 25 s, blue after, keyframes only every 10 s.
    async fn synthetic_source(dir: &Path) -> Option<Vec<u8>> {
        let path = dir.join("source.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args([
                "-y", "-v", "error",
                "-f", "lavfi", "-i", "color=c=red:s=320x240:r=25:d=25",
                "-f", "lavfi", "-i", "color=c=blue:s=320x240:r=25:d=15",
                "-f", "lavfi", "-i", "sine=frequency=440:duration=40",
                "-filter_complex", "[0:v][1:v]concat=n=2:v=1:a=0[v]",
                "-map", "[v]", "-map", "2:a",
                "-c:v", "libx264", "-g", "250", "-keyint_min", "250", "-sc_threshold", "0",
                "-pix_fmt", "yuv420p", "-c:a", "aac",
            ])
            .arg(&path)
            .status()
            .await
            .ok()?;
        if !status.success() {
            return None;
        }
        tokio::fs::read(&path).await.ok()
    }

    /// RGB of the center pixel of the first frame.
    async fn first_frame_center(path: &Path) -> Vec<u8> {
        let output = tokio::process::Command::new("ffmpeg")
            .args(["-v", "error", "-i"])
            .arg(path)
            .args([
                "-frames:v", "1",
                "-vf", "crop=2:2:iw/2:ih/2,scale=1:1",
                "-f", "rawvideo", "-pix_fmt", "rgb24", "-",
            ])
            .output()
            .await
            .unwrap();
        output.stdout
    }

    #[tokio::test]
    async fn test_cut_segment_starts_at_requested_offset() {
        if which::which("ffmpeg").is_err() || which::which("ffprobe").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let Some(source) = synthetic_source(dir.path()).await else {
            return;
        };

        // The nearest keyframe before 27 s is at 20 s, inside the red part.
        let clip = Transcoder::default()
            .cut_segment(&source, 27.0, 4.0, Layout::Fit)
            .await
            .unwrap();
        let clip_path = dir.path().join("short.mp4");
        tokio::fs::write(&clip_path, &clip).await.unwrap();

        let info = probe_media(&clip_path).await.unwrap();
        assert!((info.duration - 4.0).abs() < 0.5, "duration {}", info.duration);

        let pixel = first_frame_center(&clip_path).await;
        assert_eq!(pixel.len(), 3);
        assert!(pixel[2] > pixel[0], "first frame is not blue: {pixel:?}");
    }

    #[tokio::test]
    async fn test_cut_past_the_end_is_empty_output() {
        if which::which("ffmpeg").is_err() || which::which("ffprobe").is_err() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let Some(source) = synthetic_source(dir.path()).await else {
            return;
        };

        let err = Transcoder::default()
            .cut_segment(&source, 120.0, 4.0, Layout::Fit)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::EmptyOutput(_)), "{err}");
    }

    #[tokio::test]
    async fn test_extract_audio_rejects_empty_input() {
        let err = Transcoder::default().extract_audio(&[]).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidArgument(_)));
    }
}
