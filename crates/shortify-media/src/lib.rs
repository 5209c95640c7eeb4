//! FFmpeg and yt-dlp wrappers for the Shortify pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with a wall-clock timeout
//! - Byte-buffer transcoding (audio extraction, segment cutting, chunking)
//! - Remote video download with progress reporting
//! - Caption track retrieval and WebVTT parsing

pub mod captions;
pub mod command;
pub mod download;
pub mod error;
pub mod filters;
pub mod probe;
pub mod progress;
pub mod scratch;
pub mod transcode;

pub use captions::{fetch_captions, parse_vtt};
pub use command::{check_ffmpeg, check_ffprobe, check_ytdlp, FfmpegCommand, FfmpegRunner, DEFAULT_PROCESS_TIMEOUT};
pub use download::{Downloader, DownloaderConfig};
pub use error::{MediaError, MediaResult};
pub use probe::{probe_duration, probe_media, MediaInfo};
pub use progress::FfmpegProgress;
pub use transcode::{AudioChunk, Transcoder, DEFAULT_CHUNK_SECONDS};
