//! Remote video download into memory.
//!
//! YouTube references go through yt-dlp (progress parsed from its
//! `--newline` output). Any other http(s) URL is streamed with reqwest and
//! progress is derived from `Content-Length`.

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use shortify_models::is_youtube_reference;

use crate::command::check_ytdlp;
use crate::error::{MediaError, MediaResult};
use crate::progress::parse_ytdlp_percent;
use crate::scratch::ScratchDir;

/// Default upper bound for a downloaded source.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Default wall-clock limit for one download.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

const VIDEO_FORMAT: &str = "bestvideo[ext=mp4][height<=1080]+bestaudio[ext=m4a]/best[ext=mp4]/best";
const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio/best";

/// Download settings.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub max_bytes: u64,
    pub timeout: Duration,
    /// Netscape cookies file handed to yt-dlp
    pub cookies_path: Option<PathBuf>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            cookies_path: None,
        }
    }
}

impl DownloaderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_bytes: std::env::var("MAX_DOWNLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_bytes),
            timeout: std::env::var("DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            cookies_path: std::env::var("YTDLP_COOKIES_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .filter(|p| p.exists()),
        }
    }
}

/// Fetches remote media into byte buffers.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: reqwest::Client,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(config: DownloaderConfig) -> MediaResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shortify-media/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    /// Download the full video, reporting progress as a 0-100 percentage.
    pub async fn download_video(
        &self,
        url: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> MediaResult<Bytes> {
        let bytes = if is_youtube_reference(url) {
            self.ytdlp(url, VIDEO_FORMAT, on_progress).await?
        } else {
            self.http_stream(url, on_progress).await?
        };
        on_progress(100);
        Ok(bytes)
    }

    /// Download just enough to get the audio track.
    ///
    /// For plain HTTP sources this is the whole file.
    pub async fn download_audio(&self, url: &str) -> MediaResult<Bytes> {
        if is_youtube_reference(url) {
            self.ytdlp(url, AUDIO_FORMAT, &|_| {}).await
        } else {
            self.http_stream(url, &|_| {}).await
        }
    }

    async fn http_stream(&self, url: &str, on_progress: &(dyn Fn(u8) + Send + Sync)) -> MediaResult<Bytes> {
        let parsed = url::Url::parse(url)
            .map_err(|e| MediaError::download_failed(format!("invalid URL {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MediaError::download_failed(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }

        info!(url = %url, "Streaming video over HTTP");

        let fetch = async {
            let response = self.http.get(parsed).send().await?.error_for_status()?;
            let total = response.content_length();
            if let Some(total) = total {
                if total > self.config.max_bytes {
                    return Err(MediaError::TooLarge(self.config.max_bytes));
                }
            }

            let mut buffer = BytesMut::with_capacity(total.unwrap_or(0).min(self.config.max_bytes) as usize);
            let mut stream = response.bytes_stream();
            let mut last_reported = 0u8;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                if (buffer.len() + chunk.len()) as u64 > self.config.max_bytes {
                    return Err(MediaError::TooLarge(self.config.max_bytes));
                }
                buffer.extend_from_slice(&chunk);

                if let Some(total) = total.filter(|t| *t > 0) {
                    let percent = ((buffer.len() as u64 * 100) / total).min(99) as u8;
                    if percent > last_reported {
                        last_reported = percent;
                        on_progress(percent);
                    }
                }
            }

            Ok::<Bytes, MediaError>(buffer.freeze())
        };

        let bytes = tokio::time::timeout(self.config.timeout, fetch)
            .await
            .map_err(|_| MediaError::Timeout(self.config.timeout.as_secs()))??;

        if bytes.is_empty() {
            return Err(MediaError::download_failed("empty response body"));
        }
        Ok(bytes)
    }

    async fn ytdlp(
        &self,
        url: &str,
        format: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> MediaResult<Bytes> {
        check_ytdlp()?;

        let scratch = ScratchDir::new()?;
        let template = scratch.file("download.%(ext)s");

        let mut args = vec![
            "--newline".to_string(),
            "--no-playlist".to_string(),
            "--no-part".to_string(),
            "-f".to_string(),
            format.to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
        ];
        if let Some(cookies) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }
        args.push(url.to_string());

        info!(url = %url, format, "Downloading with yt-dlp");

        let mut child = Command::new("yt-dlp")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::download_failed("yt-dlp stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::download_failed("yt-dlp stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let run = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut last_reported = 0u8;
            while let Some(line) = lines.next_line().await? {
                if let Some(percent) = parse_ytdlp_percent(&line) {
                    // yt-dlp restarts at 0% for the audio stream of a merged
                    // download; only forward progress.
                    let percent = (percent as u8).min(99);
                    if percent > last_reported {
                        last_reported = percent;
                        on_progress(percent);
                    }
                }
            }
            child.wait().await.map_err(MediaError::from)
        };

        let status = match tokio::time::timeout(self.config.timeout, run).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(url = %url, "yt-dlp timed out");
                stderr_task.abort();
                return Err(MediaError::Timeout(self.config.timeout.as_secs()));
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            debug!("yt-dlp stderr: {}", stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("unknown error");
            return Err(MediaError::download_failed(format!("yt-dlp failed: {reason}")));
        }

        let path = find_download(scratch.path())
            .await?
            .ok_or_else(|| MediaError::download_failed("yt-dlp produced no file"))?;

        let size = tokio::fs::metadata(&path).await?.len();
        if size > self.config.max_bytes {
            return Err(MediaError::TooLarge(self.config.max_bytes));
        }

        let bytes = scratch.read_output(&path).await?;
        info!(
            url = %url,
            size_mb = bytes.len() as f64 / (1024.0 * 1024.0),
            "Downloaded video successfully"
        );
        Ok(Bytes::from(bytes))
    }
}

async fn find_download(dir: &Path) -> MediaResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("download.") && !name.ends_with(".part") && !name.ends_with(".ytdl") {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}
