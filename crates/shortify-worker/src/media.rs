//! Media collaborators used by the pipeline.
//!
//! The orchestrator talks to the downloader and the transcoder through these
//! traits so it can be driven by in-memory doubles.

use async_trait::async_trait;
use bytes::Bytes;

use shortify_media::{AudioChunk, Downloader, MediaResult, Transcoder};
use shortify_models::Layout;

/// Fetches remote sources.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the full video, reporting 0-100 progress.
    async fn download_video(
        &self,
        url: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> MediaResult<Bytes>;

    /// Download only what is needed for the audio track.
    async fn download_audio(&self, url: &str) -> MediaResult<Bytes>;
}

/// Byte-buffer transcoding.
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    async fn extract_audio(&self, video: Bytes) -> MediaResult<Bytes>;

    async fn split_audio(&self, audio: Bytes, chunk_seconds: f64) -> MediaResult<Vec<AudioChunk>>;

    async fn slice_audio(&self, audio: Bytes, seconds: f64) -> MediaResult<Bytes>;

    async fn cut_segment(
        &self,
        video: Bytes,
        start: f64,
        duration: f64,
        layout: Layout,
    ) -> MediaResult<Bytes>;
}

#[async_trait]
impl MediaFetcher for Downloader {
    async fn download_video(
        &self,
        url: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> MediaResult<Bytes> {
        Downloader::download_video(self, url, on_progress).await
    }

    async fn download_audio(&self, url: &str) -> MediaResult<Bytes> {
        Downloader::download_audio(self, url).await
    }
}

#[async_trait]
impl MediaProcessor for Transcoder {
    async fn extract_audio(&self, video: Bytes) -> MediaResult<Bytes> {
        Transcoder::extract_audio(self, &video).await
    }

    async fn split_audio(&self, audio: Bytes, chunk_seconds: f64) -> MediaResult<Vec<AudioChunk>> {
        Transcoder::split_audio(self, &audio, chunk_seconds).await
    }

    async fn slice_audio(&self, audio: Bytes, seconds: f64) -> MediaResult<Bytes> {
        Transcoder::slice_audio(self, &audio, seconds).await
    }

    async fn cut_segment(
        &self,
        video: Bytes,
        start: f64,
        duration: f64,
        layout: Layout,
    ) -> MediaResult<Bytes> {
        Transcoder::cut_segment(self, &video, start, duration, layout).await
    }
}
