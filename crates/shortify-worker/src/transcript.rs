//! Transcript acquisition.
//!
//! Published captions are tried first, keyed by the normalized video ID.
//! When that fails (or the source is an upload, which has no ID) the audio
//! track is split into fixed-length chunks and sent to the speech
//! recognizer; chunk results are shifted onto the source timeline and
//! concatenated in order.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use shortify_media::MediaResult;
use shortify_models::{extract_video_id, TranscriptEntry, VideoSource};

use crate::error::{PipelineError, PipelineResult};
use crate::media::{MediaFetcher, MediaProcessor};
use crate::speech::SpeechRecognizer;

/// Published captions lookup.
#[async_trait]
pub trait CaptionsSource: Send + Sync {
    async fn fetch(&self, video_id: &str, language: &str) -> MediaResult<Vec<TranscriptEntry>>;
}

/// Captions fetched with yt-dlp.
#[derive(Debug, Clone, Copy, Default)]
pub struct YtDlpCaptions;

#[async_trait]
impl CaptionsSource for YtDlpCaptions {
    async fn fetch(&self, video_id: &str, language: &str) -> MediaResult<Vec<TranscriptEntry>> {
        shortify_media::fetch_captions(video_id, language).await
    }
}

/// Captions-then-speech transcript service.
#[derive(Clone)]
pub struct TranscriptService {
    captions: Arc<dyn CaptionsSource>,
    speech: Arc<dyn SpeechRecognizer>,
    fetcher: Arc<dyn MediaFetcher>,
    media: Arc<dyn MediaProcessor>,
    chunk_seconds: f64,
}

impl TranscriptService {
    pub fn new(
        captions: Arc<dyn CaptionsSource>,
        speech: Arc<dyn SpeechRecognizer>,
        fetcher: Arc<dyn MediaFetcher>,
        media: Arc<dyn MediaProcessor>,
        chunk_seconds: f64,
    ) -> Self {
        Self {
            captions,
            speech,
            fetcher,
            media,
            chunk_seconds,
        }
    }

    /// Transcript for `source` in `language`.
    ///
    /// Fails with `TranscriptUnavailable` only when both paths fail or
    /// produce nothing.
    pub async fn get_transcript(
        &self,
        source: &VideoSource,
        language: &str,
    ) -> PipelineResult<Vec<TranscriptEntry>> {
        self.get_transcript_with(source, language, None).await
    }

    /// Same as [`get_transcript`](Self::get_transcript), but a remote source
    /// whose video is already in memory feeds the speech fallback from
    /// `video` instead of fetching its audio again.
    pub async fn get_transcript_with(
        &self,
        source: &VideoSource,
        language: &str,
        video: Option<Bytes>,
    ) -> PipelineResult<Vec<TranscriptEntry>> {
        let captions_failure = match self.captions_for(source, language).await {
            Ok(entries) => return Ok(entries),
            Err(reason) => reason,
        };
        debug!(reason = %captions_failure, "Captions unavailable, falling back to speech");

        match self.speech_transcript(source, language, video).await {
            Ok(entries) if !entries.is_empty() => {
                info!(entries = entries.len(), "Transcript recovered from speech");
                Ok(entries)
            }
            Ok(_) => Err(PipelineError::transcript_unavailable(format!(
                "{captions_failure}; speech recognition returned no text"
            ))),
            Err(e) => Err(PipelineError::transcript_unavailable(format!(
                "{captions_failure}; speech fallback failed: {e}"
            ))),
        }
    }

    async fn captions_for(&self, source: &VideoSource, language: &str) -> Result<Vec<TranscriptEntry>, String> {
        let url = source
            .url()
            .ok_or_else(|| "uploaded source has no captions".to_string())?;
        let video_id = extract_video_id(url).map_err(|e| format!("no captions lookup: {e}"))?;

        match self.captions.fetch(&video_id, language).await {
            Ok(entries) if !entries.is_empty() => {
                info!(video_id = %video_id, entries = entries.len(), "Using published captions");
                Ok(entries)
            }
            Ok(_) => Err("caption track is empty".to_string()),
            Err(e) => Err(format!("captions failed: {e}")),
        }
    }

    /// Audio track of `source` as speech-ready FLAC.
    pub(crate) async fn source_audio(&self, source: &VideoSource, video: Option<Bytes>) -> PipelineResult<Bytes> {
        let container = match (source, video) {
            (VideoSource::Upload { bytes, .. }, _) => bytes.clone(),
            (VideoSource::Remote { .. }, Some(video)) => video,
            (VideoSource::Remote { url }, None) => self
                .fetcher
                .download_audio(url)
                .await
                .map_err(|e| PipelineError::transcript_unavailable(format!("audio download failed: {e}")))?,
        };

        self.media
            .extract_audio(container)
            .await
            .map_err(|e| PipelineError::transcript_unavailable(format!("audio extraction failed: {e}")))
    }

    async fn speech_transcript(
        &self,
        source: &VideoSource,
        language: &str,
        video: Option<Bytes>,
    ) -> PipelineResult<Vec<TranscriptEntry>> {
        let audio = self.source_audio(source, video).await?;
        let chunks = self
            .media
            .split_audio(audio, self.chunk_seconds)
            .await
            .map_err(|e| PipelineError::transcript_unavailable(format!("audio split failed: {e}")))?;

        let total = chunks.len();
        let mut entries = Vec::new();
        let mut last_error = None;

        for chunk in chunks {
            let offset = chunk.index as f64 * self.chunk_seconds;
            match self.speech.recognize(chunk.bytes, language, &[]).await {
                Ok(recognized) => {
                    entries.extend(recognized.into_iter().map(|e| e.shifted(offset)));
                }
                Err(e) => {
                    warn!(chunk = chunk.index, total, error = %e, "Speech recognition failed for chunk");
                    last_error = Some(e);
                }
            }
        }

        match (entries.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(entries),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use shortify_media::{AudioChunk, MediaError};
    use shortify_models::Layout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) struct StaticCaptions(pub Option<Vec<TranscriptEntry>>);

    #[async_trait]
    impl CaptionsSource for StaticCaptions {
        async fn fetch(&self, _video_id: &str, _language: &str) -> MediaResult<Vec<TranscriptEntry>> {
            self.0
                .clone()
                .ok_or_else(|| MediaError::captions_unavailable("no captions"))
        }
    }

    /// Returns one entry per chunk; chunk audio carries its index.
    pub(crate) struct ChunkSpeech {
        pub fail: bool,
        pub calls: AtomicUsize,
        pub languages: Mutex<Vec<String>>,
    }

    impl ChunkSpeech {
        pub(crate) fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
                languages: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechRecognizer for ChunkSpeech {
        async fn recognize(
            &self,
            audio: Bytes,
            language: &str,
            _alternative_languages: &[&str],
        ) -> PipelineResult<Vec<TranscriptEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.languages.lock().unwrap().push(language.to_string());
            if self.fail {
                return Err(PipelineError::transcript_unavailable("speech down"));
            }
            let text = String::from_utf8_lossy(&audio).to_string();
            Ok(vec![TranscriptEntry::new(text, 2.0, 3.0)])
        }
    }

    /// Media double: audio is the source bytes, split into `chunks` pieces.
    pub(crate) struct FakeMedia {
        pub chunks: usize,
        pub failing_cut_start: Option<f64>,
    }

    #[async_trait]
    impl MediaProcessor for FakeMedia {
        async fn extract_audio(&self, video: Bytes) -> MediaResult<Bytes> {
            Ok(video)
        }

        async fn split_audio(&self, _audio: Bytes, chunk_seconds: f64) -> MediaResult<Vec<AudioChunk>> {
            Ok((0..self.chunks)
                .map(|index| AudioChunk {
                    index,
                    start: index as f64 * chunk_seconds,
                    bytes: Bytes::from(format!("chunk {index}")),
                })
                .collect())
        }

        async fn slice_audio(&self, audio: Bytes, _seconds: f64) -> MediaResult<Bytes> {
            Ok(audio)
        }

        async fn cut_segment(
            &self,
            _video: Bytes,
            start: f64,
            duration: f64,
            _layout: Layout,
        ) -> MediaResult<Bytes> {
            if Some(start) == self.failing_cut_start {
                return Err(MediaError::ffmpeg_failed("encoder crashed", None, Some(1)));
            }
            Ok(Bytes::from(format!("short {start}+{duration}")))
        }
    }

    pub(crate) struct FakeFetcher {
        pub fail: bool,
        pub audio_downloads: AtomicUsize,
    }

    impl FakeFetcher {
        pub(crate) fn new(fail: bool) -> Self {
            Self {
                fail,
                audio_downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn download_video(
            &self,
            _url: &str,
            on_progress: &(dyn Fn(u8) + Send + Sync),
        ) -> MediaResult<Bytes> {
            if self.fail {
                return Err(MediaError::download_failed("video unavailable"));
            }
            on_progress(40);
            on_progress(100);
            Ok(Bytes::from_static(b"remote video"))
        }

        async fn download_audio(&self, _url: &str) -> MediaResult<Bytes> {
            self.audio_downloads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MediaError::download_failed("video unavailable"));
            }
            Ok(Bytes::from_static(b"remote audio"))
        }
    }

    fn service(captions: Option<Vec<TranscriptEntry>>, speech: Arc<ChunkSpeech>, chunks: usize) -> TranscriptService {
        TranscriptService::new(
            Arc::new(StaticCaptions(captions)),
            speech,
            Arc::new(FakeFetcher::new(false)),
            Arc::new(FakeMedia {
                chunks,
                failing_cut_start: None,
            }),
            60.0,
        )
    }

    fn youtube() -> VideoSource {
        VideoSource::remote("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
    }

    #[tokio::test]
    async fn test_captions_are_preferred() {
        let speech = Arc::new(ChunkSpeech::new(false));
        let captions = vec![TranscriptEntry::new("hi", 0.0, 1.0)];
        let transcript = service(Some(captions.clone()), speech.clone(), 1)
            .get_transcript(&youtube(), "en-US")
            .await
            .unwrap();

        assert_eq!(transcript, captions);
        assert_eq!(speech.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_offsets_chunks() {
        let speech = Arc::new(ChunkSpeech::new(false));
        let transcript = service(None, speech.clone(), 3)
            .get_transcript(&youtube(), "hi-IN")
            .await
            .unwrap();

        let starts: Vec<f64> = transcript.iter().map(|e| e.start).collect();
        assert_eq!(starts, vec![2.0, 62.0, 122.0]);
        assert_eq!(transcript[2].text, "chunk 2");
        assert_eq!(speech.languages.lock().unwrap()[0], "hi-IN");
    }

    #[tokio::test]
    async fn test_upload_skips_captions() {
        let speech = Arc::new(ChunkSpeech::new(false));
        let source = VideoSource::upload("talk.mp4", None, Bytes::from_static(b"upload"));
        let transcript = service(Some(vec![TranscriptEntry::new("unused", 0.0, 1.0)]), speech.clone(), 1)
            .get_transcript(&source, "en-US")
            .await
            .unwrap();

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].text, "chunk 0");
        assert_eq!(speech.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_unavailable() {
        let speech = Arc::new(ChunkSpeech::new(true));
        let err = service(None, speech, 2)
            .get_transcript(&youtube(), "en-US")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::TranscriptUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fallback_reuses_downloaded_video() {
        let speech = Arc::new(ChunkSpeech::new(false));
        let fetcher = Arc::new(FakeFetcher::new(false));
        let service = TranscriptService::new(
            Arc::new(StaticCaptions(None)),
            speech.clone(),
            fetcher.clone(),
            Arc::new(FakeMedia {
                chunks: 1,
                failing_cut_start: None,
            }),
            60.0,
        );
        let source = VideoSource::remote("https://cdn.example.com/talk.mp4");

        let transcript = service
            .get_transcript_with(&source, "en-US", Some(Bytes::from_static(b"remote video")))
            .await
            .unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(fetcher.audio_downloads.load(Ordering::SeqCst), 0);

        service.get_transcript(&source, "en-US").await.unwrap();
        assert_eq!(fetcher.audio_downloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_captions_fall_back() {
        let speech = Arc::new(ChunkSpeech::new(false));
        let transcript = service(Some(Vec::new()), speech.clone(), 1)
            .get_transcript(&youtube(), "en-US")
            .await
            .unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(speech.calls.load(Ordering::SeqCst), 1);
    }
}
