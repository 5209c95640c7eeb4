//! Speech recognition for the transcript fallback.
//!
//! Implementation over the Google Cloud Speech-to-Text `speech:recognize`
//! REST endpoint. Audio is sent inline as base64 FLAC and word time offsets
//! are requested so every recognition result can be placed on the timeline.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use shortify_models::encoding::SPEECH_SAMPLE_RATE;
use shortify_models::TranscriptEntry;

use crate::error::{PipelineError, PipelineResult};

const DEFAULT_SPEECH_URL: &str = "https://speech.googleapis.com";

/// Speech-to-text collaborator.
///
/// Returned entries are timed relative to the start of `audio`.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        audio: Bytes,
        language: &str,
        alternative_languages: &[&str],
    ) -> PipelineResult<Vec<TranscriptEntry>>;
}

/// Speech client settings.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl SpeechConfig {
    /// Create config from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        let api_key = std::env::var("SPEECH_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::config("SPEECH_API_KEY not set"))?;

        Ok(Self {
            api_key,
            base_url: std::env::var("SPEECH_API_URL").unwrap_or_else(|_| DEFAULT_SPEECH_URL.to_string()),
            timeout: Duration::from_secs(120),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
    #[serde(skip_serializing_if = "no_alternatives")]
    alternative_language_codes: &'a [&'a str],
    enable_word_time_offsets: bool,
    enable_automatic_punctuation: bool,
}

fn no_alternatives(codes: &&[&str]) -> bool {
    codes.is_empty()
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
    result_end_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    words: Vec<WordInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WordInfo {
    start_time: Option<String>,
    end_time: Option<String>,
}

/// Google Cloud Speech-to-Text REST client.
#[derive(Debug, Clone)]
pub struct GoogleSpeechClient {
    http: Client,
    config: SpeechConfig,
}

impl GoogleSpeechClient {
    pub fn new(config: SpeechConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shortify-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::config(format!("speech client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> PipelineResult<Self> {
        Self::new(SpeechConfig::from_env()?)
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleSpeechClient {
    async fn recognize(
        &self,
        audio: Bytes,
        language: &str,
        alternative_languages: &[&str],
    ) -> PipelineResult<Vec<TranscriptEntry>> {
        let url = format!(
            "{}/v1/speech:recognize",
            self.config.base_url.trim_end_matches('/')
        );
        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "FLAC",
                sample_rate_hertz: SPEECH_SAMPLE_RATE,
                language_code: language,
                alternative_language_codes: alternative_languages,
                enable_word_time_offsets: true,
                enable_automatic_punctuation: true,
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&audio),
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::transcript_unavailable(format!("speech request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Speech API rejected request");
            return Err(PipelineError::transcript_unavailable(format!(
                "speech API returned {status}: {body}"
            )));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::transcript_unavailable(format!("invalid speech response: {e}")))?;

        let entries = entries_from_results(parsed.results);
        debug!(entries = entries.len(), language, "Speech recognition finished");
        Ok(entries)
    }
}

/// Build one entry per recognition result, timed by its word offsets.
///
/// Results without word timing start where the previous one ended.
fn entries_from_results(results: Vec<RecognitionResult>) -> Vec<TranscriptEntry> {
    let mut entries = Vec::new();
    let mut cursor = 0.0;

    for result in results {
        let result_end = result.result_end_time.as_deref().and_then(parse_offset);
        let Some(best) = result.alternatives.into_iter().next() else {
            continue;
        };
        let text = best.transcript.trim();
        if text.is_empty() {
            continue;
        }

        let first = best
            .words
            .first()
            .and_then(|w| w.start_time.as_deref())
            .and_then(parse_offset);
        let last = best
            .words
            .last()
            .and_then(|w| w.end_time.as_deref())
            .and_then(parse_offset);

        let start = first.unwrap_or(cursor);
        let end = last.or(result_end).unwrap_or(start).max(start);

        entries.push(TranscriptEntry::new(text, start, end - start));
        cursor = end;
    }

    entries
}

/// Parse a protobuf JSON duration such as `"1.500s"`.
fn parse_offset(value: &str) -> Option<f64> {
    value
        .trim()
        .strip_suffix('s')
        .and_then(|n| n.parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n >= 0.0)
}
