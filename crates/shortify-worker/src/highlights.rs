//! Highlight selection.
//!
//! The transcript is rendered into a prompt asking a text-generation model
//! for a JSON array of `{text, startTime, duration}` objects. The reply is
//! accepted only as a whole: any malformed element rejects the response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use shortify_models::{Segment, TranscriptEntry};

use crate::error::{PipelineError, PipelineResult};

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Models tried in order until one answers.
pub const DEFAULT_GEMINI_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.5-pro"];

/// Text-generation collaborator.
#[async_trait]
pub trait HighlightModel: Send + Sync {
    /// Raw text reply for `prompt`.
    ///
    /// Transport failures are `AnalysisUnavailable`.
    async fn generate(&self, prompt: &str) -> PipelineResult<String>;
}

/// Gemini client settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub models: Vec<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PipelineError::config("GEMINI_API_KEY not set"))?;

        let models = std::env::var("GEMINI_MODELS")
            .ok()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|models| !models.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect());

        Ok(Self {
            api_key,
            models,
            base_url: std::env::var("GEMINI_API_URL").unwrap_or_else(|_| DEFAULT_GEMINI_URL.to_string()),
            timeout: Duration::from_secs(120),
        })
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini API client with model fallback.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shortify-worker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::config(format!("gemini client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> PipelineResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    async fn call_model(&self, model: &str, prompt: &str) -> PipelineResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        );

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::analysis_unavailable(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::analysis_unavailable(format!(
                "Gemini returned {status}: {error_text}"
            )));
        }

        let reply: GeminiResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::analysis_unavailable(format!("unreadable Gemini response: {e}")))?;

        reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| PipelineError::analysis_unavailable("no content in Gemini response"))
    }
}

#[async_trait]
impl HighlightModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> PipelineResult<String> {
        let mut last_error = None;

        for model in &self.config.models {
            debug!(model = %model, "Requesting highlights");
            match self.call_model(model, prompt).await {
                Ok(text) => {
                    info!(model = %model, "Highlights generated");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "Gemini model failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::analysis_unavailable("no Gemini models configured")))
    }
}

/// Picks highlight segments from a transcript.
#[derive(Clone)]
pub struct HighlightSelector {
    model: Arc<dyn HighlightModel>,
}

impl HighlightSelector {
    pub fn new(model: Arc<dyn HighlightModel>) -> Self {
        Self { model }
    }

    /// Ask the model for up to `max_count` segments of `min`..=`max` seconds.
    pub async fn select_segments(
        &self,
        transcript: &[TranscriptEntry],
        min_duration: f64,
        max_duration: f64,
        max_count: usize,
    ) -> PipelineResult<Vec<Segment>> {
        let prompt = build_prompt(transcript, min_duration, max_duration, max_count)?;
        let reply = self.model.generate(&prompt).await?;

        let mut segments = parse_segments(&reply)?;
        segments.truncate(max_count);
        info!(count = segments.len(), "Selected highlight segments");
        Ok(segments)
    }
}

/// Render the selection prompt.
pub fn build_prompt(
    transcript: &[TranscriptEntry],
    min_duration: f64,
    max_duration: f64,
    max_count: usize,
) -> PipelineResult<String> {
    let transcript_json = serde_json::to_string_pretty(transcript)
        .map_err(|e| PipelineError::internal(format!("transcript serialization: {e}")))?;

    Ok(format!(
        r#"Analyze this transcript and identify up to {max_count} high-quality segments that would make engaging short-form content.

Important requirements:
1. Each segment MUST be between {min_duration} and {max_duration} seconds long when spoken
2. Select the most impactful, emotional, or thought-provoking moments
3. Each segment should be a complete thought that makes sense on its own
4. Focus on segments with clear messages, personal stories, or powerful quotes
5. Avoid segments of non-speech or audience reactions (laughter, applause) unless they are part of a key moment
6. Use exact timestamps from the transcript

Format the output as a JSON array of objects, where each object has:
- text: the segment text
- startTime: the exact start time in seconds from the transcript
- duration: the duration in seconds

Example format:
[
  {{"text": "First segment text here", "startTime": 30, "duration": {min_duration}}}
]

Transcript (with timestamps in seconds):
{transcript_json}

JSON array of segments with exact timestamps:"#
    ))
}

/// Strip surrounding code fences from a model reply.
fn strip_fences(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("json") on the opening fence line.
        text = rest.split_once('\n').map_or("", |(_, body)| body);
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse and validate a model reply as a list of segments.
pub fn parse_segments(reply: &str) -> PipelineResult<Vec<Segment>> {
    let value: Value = serde_json::from_str(strip_fences(reply))
        .map_err(|e| PipelineError::analysis_parse(format!("reply is not JSON: {e}")))?;

    let items = value
        .as_array()
        .ok_or_else(|| PipelineError::analysis_parse("reply is not a JSON array"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_segment(i + 1, item))
        .collect()
}

fn parse_segment(position: usize, item: &Value) -> PipelineResult<Segment> {
    let invalid = |what: &str| PipelineError::analysis_parse(format!("segment {position}: {what}"));

    let object = item.as_object().ok_or_else(|| invalid("not an object"))?;

    let text = object
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid("missing or empty text"))?;
    let start = object
        .get("startTime")
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("startTime is not a number"))?;
    let duration = object
        .get("duration")
        .and_then(Value::as_f64)
        .ok_or_else(|| invalid("duration is not a number"))?;

    if !start.is_finite() || start < 0.0 {
        return Err(invalid("startTime is negative"));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(invalid("duration is not positive"));
    }

    let mut segment = Segment::new(text, start, duration);
    segment.rationale = object
        .get("rationale")
        .or_else(|| object.get("reason"))
        .and_then(Value::as_str)
        .map(String::from);
    Ok(segment)
}
