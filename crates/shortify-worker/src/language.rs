//! Spoken language detection for remote sources.
//!
//! A text sample is taken from the first caption entries, or from speech
//! recognition over the first 30 seconds of audio when captions are missing.
//! The sample is classified by script, then by stop-word counts for Latin
//! text, and mapped to the locale the rest of the pipeline expects.

use std::sync::Arc;

use tracing::{debug, info, warn};

use shortify_models::{extract_video_id, VideoSource};

use crate::error::{PipelineError, PipelineResult};
use crate::media::{MediaFetcher, MediaProcessor};
use crate::speech::SpeechRecognizer;
use crate::transcript::{CaptionsSource, TranscriptService};

/// Locale used when nothing better can be determined.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Caption entries sampled for classification.
const CAPTION_SAMPLE_ENTRIES: usize = 10;

/// Audio sampled for classification when captions are missing (seconds).
const AUDIO_SAMPLE_SECONDS: f64 = 30.0;

/// Alternatives offered to the recognizer next to `en-US`.
const ALTERNATIVE_LANGUAGES: &[&str] = &["hi-IN", "es-ES", "fr-FR", "de-DE", "ru-RU", "ja-JP", "ar-XA"];

/// ISO 639-3 code to locale.
const LOCALES: &[(&str, &str)] = &[
    ("eng", "en-US"),
    ("hin", "hi-IN"),
    ("spa", "es-ES"),
    ("fra", "fr-FR"),
    ("deu", "de-DE"),
    ("ita", "it-IT"),
    ("rus", "ru-RU"),
    ("jpn", "ja-JP"),
    ("kor", "ko-KR"),
    ("zho", "zh"),
    ("ara", "ar-XA"),
    ("por", "pt-BR"),
    ("ben", "bn-IN"),
    ("pan", "pa-IN"),
    ("mar", "mr-IN"),
    ("tam", "ta-IN"),
    ("tel", "te-IN"),
    ("guj", "gu-IN"),
    ("urd", "ur-IN"),
];

/// Stop words for Latin-script languages.
const STOP_WORDS: &[(&str, &[&str])] = &[
    ("eng", &["the", "and", "is", "you", "that", "this", "of", "to", "it", "what"]),
    ("spa", &["el", "la", "que", "de", "los", "las", "es", "por", "una", "pero"]),
    ("fra", &["le", "la", "les", "est", "et", "une", "des", "pas", "que", "vous"]),
    ("deu", &["der", "die", "das", "und", "ist", "nicht", "ich", "ein", "mit", "auch"]),
    ("ita", &["il", "che", "di", "non", "sono", "una", "gli", "per", "questo", "anche"]),
    ("por", &["o", "que", "não", "uma", "os", "você", "para", "com", "isso", "mas"]),
];

/// Detects the spoken language of a remote video.
#[derive(Clone)]
pub struct LanguageDetector {
    captions: Arc<dyn CaptionsSource>,
    speech: Arc<dyn SpeechRecognizer>,
    transcripts: TranscriptService,
    media: Arc<dyn MediaProcessor>,
}

impl LanguageDetector {
    pub fn new(
        captions: Arc<dyn CaptionsSource>,
        speech: Arc<dyn SpeechRecognizer>,
        fetcher: Arc<dyn MediaFetcher>,
        media: Arc<dyn MediaProcessor>,
    ) -> Self {
        let transcripts = TranscriptService::new(
            captions.clone(),
            speech.clone(),
            fetcher,
            media.clone(),
            AUDIO_SAMPLE_SECONDS,
        );
        Self {
            captions,
            speech,
            transcripts,
            media,
        }
    }

    /// Locale of the video at `url`.
    pub async fn detect(&self, url: &str) -> PipelineResult<String> {
        let url = url.trim();
        if url.is_empty() {
            return Err(PipelineError::invalid_request("videoUrl is required"));
        }

        let sample = match self.caption_sample(url).await {
            Some(text) => text,
            None => self.speech_sample(url).await?,
        };

        let locale = classify_text(&sample)
            .map(to_locale)
            .unwrap_or(DEFAULT_LANGUAGE);
        info!(url, locale, "Detected language");
        Ok(locale.to_string())
    }

    async fn caption_sample(&self, url: &str) -> Option<String> {
        let video_id = extract_video_id(url).ok()?;
        match self.captions.fetch(&video_id, DEFAULT_LANGUAGE).await {
            Ok(entries) if !entries.is_empty() => Some(
                entries
                    .iter()
                    .take(CAPTION_SAMPLE_ENTRIES)
                    .map(|e| e.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Ok(_) => None,
            Err(e) => {
                debug!(video_id = %video_id, error = %e, "No captions for language sample");
                None
            }
        }
    }

    async fn speech_sample(&self, url: &str) -> PipelineResult<String> {
        let audio = self.transcripts.source_audio(&VideoSource::remote(url), None).await?;
        let sample = self
            .media
            .slice_audio(audio, AUDIO_SAMPLE_SECONDS)
            .await
            .map_err(|e| PipelineError::transcript_unavailable(format!("audio slice failed: {e}")))?;

        let entries = self
            .speech
            .recognize(sample, DEFAULT_LANGUAGE, ALTERNATIVE_LANGUAGES)
            .await?;
        if entries.is_empty() {
            warn!(url, "Speech sample produced no text");
        }
        Ok(entries
            .into_iter()
            .map(|e| e.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Map an ISO 639-3 code to its locale, defaulting to `en-US`.
pub fn to_locale(iso: &str) -> &'static str {
    LOCALES
        .iter()
        .find(|(code, _)| *code == iso)
        .map(|(_, locale)| *locale)
        .unwrap_or(DEFAULT_LANGUAGE)
}

fn in_range(c: char, start: u32, end: u32) -> bool {
    (start..=end).contains(&(c as u32))
}

/// Classify `text` into an ISO 639-3 code.
///
/// Returns `None` when the text has no letters at all.
pub fn classify_text(text: &str) -> Option<&'static str> {
    let mut counts: Vec<(&'static str, usize)> = Vec::new();
    let mut bump = |code: &'static str| match counts.iter_mut().find(|(c, _)| *c == code) {
        Some((_, n)) => *n += 1,
        None => counts.push((code, 1)),
    };

    let mut latin = 0usize;
    for c in text.chars() {
        match c {
            c if in_range(c, 0x0900, 0x097F) => bump("hin"),
            c if in_range(c, 0x0980, 0x09FF) => bump("ben"),
            c if in_range(c, 0x0A00, 0x0A7F) => bump("pan"),
            c if in_range(c, 0x0A80, 0x0AFF) => bump("guj"),
            c if in_range(c, 0x0B80, 0x0BFF) => bump("tam"),
            c if in_range(c, 0x0C00, 0x0C7F) => bump("tel"),
            c if in_range(c, 0x0600, 0x06FF) => bump("ara"),
            c if in_range(c, 0x0400, 0x04FF) => bump("rus"),
            c if in_range(c, 0x3040, 0x30FF) => bump("jpn"),
            c if in_range(c, 0xAC00, 0xD7AF) || in_range(c, 0x1100, 0x11FF) => bump("kor"),
            c if in_range(c, 0x4E00, 0x9FFF) => bump("zho"),
            c if c.is_alphabetic() => latin += 1,
            _ => {}
        }
    }

    let script = counts.iter().max_by_key(|(_, n)| *n).copied();
    match script {
        Some((code, n)) if n >= latin => Some(refine_script(code, text, &counts)),
        _ if latin > 0 => Some(classify_latin(text)),
        _ => None,
    }
}

/// Split scripts shared by several languages.
fn refine_script(code: &'static str, text: &str, counts: &[(&'static str, usize)]) -> &'static str {
    match code {
        "hin" if ["आहे", "आणि", "नाही", "हे"].iter().any(|w| contains_word(text, w)) => "mar",
        "ara" if text.chars().any(|c| matches!(c, 'ے' | 'ں' | 'ٹ' | 'ڈ' | 'ڑ')) => "urd",
        // Japanese mixes kanji with kana; any kana marks it as Japanese.
        "zho" if counts.iter().any(|(c, _)| *c == "jpn") => "jpn",
        other => other,
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| c.is_whitespace() || c.is_ascii_punctuation() || c == '।')
        .any(|w| w == word)
}

fn classify_latin(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphabetic() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    STOP_WORDS
        .iter()
        .map(|(code, stops)| {
            let hits = words.iter().filter(|w| stops.contains(w)).count();
            (*code, hits)
        })
        // Ties keep the earlier entry, so English wins an empty count.
        .fold(("eng", 0), |best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .0
}
