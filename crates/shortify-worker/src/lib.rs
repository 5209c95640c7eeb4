//! Video processing pipeline for Shortify.
//!
//! This crate provides:
//! - The in-memory job store shared by the API, pipeline and reaper
//! - Transcript acquisition (captions first, speech recognition fallback)
//! - Highlight selection through a text-generation model
//! - The pipeline orchestrator and the terminal-job reaper
//! - Language detection for remote sources

pub mod config;
pub mod error;
pub mod highlights;
pub mod language;
pub mod logging;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod reaper;
pub mod speech;
pub mod store;
pub mod transcript;

pub use config::WorkerConfig;
pub use error::{PipelineError, PipelineResult};
pub use highlights::{GeminiClient, GeminiConfig, HighlightModel, HighlightSelector};
pub use language::{LanguageDetector, DEFAULT_LANGUAGE};
pub use logging::JobLogger;
pub use media::{MediaFetcher, MediaProcessor};
pub use orchestrator::{JobRequest, Pipeline, PipelineDeps};
pub use reaper::Reaper;
pub use speech::{GoogleSpeechClient, SpeechConfig, SpeechRecognizer};
pub use store::{JobError, JobStore};
pub use transcript::{CaptionsSource, TranscriptService, YtDlpCaptions};
