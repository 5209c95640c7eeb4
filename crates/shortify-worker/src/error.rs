//! Pipeline error types.

use thiserror::Error;

use shortify_db::DbError;
use shortify_models::{ErrorKind, JobFailure, PipelineStage};

use crate::store::JobError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Insufficient credits")]
    InsufficientCredits,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Ingest failed: {0}")]
    Ingest(String),

    #[error("Transcript unavailable: {0}")]
    TranscriptUnavailable(String),

    #[error("Could not parse highlight response: {0}")]
    AnalysisParse(String),

    #[error("Highlight model unavailable: {0}")]
    AnalysisUnavailable(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] DbError),

    #[error("Job store error: {0}")]
    Store(#[from] JobError),

    #[error("Pipeline error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn ingest(msg: impl Into<String>) -> Self {
        Self::Ingest(msg.into())
    }

    pub fn transcript_unavailable(msg: impl Into<String>) -> Self {
        Self::TranscriptUnavailable(msg.into())
    }

    pub fn analysis_parse(msg: impl Into<String>) -> Self {
        Self::AnalysisParse(msg.into())
    }

    pub fn analysis_unavailable(msg: impl Into<String>) -> Self {
        Self::AnalysisUnavailable(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Client-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InsufficientCredits => ErrorKind::InsufficientCredits,
            PipelineError::Ingest(_) => ErrorKind::IngestError,
            PipelineError::TranscriptUnavailable(_) => ErrorKind::TranscriptUnavailable,
            PipelineError::AnalysisParse(_) => ErrorKind::AnalysisParseError,
            PipelineError::AnalysisUnavailable(_) => ErrorKind::AnalysisUnavailable,
            PipelineError::Transcode(_) => ErrorKind::TranscodeError,
            PipelineError::Upload(_) => ErrorKind::UploadError,
            PipelineError::InvalidRequest(_)
            | PipelineError::Config(_)
            | PipelineError::Ledger(_)
            | PipelineError::Store(_)
            | PipelineError::Internal(_) => ErrorKind::PipelineError,
        }
    }

    /// Stage the error is attributed to when recorded on a job.
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::InsufficientCredits | PipelineError::InvalidRequest(_) => {
                PipelineStage::Admission
            }
            PipelineError::Ingest(_) => PipelineStage::Ingest,
            PipelineError::TranscriptUnavailable(_) => PipelineStage::Transcript,
            PipelineError::AnalysisParse(_) | PipelineError::AnalysisUnavailable(_) => {
                PipelineStage::Analysis
            }
            PipelineError::Transcode(_) => PipelineStage::Cut,
            PipelineError::Upload(_) => PipelineStage::Upload,
            PipelineError::Ledger(_) => PipelineStage::Settlement,
            PipelineError::Config(_) | PipelineError::Store(_) | PipelineError::Internal(_) => {
                PipelineStage::Pipeline
            }
        }
    }

    /// Job error entry for this failure.
    pub fn to_failure(&self) -> JobFailure {
        JobFailure::new(self.stage(), self.kind(), self.to_string())
    }
}
