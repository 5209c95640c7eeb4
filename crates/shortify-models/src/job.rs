//! Job record tracked for each processing request.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{ClipLength, JobStatus, Layout, Segment, Tier, TranscriptEntry};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the source video comes from.
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// Remote video reference (YouTube link or plain HTTP URL)
    Remote { url: String },
    /// File uploaded with the request
    Upload {
        filename: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

impl VideoSource {
    pub fn remote(url: impl Into<String>) -> Self {
        VideoSource::Remote { url: url.into() }
    }

    pub fn upload(filename: impl Into<String>, content_type: Option<String>, bytes: Bytes) -> Self {
        VideoSource::Upload {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    /// Remote locator, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            VideoSource::Remote { url } => Some(url),
            VideoSource::Upload { .. } => None,
        }
    }

    /// File extension used when the raw source is persisted.
    pub fn extension(&self) -> &str {
        match self {
            VideoSource::Remote { .. } => "mp4",
            VideoSource::Upload { filename, .. } => filename
                .rsplit_once('.')
                .map(|(_, ext)| ext)
                .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or("mp4"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VideoSource::Remote { .. } => "remote",
            VideoSource::Upload { .. } => "upload",
        }
    }

    /// Size of the uploaded buffer still held (0 for remote sources).
    pub fn held_bytes(&self) -> usize {
        match self {
            VideoSource::Remote { .. } => 0,
            VideoSource::Upload { bytes, .. } => bytes.len(),
        }
    }
}

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Admission,
    Ingest,
    Transcript,
    Analysis,
    Cut,
    Upload,
    Settlement,
    Pipeline,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Admission => "admission",
            PipelineStage::Ingest => "ingest",
            PipelineStage::Transcript => "transcript",
            PipelineStage::Analysis => "analysis",
            PipelineStage::Cut => "cut",
            PipelineStage::Upload => "upload",
            PipelineStage::Settlement => "settlement",
            PipelineStage::Pipeline => "pipeline",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error categories surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    Unauthorized,
    InsufficientCredits,
    IngestError,
    TranscriptUnavailable,
    AnalysisParseError,
    AnalysisUnavailable,
    TranscodeError,
    UploadError,
    PipelineError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::InsufficientCredits => "InsufficientCredits",
            ErrorKind::IngestError => "IngestError",
            ErrorKind::TranscriptUnavailable => "TranscriptUnavailable",
            ErrorKind::AnalysisParseError => "AnalysisParseError",
            ErrorKind::AnalysisUnavailable => "AnalysisUnavailable",
            ErrorKind::TranscodeError => "TranscodeError",
            ErrorKind::UploadError => "UploadError",
            ErrorKind::PipelineError => "PipelineError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error recorded against a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub stage: PipelineStage,
    pub kind: ErrorKind,
    /// 1-based segment number for per-segment failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<usize>,
    pub message: String,
}

impl JobFailure {
    pub fn new(stage: PipelineStage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            segment: None,
            message: message.into(),
        }
    }

    pub fn for_segment(mut self, segment: usize) -> Self {
        self.segment = Some(segment);
        self
    }
}

/// Rejected job mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobUpdateError {
    #[error("job is in terminal state {0}")]
    Terminal(JobStatus),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("{0} already recorded")]
    AlreadySet(&'static str),

    #[error("output count would exceed segment count ({0})")]
    TooManyOutputs(usize),
}

/// A job and everything the pipeline has learned about it so far.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub source: VideoSource,
    /// Download progress (0-100)
    pub download_progress: u8,
    pub transcript: Option<Vec<TranscriptEntry>>,
    pub segments: Option<Vec<Segment>>,
    /// Public URLs of produced shorts, in segment order
    pub outputs: Vec<String>,
    /// Append-only list of recorded failures
    pub errors: Vec<JobFailure>,
    /// Authenticated user that submitted the job
    pub owner: String,
    pub tier: Tier,
    pub max_shorts: usize,
    pub clip_length: ClipLength,
    pub layout: Layout,
    pub template: Option<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the job reaches a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job for an admitted request.
    pub fn new(owner: impl Into<String>, tier: Tier, source: VideoSource) -> Self {
        let now = Utc::now();

        Self {
            id: JobId::new(),
            status: JobStatus::Initializing,
            source,
            download_progress: 0,
            transcript: None,
            segments: None,
            outputs: Vec::new(),
            errors: Vec::new(),
            owner: owner.into(),
            tier,
            max_shorts: tier.max_shorts(),
            clip_length: ClipLength::default(),
            layout: Layout::default(),
            template: None,
            language: "en-US".to_string(),
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn with_clip_length(mut self, clip_length: ClipLength) -> Self {
        self.clip_length = clip_length;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_mutable(&self) -> Result<(), JobUpdateError> {
        if self.status.is_terminal() {
            return Err(JobUpdateError::Terminal(self.status));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `next`, enforcing the lifecycle state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        if !self.status.can_transition_to(next) {
            return Err(JobUpdateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.touch();
        if next.is_terminal() {
            self.finished_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Record download progress. Progress never moves backwards.
    pub fn set_download_progress(&mut self, percent: u8) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        let percent = percent.min(100);
        if percent > self.download_progress {
            self.download_progress = percent;
            self.touch();
        }
        Ok(())
    }

    pub fn set_transcript(&mut self, transcript: Vec<TranscriptEntry>) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        if self.transcript.is_some() {
            return Err(JobUpdateError::AlreadySet("transcript"));
        }
        self.transcript = Some(transcript);
        self.touch();
        Ok(())
    }

    /// Record the selected segments, truncated to the job's `max_shorts`.
    pub fn set_segments(&mut self, mut segments: Vec<Segment>) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        if self.segments.is_some() {
            return Err(JobUpdateError::AlreadySet("segments"));
        }
        segments.truncate(self.max_shorts);
        self.segments = Some(segments);
        self.touch();
        Ok(())
    }

    pub fn push_output(&mut self, url: impl Into<String>) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        let limit = self.segments.as_ref().map_or(0, Vec::len);
        if self.outputs.len() >= limit {
            return Err(JobUpdateError::TooManyOutputs(limit));
        }
        self.outputs.push(url.into());
        self.touch();
        Ok(())
    }

    pub fn push_error(&mut self, failure: JobFailure) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        self.errors.push(failure);
        self.touch();
        Ok(())
    }

    /// Drop the uploaded buffer once the pipeline holds its own handle to it.
    /// The filename and content type are kept.
    pub fn release_source(&mut self) -> Result<(), JobUpdateError> {
        self.ensure_mutable()?;
        if let VideoSource::Upload { bytes, .. } = &mut self.source {
            *bytes = Bytes::new();
        }
        Ok(())
    }

    /// Record a failure and move to `Error` in one step.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), JobUpdateError> {
        self.push_error(failure)?;
        self.transition(JobStatus::Error)
    }

    /// Serializable view of the job for status polling.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            download_progress: self.download_progress,
            transcript: self.transcript.clone(),
            segments: self.segments.clone(),
            outputs: self.outputs.clone(),
            errors: self.errors.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Point-in-time view of a job returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub download_progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    pub errors: Vec<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(tier: Tier) -> Job {
        Job::new("user123", tier, VideoSource::remote("https://youtu.be/dQw4w9WgXcQ"))
    }

    #[test]
    fn test_job_creation() {
        let job = test_job(Tier::Free);
        assert_eq!(job.status, JobStatus::Initializing);
        assert_eq!(job.max_shorts, 2);
        assert_eq!(job.download_progress, 0);
        assert!(job.transcript.is_none());
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = test_job(Tier::Paid);
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Downloaded).unwrap();
        job.transition(JobStatus::Cutting).unwrap();
        job.transition(JobStatus::Completed).unwrap();

        assert!(job.is_terminal());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = test_job(Tier::Free);
        job.fail(JobFailure::new(
            PipelineStage::Ingest,
            ErrorKind::IngestError,
            "download failed",
        ))
        .unwrap();

        assert_eq!(
            job.set_download_progress(50),
            Err(JobUpdateError::Terminal(JobStatus::Error))
        );
        assert!(job.push_error(JobFailure::new(
            PipelineStage::Pipeline,
            ErrorKind::PipelineError,
            "late"
        ))
        .is_err());
        assert_eq!(job.errors.len(), 1);
    }

    #[test]
    fn test_segments_truncated_and_write_once() {
        let mut job = test_job(Tier::Free);
        let segments = (0..3)
            .map(|i| Segment::new(format!("s{i}"), i as f64 * 40.0, 30.0))
            .collect();

        job.set_segments(segments).unwrap();
        assert_eq!(job.segments.as_ref().unwrap().len(), 2);
        assert_eq!(
            job.set_segments(Vec::new()),
            Err(JobUpdateError::AlreadySet("segments"))
        );
    }

    #[test]
    fn test_outputs_bounded_by_segments() {
        let mut job = test_job(Tier::Free);
        assert!(job.push_output("https://cdn/a.mp4").is_err());

        job.set_segments(vec![Segment::new("only", 0.0, 30.0)]).unwrap();
        job.push_output("https://cdn/a.mp4").unwrap();
        assert_eq!(
            job.push_output("https://cdn/b.mp4"),
            Err(JobUpdateError::TooManyOutputs(1))
        );
    }

    #[test]
    fn test_download_progress_is_monotonic() {
        let mut job = test_job(Tier::Free);
        job.set_download_progress(40).unwrap();
        job.set_download_progress(20).unwrap();
        job.set_download_progress(250).unwrap();
        assert_eq!(job.download_progress, 100);
    }

    #[test]
    fn test_snapshot_omits_unset_fields() {
        let job = test_job(Tier::Free);
        let json = serde_json::to_value(job.snapshot()).unwrap();

        assert_eq!(json["status"], "initializing");
        assert_eq!(json["downloadProgress"], 0);
        assert!(json.get("transcript").is_none());
        assert!(json.get("segments").is_none());
        assert!(json.get("outputs").is_none());
        assert_eq!(json["errors"], serde_json::json!([]));
    }

    #[test]
    fn test_failure_wire_format() {
        let failure = JobFailure::new(PipelineStage::Cut, ErrorKind::TranscodeError, "ffmpeg exited 1")
            .for_segment(2);
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["stage"], "cut");
        assert_eq!(json["kind"], "TranscodeError");
        assert_eq!(json["segment"], 2);
    }

    #[test]
    fn test_release_source_keeps_metadata() {
        let mut job = Job::new(
            "user123",
            Tier::Free,
            VideoSource::upload("talk.mov", None, Bytes::from_static(b"uploaded video")),
        );
        assert_eq!(job.source.held_bytes(), 14);

        job.release_source().unwrap();
        assert_eq!(job.source.held_bytes(), 0);
        assert_eq!(job.source.extension(), "mov");

        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Error).unwrap();
        assert!(job.release_source().is_err());
    }

    #[test]
    fn test_upload_extension() {
        let source = VideoSource::upload("talk.MOV", None, Bytes::from_static(b"x"));
        assert_eq!(source.extension(), "MOV");
        let source = VideoSource::upload("noext", None, Bytes::new());
        assert_eq!(source.extension(), "mp4");
    }
}
