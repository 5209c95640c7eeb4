//! Structured job logging utilities.

use std::time::Instant;

use tracing::{error, info, warn, Span};

use shortify_models::{JobId, PipelineStage};

/// Per-job logger emitting `job_id`, `operation` and stage timing fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log a stage start and return a timer for [`JobLogger::stage_completed`].
    pub fn stage_started(&self, stage: PipelineStage) -> Instant {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            "Stage started"
        );
        Instant::now()
    }

    pub fn stage_completed(&self, stage: PipelineStage, started: Instant) {
        let elapsed = started.elapsed();
        crate::metrics::record_stage_duration(stage, elapsed.as_secs_f64());
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "Stage completed"
        );
    }

    pub fn stage_failed(&self, stage: PipelineStage, started: Instant, reason: &str) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = %stage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage failed: {}", reason
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Tracing span carrying the job context.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}
