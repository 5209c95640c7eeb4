//! Job lifecycle states.
//!
//! A job moves forward through the pipeline stages and ends in exactly one
//! terminal state. Terminal jobs are never modified again.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Processing status reported to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job accepted, background task not yet running
    #[default]
    Initializing,
    /// Ingest and transcript/analysis are running
    Processing,
    /// Source bytes are available, analysis may still be running
    Downloaded,
    /// Segments are being cut and uploaded
    Cutting,
    /// At least one short was produced
    Completed,
    /// Some shorts were produced and some segments failed
    CompletedWithPartialFailure,
    /// No shorts were produced
    Error,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Initializing,
        JobStatus::Processing,
        JobStatus::Downloaded,
        JobStatus::Cutting,
        JobStatus::Completed,
        JobStatus::CompletedWithPartialFailure,
        JobStatus::Error,
    ];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "initializing",
            JobStatus::Processing => "processing",
            JobStatus::Downloaded => "downloaded",
            JobStatus::Cutting => "cutting",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithPartialFailure => "completed_with_partial_failure",
            JobStatus::Error => "error",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithPartialFailure | JobStatus::Error
        )
    }

    /// Whether the job produced output.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithPartialFailure
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Any non-terminal state may fail into `Error`. `Processing` may skip
    /// `Downloaded` only on the way to `Error`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Error) => true,
            (Initializing, Processing) => true,
            (Processing, Downloaded) => true,
            (Downloaded, Cutting) => true,
            (Cutting, Completed) | (Cutting, CompletedWithPartialFailure) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
