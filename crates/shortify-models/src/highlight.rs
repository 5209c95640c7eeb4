//! Transcript entries and highlight segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One timed line of transcript. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TranscriptEntry {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

impl TranscriptEntry {
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Shift the entry by `offset` seconds.
    pub fn shifted(mut self, offset: f64) -> Self {
        self.start += offset;
        self
    }
}

/// A highlight chosen from the transcript, to be cut into one short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Transcript text covered by the segment
    pub text: String,

    /// Start offset in the source video (seconds)
    pub start_time: f64,

    /// Length of the clip (seconds)
    pub duration: f64,

    /// Why the model picked this moment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Segment {
    pub fn new(text: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start_time,
            duration,
            rationale: None,
        }
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}
