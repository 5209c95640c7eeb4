//! Shared data models for the Shortify backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their lifecycle status and recorded failures
//! - Transcript entries and highlight segments
//! - Account tiers, layouts and clip length presets
//! - Encoding configuration for vertical shorts

pub mod encoding;
pub mod highlight;
pub mod job;
pub mod job_status;
pub mod plan;
pub mod style;
pub mod utils;

// Re-export common types
pub use encoding::{EncodingConfig, SHORT_HEIGHT, SHORT_WIDTH};
pub use highlight::{Segment, TranscriptEntry};
pub use job::{
    ErrorKind, Job, JobFailure, JobId, JobSnapshot, JobUpdateError, PipelineStage, VideoSource,
};
pub use job_status::JobStatus;
pub use plan::{Tier, DEFAULT_STARTING_CREDITS};
pub use style::{ClipLength, ClipLengthParseError, Layout, LayoutParseError};
pub use utils::{
    extract_video_id, is_youtube_reference, normalize_video_reference, watch_url, VideoIdError, VideoIdResult,
};
