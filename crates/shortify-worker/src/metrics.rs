//! Pipeline metrics.

use metrics::{counter, gauge, histogram};

use shortify_models::{JobStatus, PipelineStage};

pub mod names {
    pub const JOBS_STARTED: &str = "shortify_jobs_started_total";
    pub const JOBS_FINISHED: &str = "shortify_jobs_finished_total";
    pub const JOBS_ACTIVE: &str = "shortify_jobs_active";
    pub const STAGE_DURATION: &str = "shortify_stage_duration_seconds";
    pub const SEGMENTS: &str = "shortify_segments_total";
    pub const JOBS_EVICTED: &str = "shortify_jobs_evicted_total";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED).increment(1);
    gauge!(names::JOBS_ACTIVE).increment(1.0);
}

pub fn record_job_finished(status: JobStatus) {
    counter!(names::JOBS_FINISHED, "status" => status.as_str()).increment(1);
    gauge!(names::JOBS_ACTIVE).decrement(1.0);
}

pub fn record_stage_duration(stage: PipelineStage, seconds: f64) {
    histogram!(names::STAGE_DURATION, "stage" => stage.as_str()).record(seconds);
}

pub fn record_segment(succeeded: bool) {
    let outcome = if succeeded { "ok" } else { "failed" };
    counter!(names::SEGMENTS, "outcome" => outcome).increment(1);
}

pub fn record_evicted(count: usize) {
    counter!(names::JOBS_EVICTED).increment(count as u64);
}
