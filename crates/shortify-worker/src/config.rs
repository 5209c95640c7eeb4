//! Worker configuration.

use std::time::Duration;

use shortify_media::DEFAULT_CHUNK_SECONDS;

/// Pipeline and reaper settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs allowed to run at the same time
    pub max_concurrent_jobs: usize,
    /// Segments cut concurrently within one job
    pub max_parallel_cuts: usize,
    /// Wall-clock limit for each external process
    pub process_timeout: Duration,
    /// Audio chunk length for the speech fallback (seconds)
    pub chunk_seconds: f64,
    /// Report `completed_with_partial_failure` instead of `completed`
    /// when some segments failed
    pub report_partial_failure: bool,
    /// How often the reaper sweeps
    pub reaper_interval: Duration,
    /// How long terminal jobs stay pollable
    pub job_retention: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            max_parallel_cuts: 2,
            process_timeout: Duration::from_secs(300),
            chunk_seconds: DEFAULT_CHUNK_SECONDS,
            report_partial_failure: false,
            reaper_interval: Duration::from_secs(3600),
            job_retention: Duration::from_secs(3600),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_parallel_cuts: env_parse("MAX_PARALLEL_CUTS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_parallel_cuts),
            process_timeout: env_parse("PROCESS_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.process_timeout),
            chunk_seconds: env_parse("SPEECH_CHUNK_SECONDS")
                .filter(|s: &f64| *s > 0.0)
                .unwrap_or(defaults.chunk_seconds),
            report_partial_failure: std::env::var("REPORT_PARTIAL_FAILURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.report_partial_failure),
            reaper_interval: env_parse("REAPER_INTERVAL_SECS")
                .filter(|s: &u64| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            job_retention: env_parse("JOB_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_retention),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
