//! In-memory job store.
//!
//! One store is built by the host and shared (cheaply cloned) between the
//! HTTP handlers, the pipeline and the reaper. All mutation goes through
//! [`JobStore::update`], which runs the closure under the write lock so each
//! update is atomic with respect to readers.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use shortify_models::{Job, JobId, JobSnapshot, JobStatus, JobUpdateError};

/// Rejected store operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job is in terminal state {0}")]
    Terminal(JobStatus),

    #[error(transparent)]
    Rejected(JobUpdateError),
}

impl From<JobUpdateError> for JobError {
    fn from(err: JobUpdateError) -> Self {
        match err {
            JobUpdateError::Terminal(status) => JobError::Terminal(status),
            other => JobError::Rejected(other),
        }
    }
}

/// Concurrent `JobId -> Job` map.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<JobId, Job>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) -> JobId {
        let id = job.id.clone();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), job);
        id
    }

    /// Full copy of a job, including its source.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Consistent point-in-time view for status polling.
    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(Job::snapshot)
    }

    /// Mutate a job under the write lock.
    ///
    /// Terminal jobs are never handed to `f`.
    pub fn update<R>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> Result<R, JobUpdateError>,
    ) -> Result<R, JobError> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.clone()))?;
        if job.is_terminal() {
            return Err(JobError::Terminal(job.status));
        }
        f(job).map_err(JobError::from)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Job counts keyed by status name.
    pub fn status_counts(&self) -> HashMap<&'static str, usize> {
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts = HashMap::new();
        for job in jobs.values() {
            *counts.entry(job.status.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Remove terminal jobs that finished more than `retention` before `now`.
    ///
    /// A zero retention removes every terminal job. Returns the number removed.
    pub fn evict_terminal(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();

        jobs.retain(|_, job| {
            if !job.is_terminal() {
                return true;
            }
            let finished = job.finished_at.unwrap_or(job.updated_at);
            now.signed_duration_since(finished) < retention
        });

        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortify_models::{Segment, Tier, VideoSource};

    fn job() -> Job {
        Job::new("user-1", Tier::Free, VideoSource::remote("https://youtu.be/dQw4w9WgXcQ"))
    }

    fn completed(store: &JobStore) -> JobId {
        let id = store.insert(job());
        store
            .update(&id, |j| {
                j.transition(JobStatus::Processing)?;
                j.transition(JobStatus::Downloaded)?;
                j.set_segments(vec![Segment::new("a", 0.0, 30.0)])?;
                j.transition(JobStatus::Cutting)?;
                j.push_output("https://cdn/short-1.mp4")?;
                j.transition(JobStatus::Completed)
            })
            .unwrap();
        id
    }

    #[test]
    fn test_insert_and_snapshot() {
        let store = JobStore::new();
        let id = store.insert(job());

        let snapshot = store.snapshot(&id).unwrap();
        assert_eq!(snapshot.job_id, id);
        assert_eq!(snapshot.status, JobStatus::Initializing);
        assert_eq!(store.len(), 1);
        assert!(store.snapshot(&JobId::from_string("missing")).is_none());
    }

    #[test]
    fn test_repeat_snapshots_are_identical() {
        let store = JobStore::new();
        let id = completed(&store);

        let first = serde_json::to_string(&store.snapshot(&id).unwrap()).unwrap();
        let second = serde_json::to_string(&store.snapshot(&id).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_terminal_jobs_are_immutable() {
        let store = JobStore::new();
        let id = completed(&store);

        let err = store.update(&id, |j| j.set_download_progress(50)).unwrap_err();
        assert_eq!(err, JobError::Terminal(JobStatus::Completed));
    }

    #[test]
    fn test_update_missing_job() {
        let store = JobStore::new();
        let missing = JobId::from_string("nope");
        assert_eq!(
            store.update(&missing, |j| j.transition(JobStatus::Processing)),
            Err(JobError::NotFound(missing))
        );
    }

    #[test]
    fn test_rejected_mutation_is_reported() {
        let store = JobStore::new();
        let id = store.insert(job());
        let err = store.update(&id, |j| j.transition(JobStatus::Cutting)).unwrap_err();
        assert!(matches!(err, JobError::Rejected(JobUpdateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_evict_terminal_respects_retention() {
        let store = JobStore::new();
        let done = completed(&store);
        let running = store.insert(job());

        let now = Utc::now();
        assert_eq!(store.evict_terminal(now, Duration::from_secs(3600)), 0);
        assert_eq!(
            store.evict_terminal(now + chrono::Duration::hours(2), Duration::from_secs(3600)),
            1
        );
        assert!(store.get(&done).is_none());
        assert!(store.get(&running).is_some());
    }

    #[test]
    fn test_zero_retention_evicts_every_terminal_job() {
        let store = JobStore::new();
        completed(&store);
        store.insert(job());

        assert_eq!(store.evict_terminal(Utc::now(), Duration::ZERO), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.status_counts().get("initializing"), Some(&1));
    }
}
