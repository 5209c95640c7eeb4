//! Background eviction of finished jobs.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::metrics;
use crate::store::JobStore;

/// Periodically drops terminal jobs older than the retention window.
#[derive(Debug, Clone)]
pub struct Reaper {
    store: JobStore,
    interval: Duration,
    retention: Duration,
}

impl Reaper {
    pub fn new(store: JobStore, interval: Duration, retention: Duration) -> Self {
        Self {
            store,
            interval,
            retention,
        }
    }

    pub fn from_config(store: JobStore, config: &WorkerConfig) -> Self {
        Self::new(store, config.reaper_interval, config.job_retention)
    }

    /// Start the sweep loop.
    ///
    /// Runs indefinitely and should be spawned as a background task.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Starting job reaper"
        );

        let mut ticker = interval(self.interval.max(Duration::from_secs(1)));
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.sweep_once();
        }
    }

    /// Run one sweep, returning the number of evicted jobs.
    pub fn sweep_once(&self) -> usize {
        let evicted = self.store.evict_terminal(Utc::now(), self.retention);
        if evicted > 0 {
            metrics::record_evicted(evicted);
            info!(evicted, remaining = self.store.len(), "Evicted finished jobs");
        } else {
            debug!(remaining = self.store.len(), "Reaper sweep found nothing to evict");
        }
        evicted
    }
}
