//! Published shorts records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::RestClient;
use crate::error::DbResult;

const TABLE: &str = "shorts";

/// A `shorts` row: the public URLs produced by one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortsRecord {
    pub job_id: String,
    pub user_id: String,
    pub video_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ShortsRecord {
    pub fn new(job_id: impl Into<String>, user_id: impl Into<String>, video_urls: Vec<String>) -> Self {
        Self {
            job_id: job_id.into(),
            user_id: user_id.into(),
            video_urls,
            created_at: Utc::now(),
        }
    }
}

/// Repository for `shorts` rows.
#[derive(Debug, Clone)]
pub struct ShortsRepository {
    client: RestClient,
}

impl ShortsRepository {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    pub async fn insert(&self, record: &ShortsRecord) -> DbResult<()> {
        let _: Vec<ShortsRecord> = self.client.insert(TABLE, record).await?;
        info!(
            job_id = %record.job_id,
            user_id = %record.user_id,
            count = record.video_urls.len(),
            "Recorded shorts"
        );
        Ok(())
    }
}
