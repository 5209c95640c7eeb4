//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use shortify_db::{
    CreditLedger, DbConfig, MemoryLedger, RestClient, ShortsLedger, ShortsRepository,
    UserCreditsRepository,
};
use shortify_media::{Downloader, DownloaderConfig, Transcoder};
use shortify_models::EncodingConfig;
use shortify_storage::{MemoryStore, ObjectStore, S3Store, StorageConfig};
use shortify_worker::{
    GeminiClient, GoogleSpeechClient, JobStore, Pipeline, PipelineDeps, WorkerConfig, YtDlpCaptions,
};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;
use crate::middleware::RateLimiterCache;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Pipeline,
    pub auth: Option<Arc<JwtVerifier>>,
    /// Per-user job submission limiter
    pub submit_limiter: Arc<RateLimiterCache<String>>,
    /// Row store client, used for readiness checks
    pub db: Option<RestClient>,
    /// In-memory object store served under `/objects` in development
    pub local_objects: Option<Arc<MemoryStore>>,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: Pipeline, db: Option<RestClient>) -> Self {
        let auth = config
            .jwt_secret
            .as_deref()
            .map(|secret| Arc::new(JwtVerifier::new(secret)));
        let submit_limiter = Arc::new(RateLimiterCache::per_minute(config.submissions_per_minute));

        Self {
            config,
            pipeline,
            auth,
            submit_limiter,
            db,
            local_objects: None,
        }
    }

    /// Serve `store` under `/objects`. Its base URL should be
    /// [`ApiConfig::local_object_base_url`].
    pub fn with_local_objects(mut self, store: Arc<MemoryStore>) -> Self {
        self.local_objects = Some(store);
        self
    }

    /// Build the production collaborators from environment variables.
    ///
    /// Without object storage or row store settings (development only), the
    /// in-memory store and ledger are used instead.
    pub fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let worker = WorkerConfig::from_env();

        let downloader = Downloader::new(DownloaderConfig::from_env()).context("downloader")?;
        let transcoder = Transcoder::new(EncodingConfig::default()).with_timeout(worker.process_timeout);
        let speech = GoogleSpeechClient::from_env().context("speech client")?;
        let model = GeminiClient::from_env().context("highlight model")?;

        let local_objects = if StorageConfig::is_configured() {
            None
        } else {
            let base_url = config.local_object_base_url();
            warn!(base_url = %base_url, "Object storage not configured, keeping objects in memory");
            Some(Arc::new(MemoryStore::new(base_url)))
        };
        let objects: Arc<dyn ObjectStore> = match &local_objects {
            Some(store) => store.clone(),
            None => Arc::new(S3Store::from_env().context("object storage")?),
        };

        let credits: Arc<dyn CreditLedger>;
        let shorts: Arc<dyn ShortsLedger>;
        let db = if DbConfig::is_configured() {
            let client = RestClient::from_env().context("row store")?;
            credits = Arc::new(UserCreditsRepository::new(client.clone()));
            shorts = Arc::new(ShortsRepository::new(client.clone()));
            Some(client)
        } else {
            warn!("Row store not configured, keeping credits in memory");
            let ledger = Arc::new(MemoryLedger::new());
            credits = ledger.clone();
            shorts = ledger;
            None
        };

        if config.jwt_secret.is_none() {
            warn!("SUPABASE_JWT_SECRET not set, authenticated routes will reject every request");
        }

        info!(
            max_concurrent_jobs = worker.max_concurrent_jobs,
            job_retention_secs = worker.job_retention.as_secs(),
            "Pipeline configured"
        );

        let deps = PipelineDeps {
            store: JobStore::new(),
            fetcher: Arc::new(downloader),
            media: Arc::new(transcoder),
            captions: Arc::new(YtDlpCaptions),
            speech: Arc::new(speech),
            model: Arc::new(model),
            objects,
            credits,
            shorts,
        };

        let state = Self::new(config, Pipeline::new(deps, worker), db);
        Ok(match local_objects {
            Some(store) => state.with_local_objects(store),
            None => state,
        })
    }
}
