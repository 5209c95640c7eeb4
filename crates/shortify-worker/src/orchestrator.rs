//! Pipeline orchestrator.
//!
//! One spawned task per admitted job. Ingest runs concurrently with
//! transcript and analysis; cutting starts once both branches succeeded.
//! The first branch failure cancels the other one and is recorded on the
//! job exactly once, by [`Pipeline::process`].

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use shortify_db::{CreditLedger, ShortsLedger, ShortsRecord};
use shortify_models::{
    is_youtube_reference, ClipLength, ErrorKind, Job, JobFailure, JobId, JobStatus, Layout,
    PipelineStage, Segment, VideoSource,
};
use shortify_storage::{content_type_for, short_key, temp_source_key, ObjectStore, SHORT_CONTENT_TYPE};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::highlights::{HighlightModel, HighlightSelector};
use crate::language::{LanguageDetector, DEFAULT_LANGUAGE};
use crate::logging::JobLogger;
use crate::media::{MediaFetcher, MediaProcessor};
use crate::metrics;
use crate::speech::SpeechRecognizer;
use crate::store::JobStore;
use crate::transcript::{CaptionsSource, TranscriptService};

/// A validated processing request.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: VideoSource,
    pub clip_length: ClipLength,
    pub layout: Layout,
    pub template: Option<String>,
    /// Transcript language; `en-US` when absent
    pub language: Option<String>,
}

impl JobRequest {
    pub fn new(source: VideoSource) -> Self {
        Self {
            source,
            clip_length: ClipLength::default(),
            layout: Layout::default(),
            template: None,
            language: None,
        }
    }
}

/// Collaborators the pipeline is built from.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: JobStore,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub media: Arc<dyn MediaProcessor>,
    pub captions: Arc<dyn CaptionsSource>,
    pub speech: Arc<dyn SpeechRecognizer>,
    pub model: Arc<dyn HighlightModel>,
    pub objects: Arc<dyn ObjectStore>,
    pub credits: Arc<dyn CreditLedger>,
    pub shorts: Arc<dyn ShortsLedger>,
}

/// Counts from the cutting stage.
#[derive(Debug, Clone, Copy, Default)]
struct CutSummary {
    produced: usize,
    failed: usize,
}

/// The video-to-shorts pipeline.
#[derive(Clone)]
pub struct Pipeline {
    store: JobStore,
    fetcher: Arc<dyn MediaFetcher>,
    media: Arc<dyn MediaProcessor>,
    transcripts: TranscriptService,
    selector: HighlightSelector,
    detector: LanguageDetector,
    objects: Arc<dyn ObjectStore>,
    credits: Arc<dyn CreditLedger>,
    shorts: Arc<dyn ShortsLedger>,
    config: WorkerConfig,
    permits: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps, config: WorkerConfig) -> Self {
        let transcripts = TranscriptService::new(
            deps.captions.clone(),
            deps.speech.clone(),
            deps.fetcher.clone(),
            deps.media.clone(),
            config.chunk_seconds,
        );
        let detector = LanguageDetector::new(
            deps.captions,
            deps.speech,
            deps.fetcher.clone(),
            deps.media.clone(),
        );

        Self {
            store: deps.store,
            fetcher: deps.fetcher,
            media: deps.media,
            transcripts,
            selector: HighlightSelector::new(deps.model),
            detector,
            objects: deps.objects,
            credits: deps.credits,
            shorts: deps.shorts,
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn language_detector(&self) -> &LanguageDetector {
        &self.detector
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Admit a request and start processing it in the background.
    pub async fn admit(&self, owner: &str, request: JobRequest) -> PipelineResult<JobId> {
        let id = self.prepare(owner, request).await?;
        self.spawn(id.clone());
        Ok(id)
    }

    /// Check the caller's credits and register the job without starting it.
    pub async fn prepare(&self, owner: &str, request: JobRequest) -> PipelineResult<JobId> {
        let record = self.credits.fetch_or_create(owner).await?;
        if !record.has_credits() {
            info!(owner, credits = record.credits, "Rejected job: no credits");
            return Err(PipelineError::InsufficientCredits);
        }

        let tier = record.tier();
        if !tier.allows_layout(request.layout) {
            return Err(PipelineError::invalid_request(format!(
                "layout '{}' requires a paid plan",
                request.layout.as_str()
            )));
        }

        let job = Job::new(owner, tier, request.source)
            .with_clip_length(request.clip_length)
            .with_layout(request.layout)
            .with_template(request.template)
            .with_language(request.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()));

        info!(
            job_id = %job.id,
            owner,
            tier = %tier,
            max_shorts = job.max_shorts,
            source = job.source.kind(),
            "Job admitted"
        );
        Ok(self.store.insert(job))
    }

    /// Run a registered job on its own task.
    pub fn spawn(&self, id: JobId) -> JoinHandle<()> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.process(id).await })
    }

    /// Drive a registered job to a terminal state.
    pub async fn process(&self, id: JobId) {
        let logger = JobLogger::new(&id, "process_video");
        let span = logger.create_span();
        self.drive(id, logger).instrument(span).await
    }

    async fn drive(&self, id: JobId, logger: JobLogger) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.record_failure(&id, &PipelineError::internal("job queue closed"));
                return;
            }
        };

        let Some(job) = self.store.get(&id) else {
            warn!(job_id = %id, "Job vanished before processing");
            return;
        };
        // `job` holds the upload for the rest of the run.
        if let Err(e) = self.store.update(&id, |j| j.release_source()) {
            warn!(job_id = %id, error = %e, "Could not release upload buffer");
        }

        logger.log_start(job.source.kind());
        metrics::record_job_started();

        let temp_key = Mutex::new(None);
        if let Err(e) = self.execute(&job, &logger, &temp_key).await {
            logger.log_warning(&format!("job failed: {e}"));
            self.record_failure(&id, &e);
        }

        let persisted = temp_key.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = persisted {
            if let Err(e) = self.objects.delete(&key).await {
                logger.log_warning(&format!("failed to delete temporary source {key}: {e}"));
            }
        }

        if let Some(status) = self.store.get(&id).map(|j| j.status) {
            metrics::record_job_finished(status);
        }
    }

    async fn execute(
        &self,
        job: &Job,
        logger: &JobLogger,
        temp_key: &Mutex<Option<String>>,
    ) -> PipelineResult<()> {
        self.store.update(&job.id, |j| j.transition(JobStatus::Processing))?;

        // Plain HTTP sources have no captions and no audio-only download;
        // their speech fallback waits for the ingested video.
        let (ingested, _) = watch::channel(None);
        let reuse_ingest = job
            .source
            .url()
            .is_some_and(|url| !is_youtube_reference(url));
        let (video, ()) = tokio::try_join!(
            self.ingest(job, logger, temp_key, &ingested),
            self.analyze(job, logger, reuse_ingest.then(|| ingested.subscribe()))
        )?;

        let summary = self.cut_all(job, video, logger).await?;
        if summary.produced == 0 {
            self.store.update(&job.id, |j| {
                j.fail(JobFailure::new(
                    PipelineStage::Pipeline,
                    ErrorKind::PipelineError,
                    "no shorts were produced",
                ))
            })?;
            logger.log_warning("no shorts were produced");
            return Ok(());
        }

        self.settle(&job.id, logger).await;

        let status = if summary.failed > 0 && self.config.report_partial_failure {
            JobStatus::CompletedWithPartialFailure
        } else {
            JobStatus::Completed
        };
        self.store.update(&job.id, |j| j.transition(status))?;
        logger.log_completion(&format!(
            "{} shorts produced, {} failed",
            summary.produced, summary.failed
        ));
        Ok(())
    }

    async fn ingest(
        &self,
        job: &Job,
        logger: &JobLogger,
        temp_key: &Mutex<Option<String>>,
        ingested: &watch::Sender<Option<Bytes>>,
    ) -> PipelineResult<Bytes> {
        timed(logger, PipelineStage::Ingest, async {
            let video = match &job.source {
                VideoSource::Remote { url } => {
                    let store = self.store.clone();
                    let id = job.id.clone();
                    let on_progress = move |percent: u8| {
                        // Ignored once the job is terminal.
                        let _ = store.update(&id, |j| j.set_download_progress(percent));
                    };
                    self.fetcher
                        .download_video(url, &on_progress)
                        .await
                        .map_err(|e| PipelineError::ingest(e.to_string()))?
                }
                VideoSource::Upload { bytes, .. } => bytes.clone(),
            };
            self.store.update(&job.id, |j| j.set_download_progress(100))?;
            ingested.send_replace(Some(video.clone()));

            let extension = job.source.extension();
            let key = temp_source_key(&job.id, extension);
            self.objects
                .put(&key, video.clone(), content_type_for(extension))
                .await
                .map_err(|e| PipelineError::ingest(format!("failed to persist source: {e}")))?;
            *temp_key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key);

            self.store.update(&job.id, |j| j.transition(JobStatus::Downloaded))?;
            Ok::<_, PipelineError>(video)
        })
        .await
    }

    async fn analyze(
        &self,
        job: &Job,
        logger: &JobLogger,
        ingested: Option<watch::Receiver<Option<Bytes>>>,
    ) -> PipelineResult<()> {
        let transcript = timed(logger, PipelineStage::Transcript, async {
            let video = match ingested {
                Some(mut rx) => match rx.wait_for(Option::is_some).await {
                    Ok(current) => (*current).clone(),
                    Err(_) => None,
                },
                None => None,
            };
            self.transcripts
                .get_transcript_with(&job.source, &job.language, video)
                .await
        })
        .await?;
        self.store
            .update(&job.id, |j| j.set_transcript(transcript.clone()))?;

        let (min_duration, max_duration) = job.clip_length.duration_bounds();
        let segments = timed(
            logger,
            PipelineStage::Analysis,
            self.selector
                .select_segments(&transcript, min_duration, max_duration, job.max_shorts),
        )
        .await?;
        self.store.update(&job.id, |j| j.set_segments(segments))?;
        Ok(())
    }

    async fn cut_all(&self, job: &Job, video: Bytes, logger: &JobLogger) -> PipelineResult<CutSummary> {
        self.store.update(&job.id, |j| j.transition(JobStatus::Cutting))?;
        let segments = self
            .store
            .get(&job.id)
            .and_then(|j| j.segments)
            .unwrap_or_default();

        let started = logger.stage_started(PipelineStage::Cut);
        let mut results = stream::iter(segments.into_iter().enumerate())
            .map(|(index, segment)| {
                let video = video.clone();
                async move { (index + 1, self.cut_one(job, video, index + 1, &segment).await) }
            })
            .buffered(self.config.max_parallel_cuts.max(1));

        let mut summary = CutSummary::default();
        while let Some((number, result)) = results.next().await {
            match result {
                Ok(url) => {
                    self.store.update(&job.id, |j| j.push_output(url))?;
                    summary.produced += 1;
                    metrics::record_segment(true);
                }
                Err(e) => {
                    logger.log_warning(&format!("segment {number} failed: {e}"));
                    self.store
                        .update(&job.id, |j| j.push_error(e.to_failure().for_segment(number)))?;
                    summary.failed += 1;
                    metrics::record_segment(false);
                }
            }
        }
        logger.stage_completed(PipelineStage::Cut, started);
        Ok(summary)
    }

    async fn cut_one(&self, job: &Job, video: Bytes, number: usize, segment: &Segment) -> PipelineResult<String> {
        let clip = self
            .media
            .cut_segment(video, segment.start_time, segment.duration, job.layout)
            .await
            .map_err(|e| PipelineError::transcode(e.to_string()))?;

        let key = short_key(&job.owner, &job.id, number);
        self.objects
            .put(&key, clip, SHORT_CONTENT_TYPE)
            .await
            .map_err(|e| PipelineError::upload(e.to_string()))?;
        Ok(self.objects.public_url(&key))
    }

    /// Take the credit and record the shorts. Failures are kept on the job
    /// but do not fail it.
    async fn settle(&self, id: &JobId, logger: &JobLogger) {
        let Some(job) = self.store.get(id) else {
            return;
        };
        let started = logger.stage_started(PipelineStage::Settlement);

        if job.tier.consumes_credits() {
            match self.credits.decrement(&job.owner).await {
                Ok(remaining) => info!(owner = %job.owner, remaining, "Credit consumed"),
                Err(e) => self.record_settlement_error(id, logger, e.into()),
            }
        }

        let record = ShortsRecord::new(id.as_str(), job.owner.as_str(), job.outputs.clone());
        if let Err(e) = self.shorts.record(&record).await {
            self.record_settlement_error(id, logger, e.into());
        }

        logger.stage_completed(PipelineStage::Settlement, started);
    }

    fn record_settlement_error(&self, id: &JobId, logger: &JobLogger, error: PipelineError) {
        logger.log_warning(&format!("settlement failed: {error}"));
        if let Err(e) = self.store.update(id, |j| j.push_error(error.to_failure())) {
            warn!(job_id = %id, error = %e, "Could not record settlement failure");
        }
    }

    fn record_failure(&self, id: &JobId, error: &PipelineError) {
        if let Err(e) = self.store.update(id, |j| j.fail(error.to_failure())) {
            warn!(job_id = %id, error = %e, "Could not record job failure");
        }
    }
}

/// Run one stage with start, completion and failure logging.
async fn timed<T>(
    logger: &JobLogger,
    stage: PipelineStage,
    stage_future: impl Future<Output = PipelineResult<T>>,
) -> PipelineResult<T> {
    let started = logger.stage_started(stage);
    let result = stage_future.await;
    match &result {
        Ok(_) => logger.stage_completed(stage, started),
        Err(e) => logger.stage_failed(stage, started, &e.to_string()),
    }
    result
}
