//! Job submission and status polling.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use shortify_models::{ClipLength, JobId, JobSnapshot, Layout, VideoSource};
use shortify_worker::JobRequest;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::{sanitize_filename, validate_video_url};
use crate::state::AppState;

/// Multipart field carrying the uploaded file.
const VIDEO_FIELD: &str = "video";

/// Job submission fields, sent as JSON or as multipart text fields.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoRequest {
    #[validate(length(max = 2048))]
    pub video_url: Option<String>,
    pub clip_length: Option<String>,
    pub layout: Option<String>,
    #[validate(length(max = 200))]
    pub template: Option<String>,
    #[validate(length(min = 2, max = 16))]
    pub language_code: Option<String>,
}

/// A file received in the `video` part.
#[derive(Debug)]
struct UploadedVideo {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoResponse {
    pub success: bool,
    pub job_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub success: bool,
    #[serde(flatten)]
    pub job: JobSnapshot,
}

/// Submit a video for processing.
///
/// POST /api/process-video
pub async fn process_video(
    State(state): State<AppState>,
    user: AuthUser,
    request: Request,
) -> ApiResult<(StatusCode, Json<ProcessVideoResponse>)> {
    if !state.submit_limiter.check(&user.uid).await {
        warn!(user_id = %user.uid, "Submission rate limit exceeded");
        metrics::record_rate_limit_hit("/api/process-video");
        return Err(ApiError::RateLimited);
    }

    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (form, upload) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart, state.config.max_upload_bytes).await?
    } else {
        let Json(form) = Json::<ProcessVideoRequest>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        (form, None)
    };

    let job_request = build_job_request(form, upload)?;
    let source_kind = job_request.source.kind();
    let job_id = state.pipeline.admit(&user.uid, job_request).await?;

    metrics::record_job_submitted(source_kind);
    info!(job_id = %job_id, user_id = %user.uid, source = source_kind, "Job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessVideoResponse {
            success: true,
            job_id,
        }),
    ))
}

/// Poll a job.
///
/// GET /api/job-status/:job_id
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = state
        .pipeline
        .store()
        .snapshot(&JobId::from_string(job_id))
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    Ok(Json(JobStatusResponse { success: true, job }))
}

async fn read_multipart(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> ApiResult<(ProcessVideoRequest, Option<UploadedVideo>)> {
    let mut form = ProcessVideoRequest::default();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == VIDEO_FIELD {
            let filename = sanitize_filename(field.file_name().unwrap_or_default());
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Upload failed: {}", e.body_text())))?;
            if bytes.len() > max_upload_bytes {
                return Err(ApiError::bad_request(format!(
                    "Uploaded video exceeds the {} byte limit",
                    max_upload_bytes
                )));
            }
            upload = Some(UploadedVideo {
                filename,
                content_type,
                bytes,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        match name.as_str() {
            "videoUrl" => form.video_url = Some(value),
            "clipLength" => form.clip_length = Some(value),
            "layout" => form.layout = Some(value),
            "template" => form.template = Some(value),
            "languageCode" => form.language_code = Some(value),
            _ => {}
        }
    }

    Ok((form, upload))
}

/// Blank optional fields count as absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_job_request(
    form: ProcessVideoRequest,
    upload: Option<UploadedVideo>,
) -> ApiResult<JobRequest> {
    let form = ProcessVideoRequest {
        video_url: non_empty(form.video_url),
        clip_length: non_empty(form.clip_length),
        layout: non_empty(form.layout),
        template: non_empty(form.template),
        language_code: non_empty(form.language_code),
    };
    form.validate()?;

    let source = match (upload, form.video_url) {
        (Some(upload), _) => {
            if upload.bytes.is_empty() {
                return Err(ApiError::bad_request("Uploaded video is empty"));
            }
            VideoSource::upload(upload.filename, upload.content_type, upload.bytes)
        }
        (None, Some(url)) => {
            VideoSource::remote(validate_video_url(&url).into_result().map_err(ApiError::bad_request)?)
        }
        (None, None) => {
            return Err(ApiError::bad_request("Provide a videoUrl or a video file"));
        }
    };

    let mut request = JobRequest::new(source);
    if let Some(clip_length) = form.clip_length {
        request.clip_length = clip_length
            .parse::<ClipLength>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
    }
    if let Some(layout) = form.layout {
        request.layout = layout
            .parse::<Layout>()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
    }
    request.template = form.template;
    request.language = form.language_code;
    Ok(request)
}
