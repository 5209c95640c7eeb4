//! Spoken language detection for remote sources.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::security::validate_video_url;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DetectLanguageRequest {
    #[validate(length(min = 1, max = 2048))]
    pub video_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectLanguageResponse {
    pub language_code: String,
}

/// POST /api/detect-language
pub async fn detect_language(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<DetectLanguageRequest>,
) -> ApiResult<Json<DetectLanguageResponse>> {
    request.validate()?;
    let url = validate_video_url(&request.video_url)
        .into_result()
        .map_err(ApiError::bad_request)?;

    let language_code = state.pipeline.language_detector().detect(&url).await?;
    info!(user_id = %user.uid, language = %language_code, "Detected source language");

    Ok(Json(DetectLanguageResponse { language_code }))
}
