//! Objects kept in memory when no object storage is configured.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /objects/*key
pub async fn serve_object(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Response> {
    let (data, content_type) = state
        .local_objects
        .as_ref()
        .and_then(|store| store.get_with_type(&key))
        .ok_or_else(|| ApiError::not_found("Object not found"))?;

    Ok(([(header::CONTENT_TYPE, content_type)], data).into_response())
}
