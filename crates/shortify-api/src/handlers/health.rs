//! Health check handlers.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use shortify_media::{check_ffmpeg, check_ffprobe, check_ytdlp, MediaResult};

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: Option<u64>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn skipped(reason: &str) -> Self {
        Self {
            status: "skipped".to_string(),
            error: Some(reason.to_string()),
            latency_ms: None,
        }
    }

    fn is_healthy(&self) -> bool {
        self.status != "error"
    }

    fn from_tool<T>(result: MediaResult<T>) -> Self {
        match result {
            Ok(_) => Self::ok(None),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub checks: BTreeMap<&'static str, CheckStatus>,
    /// Tracked jobs by status
    pub jobs: BTreeMap<&'static str, usize>,
}

/// Dependency checks and job counts.
///
/// GET /health/detailed
pub async fn health_detailed(
    State(state): State<AppState>,
) -> (StatusCode, Json<DetailedHealthResponse>) {
    let mut checks = BTreeMap::new();
    checks.insert("ffmpeg", CheckStatus::from_tool(check_ffmpeg()));
    checks.insert("ffprobe", CheckStatus::from_tool(check_ffprobe()));
    checks.insert("yt-dlp", CheckStatus::from_tool(check_ytdlp()));
    checks.insert("storage", storage_check(&state).await);

    let healthy = checks.values().all(CheckStatus::is_healthy);
    let response = DetailedHealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        checks,
        jobs: state.pipeline.store().status_counts().into_iter().collect(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckStatus,
    pub database: CheckStatus,
}

/// Readiness probe: object storage and row store connectivity.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let storage = storage_check(&state).await;

    let database = match &state.db {
        Some(client) => {
            let start = Instant::now();
            match client.check_connectivity().await {
                Ok(()) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64)),
                Err(e) => CheckStatus::error(e.to_string()),
            }
        }
        None => CheckStatus::skipped("row store not configured"),
    };

    let all_ok = storage.is_healthy() && database.is_healthy();
    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks { storage, database },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn storage_check(state: &AppState) -> CheckStatus {
    let start = Instant::now();
    match state.pipeline.objects().check_connectivity().await {
        Ok(()) => CheckStatus::ok(Some(start.elapsed().as_millis() as u64)),
        Err(e) => CheckStatus::error(e.to_string()),
    }
}
