//! Router tests driven through `tower::ServiceExt::oneshot` with in-memory
//! collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use shortify_api::auth::{Claims, TOKEN_AUDIENCE};
use shortify_api::{create_router, ApiConfig, AppState};
use shortify_db::{MemoryLedger, UserCredits};
use shortify_media::{AudioChunk, MediaError, MediaResult};
use shortify_models::{Layout, TranscriptEntry};
use shortify_storage::MemoryStore;
use shortify_worker::{
    CaptionsSource, HighlightModel, JobStore, MediaFetcher, MediaProcessor, Pipeline, PipelineDeps,
    PipelineResult, SpeechRecognizer, WorkerConfig,
};

const SECRET: &str = "router-test-secret";
const YOUTUBE_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

struct Fetcher;

#[async_trait]
impl MediaFetcher for Fetcher {
    async fn download_video(
        &self,
        _url: &str,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> MediaResult<Bytes> {
        on_progress(100);
        Ok(Bytes::from_static(b"remote video"))
    }

    async fn download_audio(&self, _url: &str) -> MediaResult<Bytes> {
        Ok(Bytes::from_static(b"remote audio"))
    }
}

struct Media;

#[async_trait]
impl MediaProcessor for Media {
    async fn extract_audio(&self, video: Bytes) -> MediaResult<Bytes> {
        Ok(video)
    }

    async fn split_audio(&self, audio: Bytes, _chunk_seconds: f64) -> MediaResult<Vec<AudioChunk>> {
        Ok(vec![AudioChunk {
            index: 0,
            start: 0.0,
            bytes: audio,
        }])
    }

    async fn slice_audio(&self, audio: Bytes, _seconds: f64) -> MediaResult<Bytes> {
        Ok(audio)
    }

    async fn cut_segment(
        &self,
        _video: Bytes,
        start: f64,
        duration: f64,
        _layout: Layout,
    ) -> MediaResult<Bytes> {
        Ok(Bytes::from(format!("short {start}+{duration}")))
    }
}

struct Captions(Option<String>);

#[async_trait]
impl CaptionsSource for Captions {
    async fn fetch(&self, _video_id: &str, _language: &str) -> MediaResult<Vec<TranscriptEntry>> {
        match &self.0 {
            Some(text) => Ok(vec![TranscriptEntry::new(text.clone(), 0.0, 90.0)]),
            None => Err(MediaError::captions_unavailable("no captions")),
        }
    }
}

struct Speech;

#[async_trait]
impl SpeechRecognizer for Speech {
    async fn recognize(
        &self,
        _audio: Bytes,
        _language: &str,
        _alternative_languages: &[&str],
    ) -> PipelineResult<Vec<TranscriptEntry>> {
        Ok(vec![TranscriptEntry::new("the uploaded talk is about rust", 0.0, 90.0)])
    }
}

struct Model;

#[async_trait]
impl HighlightModel for Model {
    async fn generate(&self, _prompt: &str) -> PipelineResult<String> {
        Ok(r#"[{"text": "opening", "startTime": 0, "duration": 30},
               {"text": "closing", "startTime": 45, "duration": 30}]"#
            .to_string())
    }
}

struct TestApp {
    router: Router,
    ledger: Arc<MemoryLedger>,
    objects: Arc<MemoryStore>,
}

fn app_with(config: ApiConfig, captions: Option<&str>) -> TestApp {
    let ledger = Arc::new(MemoryLedger::new());
    let objects = Arc::new(MemoryStore::new(config.local_object_base_url()));
    let deps = PipelineDeps {
        store: JobStore::new(),
        fetcher: Arc::new(Fetcher),
        media: Arc::new(Media),
        captions: Arc::new(Captions(captions.map(str::to_string))),
        speech: Arc::new(Speech),
        model: Arc::new(Model),
        objects: objects.clone(),
        credits: ledger.clone(),
        shorts: ledger.clone(),
    };
    let pipeline = Pipeline::new(deps, WorkerConfig::default());
    let state = AppState::new(config, pipeline, None).with_local_objects(objects.clone());

    TestApp {
        router: create_router(state, None),
        ledger,
        objects,
    }
}

fn test_config() -> ApiConfig {
    ApiConfig {
        jwt_secret: Some(SECRET.to_string()),
        ..ApiConfig::default()
    }
}

fn app() -> TestApp {
    app_with(test_config(), Some("welcome to the show"))
}

fn bearer(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        aud: TOKEN_AUDIENCE.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
        email: None,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}

fn json_post(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, bearer(user));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart_post(user: &str, file: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
    let boundary = "shortify-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"talk.mov\"\r\nContent-Type: video/quicktime\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(file);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/process-video")
        .header(header::AUTHORIZATION, bearer(user))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Poll until the job reaches a terminal status.
async fn wait_for_job(router: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let request = Request::get(format!("/api/job-status/{job_id}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(
            body["status"].as_str(),
            Some("completed" | "completed_with_partial_failure" | "error")
        ) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn test_health_sets_security_and_request_id_headers() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_ready_reports_memory_store_and_skipped_database() {
    let app = app();
    let (status, body) = send(&app.router, Request::get("/ready").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["storage"]["status"], "ok");
    assert_eq!(body["checks"]["database"]["status"], "skipped");
}

#[tokio::test]
async fn test_submission_requires_a_valid_token() {
    let app = app();

    let (status, body) = send(
        &app.router,
        json_post("/api/process-video", None, json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Unauthorized");

    let request = Request::builder()
        .method("POST")
        .uri("/api/process-video")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "videoUrl": YOUTUBE_URL }).to_string()))
        .unwrap();
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_remote_job_runs_to_completion() {
    let app = app();

    let (status, body) = send(
        &app.router,
        json_post(
            "/api/process-video",
            Some("user-1"),
            json!({ "videoUrl": YOUTUBE_URL, "clipLength": "30s-60s" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let job = wait_for_job(&app.router, &job_id).await;
    assert_eq!(job["success"], true);
    assert_eq!(job["jobId"], job_id.as_str());
    assert_eq!(job["status"], "completed");
    assert_eq!(job["downloadProgress"], 100);
    assert_eq!(job["outputs"].as_array().map(Vec::len), Some(2));
    assert_eq!(job["errors"], json!([]));

    assert_eq!(app.ledger.credits_of("user-1"), Some(1));
    assert_eq!(app.ledger.shorts().len(), 1);
    assert!(app.objects.keys().iter().all(|k| k.starts_with("shorts/user-1/")));
}

#[tokio::test]
async fn test_outputs_are_served_without_object_storage() {
    let app = app();

    let (_, body) = send(
        &app.router,
        json_post("/api/process-video", Some("user-1"), json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    let job = wait_for_job(&app.router, body["jobId"].as_str().unwrap()).await;
    let output = job["outputs"][0].as_str().unwrap();

    let path = output.strip_prefix("http://localhost:5000").unwrap();
    assert!(path.starts_with("/objects/shorts/user-1/"), "{path}");
    let key = path.strip_prefix("/objects/").unwrap();

    let response = app
        .router
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(Some(served), app.objects.get(key));

    let (status, _) = send(
        &app.router,
        Request::get("/objects/shorts/nobody/missing.mp4").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_job_runs_to_completion() {
    let app = app_with(test_config(), None);

    let (status, body) = send(
        &app.router,
        multipart_post("user-2", b"uploaded video bytes", &[("clipLength", "<30s")]),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = wait_for_job(&app.router, body["jobId"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["transcript"][0]["text"], "the uploaded talk is about rust");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let app = app_with(
        ApiConfig {
            max_upload_bytes: 8,
            ..test_config()
        },
        None,
    );

    let (status, body) = send(&app.router, multipart_post("user-1", b"way more than eight bytes", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BadRequest");
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected() {
    let app = app();

    let cases = [
        json!({}),
        json!({ "videoUrl": "http://127.0.0.1/admin" }),
        json!({ "videoUrl": YOUTUBE_URL, "clipLength": "2m" }),
        json!({ "videoUrl": YOUTUBE_URL, "layout": "diagonal" }),
        // Free accounts only get the automatic layout.
        json!({ "videoUrl": YOUTUBE_URL, "layout": "fill" }),
    ];
    for case in cases {
        let (status, _) = send(&app.router, json_post("/api/process-video", Some("user-1"), case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
    }
    assert!(app.objects.keys().is_empty());
}

#[tokio::test]
async fn test_out_of_credits_is_forbidden() {
    let app = app();
    app.ledger.set_credits(UserCredits {
        user_id: "broke".to_string(),
        credits: 0,
        tier: "free".to_string(),
    });

    let (status, body) = send(
        &app.router,
        json_post("/api/process-video", Some("broke"), json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "InsufficientCredits");
}

#[tokio::test]
async fn test_submissions_are_rate_limited_per_user() {
    let app = app_with(
        ApiConfig {
            submissions_per_minute: 1,
            ..test_config()
        },
        Some("welcome to the show"),
    );

    let (first, _) = send(
        &app.router,
        json_post("/api/process-video", Some("user-1"), json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    let (second, body) = send(
        &app.router,
        json_post("/api/process-video", Some("user-1"), json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    let (other_user, _) = send(
        &app.router,
        json_post("/api/process-video", Some("user-2"), json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;

    assert_eq!(first, StatusCode::ACCEPTED);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RateLimited");
    assert_eq!(other_user, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = app();
    let (status, body) = send(
        &app.router,
        Request::get("/api/job-status/550e8400-e29b-41d4-a716-446655440000")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotFound");
}

#[tokio::test]
async fn test_detect_language_from_captions() {
    let app = app_with(
        test_config(),
        Some("hola a todos, hoy vamos a ver que es lo que pasa con los precios de la vivienda"),
    );

    let (status, body) = send(
        &app.router,
        json_post("/api/detect-language", Some("user-1"), json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["languageCode"], "es-ES");

    let (status, _) = send(
        &app.router,
        json_post("/api/detect-language", None, json!({ "videoUrl": YOUTUBE_URL })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
