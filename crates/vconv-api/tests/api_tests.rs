//! HTTP surface tests against in-memory collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vconv_api::{create_router, ApiConfig, AppState};
use vconv_media::{output_path_for, MediaResult, Transcoder};
use vconv_models::{EncodingParams, MediaProfile, OutputFormat};
use vconv_storage::{ObjectStorage, StorageError, StorageResult, UploadedObject};
use vconv_worker::{
    CircuitBreakerRegistry, ResourceSample, ResourceSampler, RetryConfig, WorkerConfig, WorkerResult,
};

const BOUNDARY: &str = "vconv-test-boundary";

struct EchoTranscoder;

#[async_trait]
impl Transcoder for EchoTranscoder {
    async fn probe(&self, _input: &Path) -> MediaResult<MediaProfile> {
        Ok(MediaProfile {
            width: 1280,
            height: 720,
            duration: 12.0,
            bit_rate: 4_000_000,
            frame_rate: 30.0,
            codec_name: "h264".to_string(),
            ..MediaProfile::default()
        })
    }

    async fn transcode(
        &self,
        input: &Path,
        format: OutputFormat,
        _params: &EncodingParams,
        _preserve_audio: bool,
    ) -> MediaResult<PathBuf> {
        let output = output_path_for(input, format, None);
        tokio::fs::write(&output, b"converted").await?;
        Ok(output)
    }
}

struct MemoryStorage {
    reachable: bool,
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<UploadedObject> {
        let size = tokio::fs::metadata(path).await?.len();
        Ok(UploadedObject {
            url: format!("https://cdn.example.com/{}", key),
            size_mb: size as f64 / (1024.0 * 1024.0),
        })
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        if self.reachable {
            Ok(())
        } else {
            Err(StorageError::Unreachable("head bucket videos: dispatch failure".to_string()))
        }
    }
}

struct IdleSampler;

#[async_trait]
impl ResourceSampler for IdleSampler {
    async fn sample(&self) -> WorkerResult<ResourceSample> {
        Ok(ResourceSample {
            cpu_percent: 5.0,
            memory_percent: 20.0,
            available_memory_mb: 16_384,
            total_memory_mb: 32_768,
            cpu_count: 8,
        })
    }
}

struct Harness {
    dir: TempDir,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    fn with_config(config: ApiConfig) -> Self {
        Self::build(config, MemoryStorage { reachable: true })
    }

    fn build(config: ApiConfig, storage: MemoryStorage) -> Self {
        let dir = TempDir::new().unwrap();
        let worker_config = WorkerConfig {
            temp_dir: dir.path().to_path_buf(),
            upload_retry: RetryConfig::new("upload")
                .with_max_attempts(2)
                .with_base_delay(Duration::from_millis(1)),
            ..WorkerConfig::default()
        };

        let state = AppState::from_parts(
            config,
            worker_config,
            Arc::new(EchoTranscoder),
            Arc::new(storage),
            Arc::new(CircuitBreakerRegistry::default()),
            Arc::new(IdleSampler),
        );

        Self {
            dir,
            app: create_router(state, None),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body, headers)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body, _) = self
            .send(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        (status, body)
    }

    async fn upload(&self, filename: &str, content_type: &str, data: &[u8], fields: &[(&str, &str)]) -> (StatusCode, Value) {
        let body = multipart_body(filename, content_type, data, fields);
        let request = Request::post("/convert")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        let (status, body, _) = self.send(request).await;
        (status, body)
    }

    fn temp_files(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}

fn multipart_body(filename: &str, content_type: &str, data: &[u8], fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn wait_for_result(harness: &Harness, request_id: &str) -> (StatusCode, Value) {
    for _ in 0..500 {
        let (status, body) = harness.get(&format!("/convert/{}", request_id)).await;
        if body["status"] != "processing" {
            return (status, body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", request_id);
}

#[tokio::test]
async fn test_upload_and_poll_until_completed() {
    let harness = Harness::new();

    let (status, body) = harness
        .upload(
            "holiday.mov",
            "video/quicktime",
            &[7u8; 64 * 1024],
            &[("formats", "mp4,webm"), ("optimize_level", "balanced"), ("preserve_audio", "true")],
        )
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "processing");
    let request_id = body["request_id"].as_str().unwrap().to_string();
    assert!(body["message"].as_str().unwrap().contains(&request_id));

    let (status, body) = wait_for_result(&harness, &request_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body.get("partial").is_none());
    assert_eq!(body["converted_files"].as_object().unwrap().len(), 2);
    assert!(body["converted_files"]["webm"]
        .as_str()
        .unwrap()
        .starts_with("https://cdn.example.com/webm/"));
    assert!(body["metadata"]["compression_ratio"]["mp4"]
        .as_str()
        .unwrap()
        .ends_with('%'));

    let (status, logs) = harness.get(&format!("/convert/{}/logs", request_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["job_info"]["status"], "completed");
    assert_eq!(logs["job_info"]["original_filename"], "holiday.mov");
    assert!(logs["logs"].as_array().unwrap().len() >= 3);

    // Source and converted outputs are cleaned up
    assert_eq!(harness.temp_files(), 0);
}

#[tokio::test]
async fn test_rejects_unsupported_extension() {
    let harness = Harness::new();

    let (status, body) = harness
        .upload("notes.txt", "text/plain", b"hello", &[("formats", "mp4")])
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("Unsupported file extension"));
    assert_eq!(harness.temp_files(), 0);
}

#[tokio::test]
async fn test_rejects_non_video_content_type() {
    let harness = Harness::new();

    let (status, _) = harness
        .upload("clip.mp4", "image/png", b"\x89PNG", &[])
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejects_unknown_output_format() {
    let harness = Harness::new();

    let (status, body) = harness
        .upload("clip.mp4", "video/mp4", b"data", &[("formats", "mp4,gif")])
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("gif"));
    assert_eq!(harness.temp_files(), 0);
}

#[tokio::test]
async fn test_rejects_unknown_optimization_level() {
    let harness = Harness::new();

    let (status, _) = harness
        .upload("clip.mp4", "video/mp4", b"data", &[("optimize_level", "ultra")])
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_413() {
    let harness = Harness::with_config(ApiConfig {
        max_upload_size_mb: 1,
        ..ApiConfig::default()
    });

    let (status, body) = harness
        .upload("clip.mp4", "video/mp4", &vec![0u8; 1536 * 1024], &[("formats", "mp4")])
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["detail"].as_str().unwrap().contains("1 MB"));
    assert_eq!(harness.temp_files(), 0);
}

#[tokio::test]
async fn test_unknown_request_id_is_404() {
    let harness = Harness::new();

    let (status, body) = harness.get("/convert/1b7c2d4e-0000-4000-8000-000000000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].as_str().unwrap().contains("not found"));

    let (status, _) = harness.get("/convert/missing/logs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_supported_formats() {
    let harness = Harness::new();

    let (status, body) = harness.get("/formats").await;

    assert_eq!(status, StatusCode::OK);
    let inputs = body["data"]["input_formats"].as_array().unwrap();
    assert_eq!(inputs.len(), 7);
    assert!(inputs.contains(&Value::from(".mkv")));
    assert_eq!(body["data"]["output_formats"], serde_json::json!([".mp4", ".webm", ".mov"]));
    assert_eq!(body["data"]["optimization_levels"], serde_json::json!(["fast", "balanced", "max"]));
}

#[tokio::test]
async fn test_health_reports_job_stats_and_headers() {
    let harness = Harness::new();

    let (status, body, headers) = harness
        .send(
            Request::get("/health")
                .header("X-Request-ID", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"], "connected");
    assert_eq!(body["jobs"]["total"], 0);
    assert_eq!(headers["x-request-id"], "req-42");
    assert_eq!(headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_health_degraded_when_storage_unreachable() {
    let harness = Harness::build(ApiConfig::default(), MemoryStorage { reachable: false });

    let (status, body) = harness.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["storage"], "unreachable");
}

#[tokio::test]
async fn test_circuit_breaker_inspection_and_reset() {
    let harness = Harness::new();

    let (status, body) = harness.get("/health/circuit-breakers").await;
    assert_eq!(status, StatusCode::OK);
    let breakers = body["circuit_breakers"].as_array().unwrap();
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0]["name"], "storage");
    assert_eq!(breakers[0]["state"], "closed");

    let (status, _, _) = harness
        .send(
            Request::post("/health/circuit-breakers/reset?name=billing")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body, _) = harness
        .send(
            Request::post("/health/circuit-breakers/reset?name=storage")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"], 1);

    let (status, body, _) = harness
        .send(
            Request::post("/health/circuit-breakers/reset")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reset"], 1);
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let harness = Harness::new();

    let (status, _) = harness.get("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
