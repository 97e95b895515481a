//! Conversion intake and status handlers.

use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use vconv_models::{
    ConversionJob, JobId, JobStatus, OptimizationLevel, OutputFormat, INPUT_EXTENSIONS,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Response for an accepted conversion request.
#[derive(Debug, Serialize)]
pub struct ConversionAccepted {
    pub status: &'static str,
    pub request_id: JobId,
    pub message: String,
}

/// Size and compression figures for a finished job.
#[derive(Debug, Serialize)]
pub struct FileMetadata {
    pub original_size_mb: Option<f64>,
    pub converted_sizes_mb: BTreeMap<OutputFormat, f64>,
    /// Size reduction `(1 - converted / original) × 100`, e.g. "40.0%";
    /// negative when the output is larger than the source
    pub compression_ratio: BTreeMap<OutputFormat, String>,
}

/// Status poll response, one shape per outcome.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ConversionStatus {
    Processing {
        status: &'static str,
        message: String,
    },
    Completed {
        status: &'static str,
        converted_files: BTreeMap<OutputFormat, String>,
        metadata: FileMetadata,
        processing_time: f64,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        partial: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        status: &'static str,
        message: String,
    },
}

impl ConversionStatus {
    /// Map a job snapshot to its client-facing status.
    pub fn from_job(job: &ConversionJob) -> Self {
        match job.status {
            JobStatus::Pending | JobStatus::Processing => ConversionStatus::Processing {
                status: "processing",
                message: "Video is being processed.".to_string(),
            },
            JobStatus::Completed | JobStatus::PartiallyCompleted => {
                let partial = job.status == JobStatus::PartiallyCompleted;
                let compression_ratio = job
                    .compression_ratios
                    .keys()
                    .filter_map(|f| job.compression_ratio_label(*f).map(|label| (*f, label)))
                    .collect();

                ConversionStatus::Completed {
                    status: "completed",
                    converted_files: job.converted_files.clone(),
                    metadata: FileMetadata {
                        original_size_mb: job.original_size_mb,
                        converted_sizes_mb: job.converted_sizes_mb.clone(),
                        compression_ratio,
                    },
                    processing_time: job.processing_time_secs(),
                    partial,
                    message: partial.then(|| {
                        let failed: Vec<&str> = job.failed_formats.iter().map(|f| f.as_str()).collect();
                        format!("Some formats failed to convert: {}", failed.join(", "))
                    }),
                }
            }
            JobStatus::Failed => ConversionStatus::Error {
                status: "error",
                message: job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Conversion failed".to_string()),
            },
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ConversionStatus::Processing { .. } => StatusCode::ACCEPTED,
            _ => StatusCode::OK,
        }
    }
}

impl IntoResponse for ConversionStatus {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Full job record plus a short human-readable trail.
#[derive(Debug, Serialize)]
pub struct ConversionLogs {
    pub job_info: ConversionJob,
    pub processing_time: f64,
    pub logs: Vec<String>,
}

/// Supported formats response.
#[derive(Debug, Serialize)]
pub struct SupportedFormats {
    pub status: &'static str,
    pub data: SupportedFormatsData,
}

#[derive(Debug, Serialize)]
pub struct SupportedFormatsData {
    pub input_formats: Vec<String>,
    pub output_formats: Vec<String>,
    pub optimization_levels: Vec<OptimizationLevel>,
}

/// Validated, not-yet-saved form fields.
struct ConversionForm {
    formats: Vec<OutputFormat>,
    preserve_audio: bool,
    optimize_level: OptimizationLevel,
}

/// Upload a video and start an asynchronous conversion.
///
/// Multipart fields: `file`, `formats` (comma-separated, default `mp4`),
/// `preserve_audio` (default true) and `optimize_level` (default balanced).
pub async fn start_conversion(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ConversionAccepted>)> {
    let temp_dir = state.orchestrator.config().temp_dir.clone();
    tokio::fs::create_dir_all(&temp_dir).await?;

    let mut saved: Option<(String, PathBuf)> = None;
    let result = read_upload(&state, multipart, &temp_dir, &mut saved).await;

    let (form, original_filename, source_path) = match (result, saved) {
        (Ok(form), Some((name, path))) => (form, name, path),
        (Ok(_), None) => {
            metrics::record_upload_rejected("missing_file");
            return Err(ApiError::bad_request("No file provided"));
        }
        (Err(e), saved) => {
            if let Some((_, path)) = saved {
                let _ = tokio::fs::remove_file(&path).await;
            }
            return Err(e);
        }
    };

    let job = match ConversionJob::new(
        original_filename,
        source_path.clone(),
        form.formats,
        form.preserve_audio,
        form.optimize_level,
    ) {
        Ok(job) => job,
        Err(e) => {
            let _ = tokio::fs::remove_file(&source_path).await;
            return Err(e.into());
        }
    };

    let request_id = job.id.clone();
    if !state.registry.insert(job.clone()).await {
        let _ = tokio::fs::remove_file(&source_path).await;
        return Err(ApiError::internal("Duplicate job ID"));
    }

    info!(
        job_id = %request_id,
        formats = ?job.formats,
        optimize_level = %job.optimize_level,
        "Conversion request accepted"
    );
    state.orchestrator.spawn(job);

    Ok((
        StatusCode::ACCEPTED,
        Json(ConversionAccepted {
            status: "processing",
            message: format!("Conversion started. Monitor at /convert/{}", request_id),
            request_id,
        }),
    ))
}

/// Drain the multipart stream, saving the file part under `temp_dir` and
/// validating the remaining fields. `saved` is set as soon as a file lands
/// on disk so the caller can remove it on any later error.
async fn read_upload(
    state: &AppState,
    mut multipart: Multipart,
    temp_dir: &FsPath,
    saved: &mut Option<(String, PathBuf)>,
) -> ApiResult<ConversionForm> {
    let mut formats_raw = None;
    let mut preserve_audio = true;
    let mut optimize_level = OptimizationLevel::default();

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if saved.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded"));
                }
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ApiError::bad_request("No file provided"))?;
                validate_upload(&filename, field.content_type())?;

                let path = temp_dir.join(format!("{}_{}", Uuid::new_v4(), sanitize_filename(&filename)));
                let mut file = tokio::fs::File::create(&path).await?;
                *saved = Some((filename, path));

                let limit = state.config.max_upload_bytes() as u64;
                let mut written: u64 = 0;
                while let Some(chunk) = field.chunk().await? {
                    written += chunk.len() as u64;
                    if written > limit {
                        metrics::record_upload_rejected("too_large");
                        return Err(ApiError::payload_too_large(format!(
                            "File size exceeds the maximum allowed size of {} MB",
                            state.config.max_upload_size_mb
                        )));
                    }
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                metrics::record_upload_accepted(written);
            }
            "formats" => formats_raw = Some(field.text().await?),
            "preserve_audio" => preserve_audio = parse_bool(&field.text().await?)?,
            "optimize_level" => optimize_level = field.text().await?.parse()?,
            _ => {}
        }
    }

    let formats = parse_formats(formats_raw.as_deref(), &state.config.supported_formats)?;

    Ok(ConversionForm {
        formats,
        preserve_audio,
        optimize_level,
    })
}

/// Check the extension against the accepted inputs and the declared
/// content type against `video/*`.
pub(crate) fn validate_upload(filename: &str, content_type: Option<&str>) -> ApiResult<()> {
    let extension = FsPath::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    if !INPUT_EXTENSIONS.contains(&extension.as_str()) {
        metrics::record_upload_rejected("extension");
        return Err(ApiError::validation(format!(
            "Unsupported file extension '{}'. Supported: {}",
            extension,
            INPUT_EXTENSIONS.join(", ")
        )));
    }

    let content_type = content_type.unwrap_or("application/octet-stream");
    if !content_type.starts_with("video/") && content_type != "application/octet-stream" {
        metrics::record_upload_rejected("content_type");
        return Err(ApiError::validation(format!("Unsupported file type: {}", content_type)));
    }

    Ok(())
}

/// Parse the `formats` field, defaulting to mp4.
pub(crate) fn parse_formats(raw: Option<&str>, supported: &[OutputFormat]) -> ApiResult<Vec<OutputFormat>> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).unwrap_or("mp4");
    let formats = OutputFormat::parse_list(raw)?;

    if let Some(format) = formats.iter().find(|f| !supported.contains(f)) {
        let supported: Vec<&str> = supported.iter().map(|f| f.as_str()).collect();
        return Err(ApiError::validation(format!(
            "Format '{}' is not supported. Supported formats: {}",
            format,
            supported.join(", ")
        )));
    }
    Ok(formats)
}

fn parse_bool(raw: &str) -> ApiResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ApiError::validation(format!("Invalid boolean for preserve_audio: {}", other))),
    }
}

/// Keep the basename and replace anything outside `[A-Za-z0-9._-]`.
pub(crate) fn sanitize_filename(filename: &str) -> String {
    let base = FsPath::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

async fn find_job(state: &AppState, request_id: &str) -> ApiResult<ConversionJob> {
    state
        .registry
        .get(&JobId::from_string(request_id))
        .await
        .ok_or_else(|| {
            warn!(request_id, "Request ID not found");
            ApiError::not_found(format!("Conversion request {} not found", request_id))
        })
}

/// Poll the status of a conversion request.
pub async fn get_conversion_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<ConversionStatus> {
    let job = find_job(&state, &request_id).await?;
    Ok(ConversionStatus::from_job(&job))
}

/// Full job record for a conversion request.
pub async fn get_conversion_logs(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<ConversionLogs>> {
    let job = find_job(&state, &request_id).await?;
    let processing_time = job.processing_time_secs();

    let mut logs = vec![
        format!("Job created at {}", job.created_at.to_rfc3339()),
        format!("Status: {}", job.status),
        format!("Processing time: {:.1} seconds", processing_time),
    ];
    if !job.failed_formats.is_empty() {
        let failed: Vec<&str> = job.failed_formats.iter().map(|f| f.as_str()).collect();
        logs.push(format!("Failed formats: {}", failed.join(", ")));
    }
    if let Some(error) = &job.error_message {
        logs.push(format!("Error: {}", error));
    }

    Ok(Json(ConversionLogs {
        job_info: job,
        processing_time,
        logs,
    }))
}

/// Accepted inputs, available outputs and optimization tiers.
pub async fn supported_formats(State(state): State<AppState>) -> Json<SupportedFormats> {
    Json(SupportedFormats {
        status: "success",
        data: SupportedFormatsData {
            input_formats: INPUT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            output_formats: state
                .config
                .supported_formats
                .iter()
                .map(|f| format!(".{}", f.extension()))
                .collect(),
            optimization_levels: OptimizationLevel::all().to_vec(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("holiday.MOV", Some("video/quicktime")).is_ok());
        assert!(validate_upload("clip.mkv", None).is_ok());
        assert!(validate_upload("clip.mp4", Some("application/octet-stream")).is_ok());
        assert!(validate_upload("notes.txt", Some("text/plain")).is_err());
        assert!(validate_upload("clip", Some("video/mp4")).is_err());
        assert!(validate_upload("clip.mp4", Some("image/png")).is_err());
    }

    #[test]
    fn test_parse_formats() {
        let all = OutputFormat::all();
        assert_eq!(parse_formats(None, &all).unwrap(), vec![OutputFormat::Mp4]);
        assert_eq!(
            parse_formats(Some("WEBM, mp4,webm"), &all).unwrap(),
            vec![OutputFormat::Webm, OutputFormat::Mp4]
        );
        assert!(parse_formats(Some("gif"), &all).is_err());
        assert!(parse_formats(Some("mov"), &[OutputFormat::Mp4]).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd.mp4"), "passwd.mp4");
        assert_eq!(sanitize_filename("my holiday (1).mov"), "my_holiday__1_.mov");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn test_partial_status_mapping() {
        let mut job = ConversionJob::new(
            "clip.mov",
            PathBuf::from("/tmp/clip.mov"),
            vec![OutputFormat::Mp4, OutputFormat::Webm],
            true,
            OptimizationLevel::Balanced,
        )
        .unwrap();
        job.original_size_mb = Some(10.0);
        job.start().unwrap();
        job.add_converted_file(OutputFormat::Mp4, "https://cdn.example.com/mp4/clip.mp4", 6.0);
        job.record_failed_format(OutputFormat::Webm);
        job.partially_complete("Failed formats: webm").unwrap();

        let body = serde_json::to_value(ConversionStatus::from_job(&job)).unwrap();
        assert_eq!(body["status"], "completed");
        assert_eq!(body["partial"], true);
        assert_eq!(body["converted_files"]["mp4"], "https://cdn.example.com/mp4/clip.mp4");
        assert_eq!(body["metadata"]["compression_ratio"]["mp4"], "40.0%");
        assert!(body["message"].as_str().unwrap().contains("webm"));
    }
}
