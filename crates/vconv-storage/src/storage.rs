//! Storage collaborator interface.

use async_trait::async_trait;
use std::path::Path;

use vconv_models::OutputFormat;

use crate::error::StorageResult;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedObject {
    /// Publicly reachable URL of the object
    pub url: String,
    /// Uploaded size in megabytes
    pub size_mb: f64,
}

/// Durable object storage for converted files.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `path` under `key`.
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<UploadedObject>;

    /// Delete the object stored under `key`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Confirm the backend is reachable. Backends without a cheap check
    /// report healthy.
    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// MIME type for a local file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

/// Object key for a converted file: `{format}/{stem}.{ext}`.
pub fn object_key_for(path: &Path, format: OutputFormat) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    format!("{}/{}.{}", format.as_str(), stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.WEBM")), "video/webm");
        assert_eq!(content_type_for(Path::new("a.mov")), "video/quicktime");
        assert_eq!(content_type_for(Path::new("a.mkv")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn test_object_key() {
        let key = object_key_for(Path::new("/tmp/jobs/1234_clip_converted.webm"), OutputFormat::Webm);
        assert_eq!(key, "webm/1234_clip_converted.webm");
    }
}
