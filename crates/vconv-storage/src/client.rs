//! R2 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::storage::{content_type_for, ObjectStorage, UploadedObject};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL objects are served from
    pub public_url: String,
}

impl R2Config {
    /// Read `R2_*` variables. Only the region has a default (`auto`).
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: required_env("R2_ENDPOINT_URL")?,
            access_key_id: required_env("R2_ACCESS_KEY_ID")?,
            secret_access_key: required_env("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required_env("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_url: required_env("R2_PUBLIC_URL")?,
        })
    }

    /// Public URL for an object key.
    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_url.trim_end_matches('/'), key)
    }
}

fn required_env(key: &'static str) -> StorageResult<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(StorageError::MissingConfig(key))
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    config: R2Config,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub fn new(config: R2Config) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            config,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(R2Config::from_env()?))
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket_name
    }

    /// Upload a converted file under `key`, tagged with the content type
    /// of its extension. Returns the public URL and the size in MB.
    pub async fn upload_file(&self, path: &Path, key: &str) -> StorageResult<UploadedObject> {
        let size_mb = local_size_mb(path).await?;
        let content_type = content_type_for(path);
        debug!(key, content_type, size_mb, "Uploading {}", path.display());

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: cannot read {}: {}", key, path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;

        info!(key, bucket = %self.config.bucket_name, "Uploaded {:.2} MB", size_mb);

        Ok(UploadedObject {
            url: self.config.public_url_for(key),
            size_mb,
        })
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(key, e.to_string()))?;

        Ok(())
    }

    /// HEAD the bucket to confirm credentials and endpoint.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket_name)
            .send()
            .await
            .map_err(|e| StorageError::Unreachable(format!("head bucket {}: {}", self.config.bucket_name, e)))?;
        Ok(())
    }
}

/// Size of a local file in MB, mapping a missing file to
/// [`StorageError::FileNotFound`].
async fn local_size_mb(path: &Path) -> StorageResult<f64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len() as f64 / BYTES_PER_MB),
        Ok(_) => Err(StorageError::FileNotFound(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::FileNotFound(path.to_path_buf())),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectStorage for R2Client {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<UploadedObject> {
        self.upload_file(path, key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.delete_object(key).await
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        R2Client::check_connectivity(self).await
    }
}
