use crate::config::{StorageBackend, StorageConfig};
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use service_core::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;

/// Read-only access to the object store holding the context mapping.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.base_path.join(key);
        fs::read(&path).await.map_err(|e| {
            AppError::InternalError(anyhow::anyhow!(
                "Local read of {} failed: {}",
                path.display(),
                e
            ))
        })
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build a client from the default AWS credential chain
    /// (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, profiles, ...).
    pub async fn from_env(bucket: String, region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::new(S3Client::new(&sdk_config), bucket)
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!(
                    "S3 download failed: {}",
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| {
                AppError::InternalError(anyhow::anyhow!("S3 body collection failed: {}", e))
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }
}

/// Build the storage backend selected by configuration.
pub async fn build_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, AppError> {
    match config.backend {
        StorageBackend::Local => {
            let storage = LocalStorage::new(&config.local_path).await.map_err(|e| {
                tracing::error!(
                    "Failed to initialize local storage at {}: {}",
                    config.local_path,
                    e
                );
                e
            })?;
            tracing::info!(path = %config.local_path, "Using local storage");
            Ok(Arc::new(storage))
        }
        StorageBackend::S3 => {
            let bucket = config.s3_bucket.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("S3 bucket not configured"))
            })?;
            tracing::info!(bucket = %bucket, region = ?config.s3_region, "Using S3 storage");
            Ok(Arc::new(
                S3Storage::from_env(bucket, config.s3_region.clone()).await,
            ))
        }
    }
}
