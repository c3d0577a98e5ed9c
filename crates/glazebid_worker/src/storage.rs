//! Object store client.
//!
//! MinIO speaks the S3 API, so the production implementation is a thin
//! wrapper over `aws-sdk-s3` with path-style addressing and static
//! credentials. The trait seam keeps stage code independent of the SDK
//! and lets tests run against an in-memory store. No retries happen in
//! here; callers decide what a failure means.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub const BUCKET_RAW_UPLOADS: &str = "raw-uploads";
pub const BUCKET_PAGE_CACHE: &str = "page-cache";
pub const BUCKET_OUTPUTS: &str = "outputs";

pub const ALL_BUCKETS: &[&str] = &[BUCKET_RAW_UPLOADS, BUCKET_PAGE_CACHE, BUCKET_OUTPUTS];

/// Conventional key of a job's source PDF when no storage-object row
/// records the authoritative one.
pub fn source_pdf_key(project_id: &str, job_id: &str) -> String {
    format!("{}/{}/source.pdf", project_id, job_id)
}

/// Page raster key inside the page-cache bucket.
pub fn page_render_key(job_id: &str, prefix: &str, page_num: u32, ext: &str) -> String {
    format!("{}/{}-{:04}.{}", job_id, prefix, page_num, ext)
}

/// Artifact key inside the outputs bucket.
pub fn artifact_key(project_id: &str, job_id: &str, filename: &str) -> String {
    format!("{}/{}/{}", project_id, job_id, filename)
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store request failed: {0}")]
    Request(String),

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Blob operations the worker needs. Failures are recoverable for the
/// caller except on `download`, which is fatal to the running stage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, bucket: &str, key: &str, local_path: &Path)
        -> Result<(), StorageError>;

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Idempotent: a bucket that already exists is a no-op.
    async fn ensure_buckets(&self) -> Result<(), StorageError>;
}

/// Production store backed by the S3 API.
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: &Config) -> Self {
        let credentials = Credentials::new(
            config.minio_access_key.clone(),
            config.minio_secret_key.clone(),
            None,
            None,
            "worker-env",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(config.minio_endpoint_url())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        S3Store {
            client: Client::from_conf(s3_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Request(service.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?
            .into_bytes();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;
        info!(
            "Downloaded {}/{} -> {} ({} bytes)",
            bucket,
            key,
            local_path.display(),
            data.len()
        );
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        info!("Uploaded {} -> {}/{}", local_path.display(), bucket, key);
        Ok(())
    }

    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        info!("Uploaded {} bytes -> {}/{}", size, bucket, key);
        Ok(())
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;
        Ok(())
    }

    async fn ensure_buckets(&self) -> Result<(), StorageError> {
        for bucket in ALL_BUCKETS {
            if self
                .client
                .head_bucket()
                .bucket(*bucket)
                .send()
                .await
                .is_ok()
            {
                continue;
            }
            match self.client.create_bucket().bucket(*bucket).send().await {
                Ok(_) => info!("Created bucket {}", bucket),
                Err(e) => {
                    let service = e.into_service_error();
                    if service.is_bucket_already_owned_by_you()
                        || service.is_bucket_already_exists()
                    {
                        continue;
                    }
                    return Err(StorageError::Request(service.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// In-memory store for tests: blobs keyed by (bucket, key).
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), (Vec<u8>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (bytes, "application/octet-stream".to_string()),
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(bytes, _)| bytes.clone())
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(_, ct)| ct.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let bytes = self.get(bucket, key).ok_or_else(|| StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, bytes).await?;
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(local_path).await?;
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (bytes, content_type.to_string()),
        );
        Ok(())
    }

    async fn upload_bytes(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            (bytes, content_type.to_string()),
        );
        Ok(())
    }

    async fn remove(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn ensure_buckets(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_conventions() {
        assert_eq!(source_pdf_key("p1", "j1"), "p1/j1/source.pdf");
        assert_eq!(page_render_key("j1", "thumb", 3, "png"), "j1/thumb-0003.png");
        assert_eq!(page_render_key("j1", "measure", 41, "jpg"), "j1/measure-0041.jpg");
        assert_eq!(artifact_key("p1", "j1", "bid-v2.pdf"), "p1/j1/bid-v2.pdf");
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        store
            .upload_bytes(BUCKET_PAGE_CACHE, "j1/thumb-0001.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(
            store.get(BUCKET_PAGE_CACHE, "j1/thumb-0001.png"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(
            store.content_type(BUCKET_PAGE_CACHE, "j1/thumb-0001.png").as_deref(),
            Some("image/png")
        );

        store.remove(BUCKET_PAGE_CACHE, "j1/thumb-0001.png").await.unwrap();
        assert!(store.get(BUCKET_PAGE_CACHE, "j1/thumb-0001.png").is_none());
        // Removing a blob that does not exist is non-fatal.
        store.remove(BUCKET_PAGE_CACHE, "missing").await.unwrap();
    }

    #[tokio::test]
    async fn memory_store_download_missing_is_not_found() {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir().unwrap();
        let err = store
            .download(BUCKET_RAW_UPLOADS, "nope", &dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
