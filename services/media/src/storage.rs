//! Attachment stores

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{Client, primitives::ByteStream};
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{MediaError, MediaResult},
    file_types::{content_type_for, ensure_supported, sanitize_filename},
    models::{StoredAttachment, UploadOptions, UploadedFile},
};

/// Object key for an upload: `<folder>/<uuid>/<filename>`
pub fn object_key(options: &UploadOptions, filename: &str) -> String {
    format!(
        "{}/{}/{}",
        options.folder.trim_matches('/'),
        Uuid::new_v4(),
        sanitize_filename(filename)
    )
}

/// Storage for appointment attachments
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Check the file type, store the bytes and return where they live
    async fn upload(
        &self,
        file: &UploadedFile,
        options: &UploadOptions,
    ) -> MediaResult<StoredAttachment>;
}

/// Bucket settings for [`S3AttachmentStore`]
#[derive(Debug, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub public_base_url: String,
}

impl S3StorageConfig {
    /// Public URLs default to the bucket's virtual-hosted endpoint
    pub fn new(bucket: impl Into<String>, public_base_url: Option<String>) -> Self {
        let bucket = bucket.into();
        let public_base_url = public_base_url
            .unwrap_or_else(|| format!("https://{}.s3.amazonaws.com", bucket));

        Self {
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Attachment store writing to an S3 bucket
#[derive(Clone)]
pub struct S3AttachmentStore {
    s3_client: Client,
    config: S3StorageConfig,
}

impl S3AttachmentStore {
    pub fn new(s3_client: Client, config: S3StorageConfig) -> Self {
        Self { s3_client, config }
    }

    /// Build a client from the default AWS credential chain
    pub async fn connect(config: S3StorageConfig) -> Self {
        let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&aws_config), config)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.config.public_base_url, key)
    }
}

#[async_trait]
impl AttachmentStore for S3AttachmentStore {
    async fn upload(
        &self,
        file: &UploadedFile,
        options: &UploadOptions,
    ) -> MediaResult<StoredAttachment> {
        ensure_supported(&file.filename)?;

        let key = object_key(options, &file.filename);
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(&file.filename).to_string());

        self.s3_client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(file.bytes.clone()))
            .content_type(&content_type)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to upload {} to {}: {}", key, self.config.bucket, e);
                MediaError::UploadFailed(file.filename.clone())
            })?;

        info!("Uploaded attachment {} ({} bytes)", key, file.bytes.len());

        Ok(StoredAttachment {
            url: self.public_url(&key),
            filename: sanitize_filename(&file.filename),
            mimetype: content_type,
        })
    }
}

/// Process-local attachment store for development and tests
#[derive(Clone, Default)]
pub struct InMemoryAttachmentStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored under `url`, if any
    pub async fn get(&self, url: &str) -> Option<Vec<u8>> {
        let key = url.strip_prefix("memory://")?;
        self.objects.read().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl AttachmentStore for InMemoryAttachmentStore {
    async fn upload(
        &self,
        file: &UploadedFile,
        options: &UploadOptions,
    ) -> MediaResult<StoredAttachment> {
        ensure_supported(&file.filename)?;

        let key = object_key(options, &file.filename);
        self.objects
            .write()
            .await
            .insert(key.clone(), file.bytes.clone());

        Ok(StoredAttachment {
            url: format!("memory://{}", key),
            filename: sanitize_filename(&file.filename),
            mimetype: file
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for(&file.filename).to_string()),
        })
    }
}
