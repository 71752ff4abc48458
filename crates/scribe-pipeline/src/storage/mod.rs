//! S3-backed object storage
//!
//! One [`Storage`] per bucket. The inherent methods return `anyhow` errors with
//! context; the [`ObjectStore`] implementation folds them into
//! [`ScribeError::Storage`] for the pipeline.

use crate::services::ObjectStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use scribe_common::ScribeError;
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        force_path_style: bool,
    ) -> Self {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .force_path_style(force_path_style)
            .build();
        let storage = Self::from_client(Client::from_conf(s3_config), bucket, prefix);

        info!("Storage client initialized for {}", storage.location());

        storage
    }

    fn from_client(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Every object key under the configured prefix, following continuation
    /// tokens until the listing is exhausted.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn list(&self) -> Result<Vec<String>> {
        debug!("Listing objects in {}", self.location());

        let mut request = self.client.list_objects_v2().bucket(&self.bucket);
        if !self.prefix.is_empty() {
            request = request.prefix(&self.prefix);
        }

        let mut pages = request.into_paginator().send();
        let mut keys = Vec::new();

        while let Some(page) = pages.next().await {
            let page = page.context(format!("Failed to list objects in s3://{}", self.bucket))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key())
                    .filter(|key| is_object_key(key))
                    .map(str::to_string),
            );
        }

        info!(count = keys.len(), "Listed objects in {}", self.location());

        Ok(keys)
    }

    /// Object body, or `None` when the key does not exist.
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) => {
                debug!("No object at s3://{}/{}", self.bucket, key);
                return Ok(None);
            }
            Err(e) => {
                return Err(e).context(format!("Failed to download from S3: {}", key));
            }
        };

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(Some(data))
    }

    /// Store `data` under `key`. The SHA-256 of the body is logged for audit.
    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    pub async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let checksum = calculate_sha256(&data);
        let size = data.len();

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .context(format!("Failed to upload to S3: {}", key))?;

        info!(checksum = %checksum, size, "Uploaded to s3://{}/{}", self.bucket, key);

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn list_keys(&self) -> scribe_common::Result<Vec<String>> {
        self.list().await.map_err(storage_error)
    }

    async fn get(&self, key: &str) -> scribe_common::Result<Option<Vec<u8>>> {
        self.download(key).await.map_err(storage_error)
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> scribe_common::Result<()> {
        self.upload(key, body, content_type)
            .await
            .map_err(storage_error)
    }

    fn location(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

fn storage_error(e: anyhow::Error) -> ScribeError {
    ScribeError::Storage(format!("{:#}", e))
}

// Folder placeholder objects end in a slash and are not audio.
fn is_object_key(key: &str) -> bool {
    !key.is_empty() && !key.ends_with('/')
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
