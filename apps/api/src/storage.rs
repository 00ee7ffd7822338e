//! Object storage for generated image assets.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("upload of {key} failed: {message}")]
    Put { key: String, message: String },

    #[error("existence check of {key} failed: {message}")]
    Head { key: String, message: String },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key` and returns the object's public URL.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str)
        -> Result<String, ObjectStoreError>;

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
}

/// Builds the asset key for a generated image:
/// `[<user_id>/]<name with whitespace runs as '_', lowercased>_<unix_millis>.png`.
/// Leading and trailing runs are replaced too, never trimmed.
pub fn asset_key(name: &str, user_id: Option<&str>, unix_millis: i64) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_run = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_run {
                slug.push('_');
            }
            in_run = true;
        } else {
            slug.extend(c.to_lowercase());
            in_run = false;
        }
    }
    match user_id {
        Some(user) => format!("{user}/{slug}_{unix_millis}.png"),
        None => format!("{slug}_{unix_millis}.png"),
    }
}

/// S3-backed object store. Public URLs are `<public_base>/<bucket>/<key>`.
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base: String,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, public_base: &str) -> Self {
        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, ObjectStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Put {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        info!("Uploaded asset to s3://{}/{}", self.bucket, key);
        Ok(self.public_url(key))
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map_or(false, |se| se.is_not_found()) => Ok(false),
            Err(e) => Err(ObjectStoreError::Head {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
