//! Secret / config loader.
//!
//! Named values (API credentials, prompt templates, the document-store
//! credential) live as JSON objects in a blob container. A lookup names the
//! container, the object key and optionally a field inside the object.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to read {container}/{key}: {message}")]
    Fetch {
        container: String,
        key: String,
        message: String,
    },

    #[error("{container}/{key} is not valid JSON: {source}")]
    Decode {
        container: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("field '{field}' missing from {container}/{key}")]
    MissingField {
        container: String,
        key: String,
        field: String,
    },

    #[error("field '{field}' has unexpected shape: {source}")]
    Shape {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches the raw bytes of one object.
    async fn fetch(&self, container: &str, key: &str) -> Result<Vec<u8>, SecretError>;

    /// Returns `field` of the JSON object at `container/key`, or the whole
    /// object when `field` is `None`.
    async fn get(
        &self,
        container: &str,
        key: &str,
        field: Option<&str>,
    ) -> Result<Value, SecretError> {
        debug!("Fetching {:?} from {container}/{key}", field);
        let bytes = self.fetch(container, key).await?;
        let mut object: Value =
            serde_json::from_slice(&bytes).map_err(|source| SecretError::Decode {
                container: container.to_string(),
                key: key.to_string(),
                source,
            })?;

        match field {
            None => Ok(object),
            Some(field) => object
                .get_mut(field)
                .filter(|v| !v.is_null())
                .map(Value::take)
                .ok_or_else(|| SecretError::MissingField {
                    container: container.to_string(),
                    key: key.to_string(),
                    field: field.to_string(),
                }),
        }
    }
}

/// Typed lookup on top of [`SecretStore::get`].
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn SecretStore,
    container: &str,
    key: &str,
    field: Option<&str>,
) -> Result<T, SecretError> {
    let value = store.get(container, key, field).await?;
    serde_json::from_value(value).map_err(|source| SecretError::Shape {
        field: field.unwrap_or("<root>").to_string(),
        source,
    })
}

/// Secret store backed by S3 objects.
pub struct S3SecretStore {
    client: aws_sdk_s3::Client,
}

impl S3SecretStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for S3SecretStore {
    async fn fetch(&self, container: &str, key: &str) -> Result<Vec<u8>, SecretError> {
        let fetch_error = |message: String| SecretError::Fetch {
            container: container.to_string(),
            key: key.to_string(),
            message,
        };

        let object = self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        let body = object
            .body
            .collect()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        Ok(body.into_bytes().to_vec())
    }
}
