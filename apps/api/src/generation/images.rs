//! Image resolution for generated records.
//!
//! Resolution order: the work item's own image, then an image the model put
//! in the record, then a freshly generated one. Generation failures never
//! fail the record; it is persisted with an empty image.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::generation::domains::ImagePrompt;
use crate::generation::error::{GenerationError, ImageError, Stage};
use crate::llm_client::prompts::NAME_PLACEHOLDER;
use crate::llm_client::ImageService;
use crate::models::work_item::WorkItem;
use crate::storage::{asset_key, ObjectStore};

pub const IMAGE_CONTENT_TYPE: &str = "image/png";

/// Generates an image, downloads it and re-hosts it in the object store.
#[derive(Clone)]
pub struct ImageGenerator {
    service: Arc<dyn ImageService>,
    store: Arc<dyn ObjectStore>,
    model: &'static str,
}

impl ImageGenerator {
    pub fn new(
        service: Arc<dyn ImageService>,
        store: Arc<dyn ObjectStore>,
        model: &'static str,
    ) -> Self {
        Self {
            service,
            store,
            model,
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Returns the public URL of the stored asset.
    pub async fn generate_and_store(
        &self,
        prompt: &str,
        name: &str,
        user_id: Option<&str>,
    ) -> Result<String, ImageError> {
        info!("Generating image for {name}");
        let generated_url = self.service.generate_image(self.model, prompt).await?;
        let bytes = self.service.download(&generated_url).await?;
        let key = asset_key(name, user_id, Utc::now().timestamp_millis());
        let url = self.store.put(&key, bytes, IMAGE_CONTENT_TYPE).await?;
        info!("Stored image for {name} at {url}");
        Ok(url)
    }
}

/// Image generation configured for one domain in one invocation.
#[derive(Clone)]
pub struct ImageStage {
    pub generator: ImageGenerator,
    pub policy: ImagePrompt,
    /// Fetched template for `ImagePrompt::FromTemplate`.
    pub template: Option<String>,
}

impl ImageStage {
    pub fn prompt_for(&self, name: &str, record: &Map<String, Value>) -> Result<Option<String>, ImageError> {
        build_image_prompt(self.policy, self.template.as_deref(), name, record)
    }
}

pub fn build_image_prompt(
    policy: ImagePrompt,
    template: Option<&str>,
    name: &str,
    record: &Map<String, Value>,
) -> Result<Option<String>, ImageError> {
    match policy {
        ImagePrompt::None => Ok(None),
        ImagePrompt::FromDescription { suffix } => {
            let description = record
                .get("description")
                .and_then(Value::as_str)
                .ok_or(ImageError::MissingPromptSource("description"))?;
            Ok(Some(format!("{description}{suffix}")))
        }
        ImagePrompt::FromTemplate { prompt_key } => {
            let template = template.ok_or(ImageError::MissingPromptSource(prompt_key))?;
            Ok(Some(template.replacen(NAME_PLACEHOLDER, name, 1)))
        }
    }
}

/// Picks the image URL for a record. Never fails: errors are logged and
/// produce an empty URL.
pub async fn resolve_image(
    stage: Option<&ImageStage>,
    item: &WorkItem,
    record: &Map<String, Value>,
) -> String {
    if let Some(image) = &item.image {
        info!("Using provided image URL for {}", item.name);
        return image.clone();
    }
    if let Some(image) = record
        .get("image")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
    {
        info!("Using model-supplied image URL for {}", item.name);
        return image.to_string();
    }

    let Some(stage) = stage else {
        return String::new();
    };

    let outcome = match stage.prompt_for(&item.name, record) {
        Ok(Some(prompt)) => stage
            .generator
            .generate_and_store(&prompt, &item.name, None)
            .await,
        Ok(None) => return String::new(),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(url) => url,
        Err(e) => {
            let err = GenerationError::from(e);
            error!(item = %item.name, stage = %Stage::Image, "Using placeholder image: {err}");
            String::new()
        }
    }
}
