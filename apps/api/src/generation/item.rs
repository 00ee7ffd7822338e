//! Item generator: one work item in, one persisted record out.
//!
//! Flow: build conversation → completion → sanitize + parse → resolve image
//! → normalize → stamp `createdDate` → `add` to the domain collection.
//!
//! Completion and image spend is incurred before persistence: a parse or
//! persist failure leaves "spent tokens, no record".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::documents::DocumentStore;
use crate::generation::domains::{DomainSpec, GeneratorKind, ImagePrompt};
use crate::generation::error::{GenerationError, Stage};
use crate::generation::guard::NATURAL_KEY;
use crate::generation::images::{resolve_image, ImageStage};
use crate::generation::normalize::normalize_record;
use crate::generation::sanitizer::parse_object;
use crate::llm_client::{CompletionService, Conversation};
use crate::models::record::GeneratedRecord;
use crate::models::work_item::WorkItem;

/// Anything the batch orchestrator can run per work item.
#[async_trait]
pub trait ItemGenerator: Send + Sync {
    fn spec(&self) -> &'static DomainSpec;

    /// Generates and persists the record for `item`.
    async fn generate(&self, item: &WorkItem) -> Result<GeneratedRecord, GenerationError>;
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-03-07T09:15:02.123Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Rejects a parsed body that carries nothing beyond the natural key, or
/// that lacks one of `required`. Null counts as missing.
pub fn check_required(
    body: &Map<String, Value>,
    required: &[&str],
    stage: Stage,
) -> Result<(), GenerationError> {
    if body.keys().all(|key| key == NATURAL_KEY) {
        return Err(GenerationError::parse(stage, "empty record"));
    }
    match required
        .iter()
        .find(|field| body.get(**field).map_or(true, Value::is_null))
    {
        Some(field) => Err(GenerationError::parse(
            stage,
            format!("missing required field '{field}'"),
        )),
        None => Ok(()),
    }
}

/// Shared tail of every generator: image, normalization, timestamp, write.
#[derive(Clone)]
pub struct RecordSink {
    spec: &'static DomainSpec,
    documents: Arc<dyn DocumentStore>,
    images: Option<ImageStage>,
}

impl RecordSink {
    pub fn new(
        spec: &'static DomainSpec,
        documents: Arc<dyn DocumentStore>,
        images: Option<ImageStage>,
    ) -> Self {
        Self {
            spec,
            documents,
            images,
        }
    }

    pub async fn persist(
        &self,
        item: &WorkItem,
        mut body: Map<String, Value>,
    ) -> Result<GeneratedRecord, GenerationError> {
        // The persisted natural key is the requested name, so the duplicate
        // guard and the unique index see the same key.
        body.insert(NATURAL_KEY.into(), Value::String(item.name.clone()));

        if self.spec.image != ImagePrompt::None || item.image.is_some() {
            let image = resolve_image(self.images.as_ref(), item, &body).await;
            body.insert("image".into(), Value::String(image));
        }

        normalize_record(&mut body, self.spec.normalize);
        body.insert("createdDate".into(), Value::String(timestamp_now()));

        let id = self
            .documents
            .add(self.spec.collection, body.clone())
            .await
            .map_err(GenerationError::Persist)?;

        info!(
            "Saved {} '{}' to '{}' with id {id}",
            self.spec.slug, item.name, self.spec.collection
        );

        Ok(GeneratedRecord {
            id,
            domain: self.spec.domain,
            name: item.name.clone(),
            data: body,
        })
    }
}

/// Single completion call per item, prompt template from configuration.
pub struct SingleShotGenerator {
    spec: &'static DomainSpec,
    completions: Arc<dyn CompletionService>,
    request_prompt: String,
    build_request: fn(&str, &str, NaiveDate) -> String,
    max_tokens: u32,
    sink: RecordSink,
}

impl SingleShotGenerator {
    /// Returns `None` if `spec` is not a single-shot domain.
    pub fn new(
        spec: &'static DomainSpec,
        completions: Arc<dyn CompletionService>,
        request_prompt: String,
        sink: RecordSink,
    ) -> Option<Self> {
        let GeneratorKind::SingleShot {
            build_request,
            max_tokens,
            ..
        } = spec.generator
        else {
            return None;
        };
        Some(Self {
            spec,
            completions,
            request_prompt,
            build_request,
            max_tokens,
            sink,
        })
    }

    fn conversation(&self, name: &str, today: NaiveDate) -> Conversation {
        Conversation::single((self.build_request)(name, &self.request_prompt, today))
    }
}

#[async_trait]
impl ItemGenerator for SingleShotGenerator {
    fn spec(&self) -> &'static DomainSpec {
        self.spec
    }

    async fn generate(&self, item: &WorkItem) -> Result<GeneratedRecord, GenerationError> {
        let conversation = self.conversation(&item.name, Utc::now().date_naive());
        debug!("Prepared conversation for {}: {:?}", item.name, conversation);

        let raw = self
            .completions
            .complete(self.spec.model, &conversation, self.max_tokens)
            .await
            .map_err(|source| GenerationError::Completion {
                stage: Stage::Record,
                source,
            })?;
        debug!("Completion for {}: {raw}", item.name);

        let body = parse_object(&raw)
            .map_err(|e| GenerationError::parse(Stage::Record, e.to_string()))?;
        check_required(&body, self.spec.required, Stage::Record)?;

        self.sink.persist(item, body).await
    }
}
