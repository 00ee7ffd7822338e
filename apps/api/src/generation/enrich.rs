//! Follow-up workflows that mutate already generated records by document id:
//! filling in industry details and re-creating missing images.
//!
//! Both are log-and-continue per document.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::{Document, DocumentError, DocumentStore};
use crate::generation::images::ImageGenerator;
use crate::generation::item::timestamp_now;
use crate::generation::normalize::{normalize_record, NormalizedField};
use crate::generation::sanitizer::parse_object;
use crate::llm_client::prompts::NAME_PLACEHOLDER;
use crate::llm_client::{CompletionService, Conversation};

pub const INDUSTRY_COLLECTION: &str = "industries";
pub const DETAIL_MAX_TOKENS: u32 = 4096;
pub const BACKFILL_SCAN_LIMIT: i64 = 100;
pub const DEFAULT_BACKFILL_COLLECTION: &str = "workouts";
pub const DEFAULT_BACKFILL_COUNT: usize = 5;

#[derive(Debug, Default, Serialize)]
pub struct EnrichSummary {
    pub message: String,
    pub updated: Vec<String>,
    pub failed: Vec<String>,
}

fn needs_details(document: &Document) -> bool {
    document
        .data
        .get("updatedDate")
        .map_or(true, Value::is_null)
}

fn name_of(document: &Document) -> String {
    document.str_field("name").unwrap_or_default().to_string()
}

async fn detail_industry(
    documents: &dyn DocumentStore,
    completions: &dyn CompletionService,
    model: &str,
    prompt: &str,
    document: &Document,
) -> Result<(), String> {
    let name = name_of(document);
    let conversation = Conversation::single(format!("Industry name: {name}. {prompt}"));
    let raw = completions
        .complete(model, &conversation, DETAIL_MAX_TOKENS)
        .await
        .map_err(|e| e.to_string())?;
    let mut details = parse_object(&raw).map_err(|e| e.to_string())?;
    normalize_record(&mut details, &[NormalizedField::Category]);

    let mut fields = Map::new();
    fields.insert("detailedInfo".into(), Value::Object(details));
    fields.insert("updatedDate".into(), Value::String(timestamp_now()));
    documents
        .set_merge(INDUSTRY_COLLECTION, document.id, fields)
        .await
        .map_err(|e| e.to_string())
}

/// Adds `detailedInfo` to every industry that has no `updatedDate` yet.
pub async fn populate_industry_details(
    documents: &dyn DocumentStore,
    completions: &dyn CompletionService,
    model: &str,
    prompt: &str,
) -> Result<EnrichSummary, DocumentError> {
    let all = documents.list(INDUSTRY_COLLECTION, i64::MAX).await?;
    let candidates: Vec<&Document> = all.iter().filter(|d| needs_details(d)).collect();
    info!(
        "Found {} industries, {} to process",
        all.len(),
        candidates.len()
    );

    let mut summary = EnrichSummary::default();
    for document in candidates {
        let name = name_of(document);
        match detail_industry(documents, completions, model, prompt, document).await {
            Ok(()) => {
                info!("Saved details for industry '{name}' ({})", document.id);
                summary.updated.push(name);
            }
            Err(e) => {
                error!(item = %name, stage = "populate", "Error processing industry: {e}");
                summary.failed.push(name);
            }
        }
    }
    summary.message = "Industries processed successfully.".into();
    Ok(summary)
}

struct MissingImage {
    id: Uuid,
    name: String,
    previous: String,
}

/// Last path segment of an asset URL, which is its object key.
fn object_key(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|key| !key.is_empty())
}

async fn find_missing_images(
    documents: &dyn DocumentStore,
    images: &ImageGenerator,
    collection: &str,
    count: usize,
) -> Result<Vec<MissingImage>, DocumentError> {
    let scanned = documents.list(collection, BACKFILL_SCAN_LIMIT).await?;
    let mut missing = Vec::new();

    for document in &scanned {
        if missing.len() >= count {
            break;
        }
        let name = name_of(document);
        let image = document.str_field("image").unwrap_or_default();
        if image.is_empty() {
            info!("'{name}' has no image");
            missing.push(MissingImage {
                id: document.id,
                name,
                previous: String::new(),
            });
            continue;
        }

        let Some(key) = object_key(image) else {
            warn!("Unable to extract an object key from {image}");
            continue;
        };
        match images.store().exists(key).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Image {key} for '{name}' is not in the bucket");
                missing.push(MissingImage {
                    id: document.id,
                    name,
                    previous: image.to_string(),
                });
            }
            Err(e) => error!(item = %name, stage = "image", "Error checking image: {e}"),
        }
    }
    Ok(missing)
}

/// Regenerates up to `count` missing images in `collection`.
pub async fn backfill_images(
    documents: &dyn DocumentStore,
    images: &ImageGenerator,
    template: &str,
    collection: &str,
    count: usize,
) -> Result<EnrichSummary, DocumentError> {
    let missing = find_missing_images(documents, images, collection, count).await?;
    info!("Found {} records to process in '{collection}'", missing.len());

    let mut summary = EnrichSummary::default();
    for record in missing {
        let prompt = template.replacen(NAME_PLACEHOLDER, &record.name, 1);
        let url = match images.generate_and_store(&prompt, &record.name, None).await {
            Ok(url) => url,
            Err(e) => {
                error!(item = %record.name, stage = "image", "Failed to generate image: {e}");
                summary.failed.push(record.name.clone());
                record.previous.clone()
            }
        };

        let mut fields = Map::new();
        fields.insert("image".into(), Value::String(url));
        match documents.set_merge(collection, record.id, fields).await {
            Ok(()) => summary.updated.push(record.name),
            Err(e) => {
                error!(item = %record.name, stage = "persist", "Failed to update image: {e}");
                summary.failed.push(record.name);
            }
        }
    }
    summary.message = "Images generated and updated successfully".into();
    Ok(summary)
}
