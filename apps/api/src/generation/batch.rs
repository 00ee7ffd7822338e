//! Batch orchestrator.
//!
//! Items run strictly one after another. Per item: duplicate check, skip if
//! present, otherwise generate. Item-level errors are logged with the item
//! name and stage and never fail the batch.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::{DocumentError, DocumentStore};
use crate::generation::domains::DomainSpec;
use crate::generation::error::{GenerationError, Stage};
use crate::generation::guard;
use crate::generation::item::ItemGenerator;
use crate::models::work_item::WorkItem;

#[derive(Debug, Error)]
pub enum BatchInputError {
    #[error("message has no '{0}' array")]
    MissingItems(&'static str),

    #[error("invalid work item in '{key}': {source}")]
    InvalidItem {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes `{ <message_key>: [WorkItem] }`.
pub fn parse_work_items(
    spec: &DomainSpec,
    message: &Value,
) -> Result<Vec<WorkItem>, BatchInputError> {
    let items = message
        .get(spec.message_key)
        .filter(|v| v.is_array())
        .ok_or(BatchInputError::MissingItems(spec.message_key))?;
    serde_json::from_value(items.clone()).map_err(|source| BatchInputError::InvalidItem {
        key: spec.message_key,
        source,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedItem {
    pub name: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedItem {
    pub name: String,
    pub stage: String,
    pub error: String,
}

/// Aggregate result of one batch. Returned with a success status even when
/// some items failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub message: String,
    pub generated: Vec<GeneratedItem>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedItem>,
}

impl BatchSummary {
    fn fail(&mut self, item: &WorkItem, err: &GenerationError) {
        let stage = err.stage().to_string();
        error!(item = %item.name, stage = %stage, "Generation failed: {err}");
        self.failed.push(FailedItem {
            name: item.name.clone(),
            stage,
            error: err.to_string(),
        });
    }
}

pub async fn run(
    documents: &dyn DocumentStore,
    generator: &dyn ItemGenerator,
    items: &[WorkItem],
) -> BatchSummary {
    let spec = generator.spec();
    let mut summary = BatchSummary::default();
    info!("Processing {} {} item(s)", items.len(), spec.slug);

    for item in items {
        match guard::exists(documents, spec.collection, &item.name).await {
            Ok(true) => {
                info!("{} '{}' already exists. Skipping.", spec.slug, item.name);
                summary.skipped.push(item.name.clone());
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                summary.fail(item, &GenerationError::DuplicateCheck(e));
                continue;
            }
        }

        match generator.generate(item).await {
            Ok(record) => {
                info!("Generated {:?} '{}' ({})", record.domain, record.name, record.image());
                summary.generated.push(GeneratedItem {
                    name: record.name,
                    id: record.id,
                });
            }
            Err(GenerationError::Persist(DocumentError::Conflict { .. })) => {
                warn!(
                    item = %item.name,
                    stage = %Stage::Persist,
                    "Lost a race to a concurrent invocation. Skipping."
                );
                summary.skipped.push(item.name.clone());
            }
            Err(e) => summary.fail(item, &e),
        }
    }

    summary.message = format!("{} processed successfully.", spec.label);
    info!(
        "Batch done: {} generated, {} skipped, {} failed",
        summary.generated.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
    summary
}
