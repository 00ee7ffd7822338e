//! Axum route handler for easify requests.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::documents::DocumentStore;
use crate::easify::{EasifyRequest, EasifyTarget, EASIFY_PROMPT_KEY, RESPONSES_COLLECTION};
use crate::errors::AppError;
use crate::generation::invocation::load;
use crate::generation::item::timestamp_now;
use crate::generation::sanitizer::parse_object;
use crate::llm_client::{CompletionService, Conversation, CHAT_MODEL};
use crate::state::AppState;
use crate::users::user_collection;

/// Explains the requested passage and stores request and answer under the user.
pub async fn easify(
    documents: &dyn DocumentStore,
    completions: &dyn CompletionService,
    request_prompt: &str,
    user_id: Uuid,
    request: &EasifyRequest,
) -> Result<Map<String, Value>, AppError> {
    let target =
        EasifyTarget::for_kind(&request.kind).map_err(|e| AppError::Validation(e.to_string()))?;
    let item_id = request
        .item
        .get("id")
        .and_then(Value::as_str)
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| AppError::Validation("item.id must be a document id".to_string()))?;

    let document = documents
        .get(target.collection, item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No document found for ID: {item_id}")))?;

    let excerpt = (target.extract)(&document.data, &request.item)
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let context = (target.context)(&document.data, &excerpt, request_prompt);

    let raw = completions
        .complete(CHAT_MODEL, &Conversation::single(context), target.max_tokens)
        .await?;
    let response = parse_object(&raw)
        .map_err(|e| AppError::UnusableOutput(format!("Invalid easify format: {e}")))?;

    let mut record = Map::new();
    record.insert("type".into(), Value::String(request.kind.clone()));
    record.insert("itemId".into(), Value::String(item_id.to_string()));
    record.insert(
        "request".into(),
        json!({ "type": request.kind, "item": request.item }),
    );
    record.insert("response".into(), Value::Object(response));
    record.insert("timestamp".into(), Value::String(timestamp_now()));

    let collection = user_collection(user_id, RESPONSES_COLLECTION);
    let id = documents.add(&collection, record.clone()).await?;
    info!("Saved {} easify response {id} for user {user_id}", request.kind);
    Ok(record)
}

/// POST /api/v1/users/:user_id/easify
pub async fn handle_easify(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<EasifyRequest>,
) -> Result<Json<Map<String, Value>>, AppError> {
    let invocation = load(&state, Some(EASIFY_PROMPT_KEY), None).await?;
    let prompt = invocation.prompt.as_deref().unwrap_or_default();
    let record = easify(
        invocation.documents.as_ref(),
        invocation.llm.completions.as_ref(),
        prompt,
        user_id,
        &request,
    )
    .await?;
    Ok(Json(record))
}
