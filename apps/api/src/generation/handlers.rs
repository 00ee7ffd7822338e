//! Axum route handlers for the Generation API, plus the course queue worker.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::errors::AppError;
use crate::generation::batch::{self, parse_work_items, BatchSummary};
use crate::generation::domains::Domain;
use crate::generation::enrich::{
    self, EnrichSummary, DEFAULT_BACKFILL_COLLECTION, DEFAULT_BACKFILL_COUNT,
};
use crate::generation::fanout::{self, parse_course_names, CourseRequest};
use crate::generation::images::ImageGenerator;
use crate::generation::invocation::{load, load_generator};
use crate::llm_client::{CHAT_MODEL, IMAGE_MODEL};
use crate::models::work_item::WorkItem;
use crate::state::AppState;

pub const POPULATE_INDUSTRY_PROMPT: &str = "populateIndustryPrompt";
pub const BACKFILL_IMAGE_PROMPT: &str = "workoutImageRequest";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub message: String,
    pub published: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackfillRequest {
    pub collection: Option<String>,
    pub count: Option<usize>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/batches/:domain
///
/// Runs one inbound batch message `{ <messageKey>: [WorkItem] }`. Returns 200
/// with a summary even when individual items failed.
pub async fn handle_batch(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(message): Json<Value>,
) -> Result<Json<BatchSummary>, AppError> {
    let domain = Domain::from_slug(&slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown domain '{slug}'")))?;
    let spec = domain.spec();
    let items = parse_work_items(spec, &message).map_err(|e| AppError::Validation(e.to_string()))?;

    let (invocation, generator) = load_generator(&state, spec).await?;
    let summary = batch::run(invocation.documents.as_ref(), generator.as_ref(), &items).await;
    Ok(Json(summary))
}

/// POST /api/v1/courses/queue
///
/// Publishes one `{ courseName }` message per course to the course topic.
pub async fn handle_queue_courses(
    State(state): State<AppState>,
    Json(message): Json<Value>,
) -> Result<Json<QueueResponse>, AppError> {
    let names = parse_course_names(&message).ok_or_else(|| {
        AppError::Validation("Input should be an array of course names.".to_string())
    })?;

    let published =
        fanout::dispatch(state.publisher.as_ref(), &state.config.course_topic, &names).await?;
    Ok(Json(QueueResponse {
        message: "All messages sent successfully".to_string(),
        published,
    }))
}

/// POST /api/v1/courses/generate
///
/// Generates one course, the same way the queue worker does.
pub async fn handle_generate_course(
    State(state): State<AppState>,
    Json(request): Json<CourseRequest>,
) -> Result<Json<BatchSummary>, AppError> {
    if request.course_name.trim().is_empty() {
        return Err(AppError::Validation("courseName cannot be empty".to_string()));
    }
    let summary = generate_course(&state, &request.course_name).await?;
    Ok(Json(summary))
}

/// POST /api/v1/industries/populate
pub async fn handle_populate_industries(
    State(state): State<AppState>,
) -> Result<Json<EnrichSummary>, AppError> {
    let invocation = load(&state, Some(POPULATE_INDUSTRY_PROMPT), None).await?;
    let prompt = invocation.prompt.as_deref().unwrap_or_default();
    let summary = enrich::populate_industry_details(
        invocation.documents.as_ref(),
        invocation.llm.completions.as_ref(),
        CHAT_MODEL,
        prompt,
    )
    .await?;
    Ok(Json(summary))
}

/// POST /api/v1/images/backfill
///
/// Body is optional; defaults to 5 images in `workouts`.
pub async fn handle_backfill_images(
    State(state): State<AppState>,
    request: Option<Json<BackfillRequest>>,
) -> Result<Json<EnrichSummary>, AppError> {
    let Json(request) = request.unwrap_or_default();
    let collection = request
        .collection
        .unwrap_or_else(|| DEFAULT_BACKFILL_COLLECTION.to_string());
    if Domain::from_collection(&collection).is_none() {
        return Err(AppError::Validation(format!(
            "Unknown collection '{collection}'"
        )));
    }
    let count = request.count.unwrap_or(DEFAULT_BACKFILL_COUNT);

    let invocation = load(&state, None, Some(BACKFILL_IMAGE_PROMPT)).await?;
    let template = invocation.image_template.as_deref().unwrap_or_default();
    let images = ImageGenerator::new(
        invocation.llm.images.clone(),
        state.objects.clone(),
        IMAGE_MODEL,
    );

    let summary = enrich::backfill_images(
        invocation.documents.as_ref(),
        &images,
        template,
        &collection,
        count,
    )
    .await?;
    Ok(Json(summary))
}

// ────────────────────────────────────────────────────────────────────────────
// Course pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs one course as a single-element batch.
pub async fn generate_course(state: &AppState, course_name: &str) -> Result<BatchSummary, AppError> {
    info!("Processing course: {course_name}");
    let (invocation, generator) = load_generator(state, Domain::Course.spec()).await?;
    let items = [WorkItem::named(course_name)];
    Ok(batch::run(invocation.documents.as_ref(), generator.as_ref(), &items).await)
}

/// Handles one raw message from the course topic. Never fails: a bad message
/// or an invocation-level error is logged and the message is dropped.
pub async fn handle_course_message(state: AppState, payload: String) {
    let request: CourseRequest = match serde_json::from_str(&payload) {
        Ok(request) => request,
        Err(e) => {
            error!("Discarding malformed course message {payload}: {e}");
            return;
        }
    };

    match generate_course(&state, &request.course_name).await {
        Ok(summary) => info!(
            "Course '{}' done: {} generated, {} skipped, {} failed",
            request.course_name,
            summary.generated.len(),
            summary.skipped.len(),
            summary.failed.len()
        ),
        Err(e) => error!("Course '{}' could not be processed: {e}", request.course_name),
    }
}
