//! Axum route handlers for per-user workflows.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::images::ImageGenerator;
use crate::generation::invocation::load;
use crate::llm_client::IMAGE_MODEL;
use crate::state::AppState;
use crate::users::avatar::generate_avatar;
use crate::users::resume::{analyze_resume, RESUME_PROMPT_KEY};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarResponse {
    pub avatar_url: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    /// Name of the report record that was written.
    pub analysis: &'static str,
}

/// POST /api/v1/users/:user_id/avatar
pub async fn handle_generate_avatar(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<AvatarResponse>, AppError> {
    let invocation = load(&state, None, None).await?;
    let images = ImageGenerator::new(
        invocation.llm.images.clone(),
        state.objects.clone(),
        IMAGE_MODEL,
    );
    let avatar_url = generate_avatar(invocation.documents.as_ref(), &images, user_id).await?;
    Ok(Json(AvatarResponse { avatar_url }))
}

/// POST /api/v1/users/:user_id/resumes/:file_name/analysis
pub async fn handle_analyze_resume(
    State(state): State<AppState>,
    Path((user_id, file_name)): Path<(Uuid, String)>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let invocation = load(&state, Some(RESUME_PROMPT_KEY), None).await?;
    let prompt = invocation.prompt.as_deref().unwrap_or_default();
    let analysis = analyze_resume(
        invocation.documents.as_ref(),
        invocation.llm.completions.as_ref(),
        prompt,
        user_id,
        &file_name,
    )
    .await?;
    Ok(Json(AnalysisResponse { analysis }))
}
