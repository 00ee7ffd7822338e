//! Axum route handler for the chat API.

use axum::{extract::State, Json};
use tracing::info;

use crate::chat::{summarize_conversation, ChatRequest, CHAT_MAX_TOKENS, PERSONA_FIELD};
use crate::errors::AppError;
use crate::generation::invocation::API_KEY_FIELD;
use crate::llm_client::CHAT_MODEL;
use crate::secrets::get_typed;
use crate::state::AppState;

/// POST /api/v1/chat
///
/// Returns the raw completion text as a JSON string.
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<String>, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let config = &state.config;
    let secrets = state.secrets.as_ref();
    let (api_key, persona) = tokio::try_join!(
        get_typed::<String>(
            secrets,
            &config.secrets_bucket,
            &config.secrets_key,
            Some(API_KEY_FIELD),
        ),
        get_typed::<String>(
            secrets,
            &config.prompts_bucket,
            &config.prompts_key,
            Some(PERSONA_FIELD),
        ),
    )?;

    let conversation = summarize_conversation(&request.conversation, &request.message, &persona);
    info!(
        "Chat request with {} prior turn(s)",
        request.conversation.len()
    );

    let llm = state.llm.connect(api_key);
    let reply = llm
        .completions
        .complete(CHAT_MODEL, &conversation, CHAT_MAX_TOKENS)
        .await?;

    Ok(Json(reply))
}
