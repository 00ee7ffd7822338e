//! Chat completion with a trailing-window summary of earlier turns.
//!
//! Prior turns are not replayed as messages: the last `HISTORY_WINDOW` of
//! them are flattened into one system message, followed by the persona and
//! the new user message.

pub mod handlers;

use serde::Deserialize;

use crate::llm_client::{ChatMessage, Conversation, Role};

pub const HISTORY_WINDOW: usize = 10;
pub const CHAT_MAX_TOKENS: u32 = 1024;
pub const PERSONA_FIELD: &str = "chatPersona";

/// One prior turn as the client stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    /// `"user"` for the user's turns; anything else is the assistant.
    pub user: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation: Vec<ChatTurn>,
    pub message: String,
}

pub fn summarize_conversation(history: &[ChatTurn], message: &str, persona: &str) -> Conversation {
    let recent = &history[history.len().saturating_sub(HISTORY_WINDOW)..];
    let summary = recent
        .iter()
        .map(|turn| {
            let speaker = if turn.user == "user" { "User" } else { "Assistant" };
            format!("{speaker}: {}", turn.message)
        })
        .collect::<Vec<_>>()
        .join("\n");

    Conversation::new(vec![
        ChatMessage::new(
            Role::System,
            format!("Summary of previous conversation:\n{summary}."),
        ),
        ChatMessage::new(Role::Developer, persona),
        ChatMessage::new(Role::User, message),
    ])
}
