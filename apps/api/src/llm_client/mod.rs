/// LLM client: the single point of entry for all model API calls in Kiln.
///
/// ARCHITECTURAL RULE: No other module may call the completion or image API
/// directly. Generation code talks to the `CompletionService` and
/// `ImageService` traits; `LlmClient` is the production implementation.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

/// Default chat model for every generation call site.
pub const CHAT_MODEL: &str = "gpt-4o-mini";
/// Default image model.
pub const IMAGE_MODEL: &str = "dall-e-3";
/// The legacy image model only supports the smaller square size.
pub const LEGACY_IMAGE_MODEL: &str = "dall-e-2";
/// Model-id prefixes of reasoning-class models. These take
/// `max_completion_tokens` instead of `max_tokens` and a fixed temperature.
const REASONING_MODEL_PREFIXES: &[&str] = &["o1"];
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("image response carried no URL")]
    MissingImageUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// An ordered, role-tagged message list. Built once per completion call and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation(Vec<ChatMessage>);

impl Conversation {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self(messages)
    }

    pub fn single(content: impl Into<String>) -> Self {
        Self(vec![ChatMessage::user(content)])
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.0
    }
}

/// One completion round trip: model id, conversation, token budget -> text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        conversation: &Conversation,
        max_tokens: u32,
    ) -> Result<String, LlmError>;
}

/// Image generation plus retrieval of the generated asset.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Returns the (temporary) URL of a freshly generated image.
    async fn generate_image(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// Downloads the bytes behind an image URL.
    async fn download(&self, url: &str) -> Result<Bytes, LlmError>;
}

/// Model clients bound to one API key.
#[derive(Clone)]
pub struct LlmHandle {
    pub completions: Arc<dyn CompletionService>,
    pub images: Arc<dyn ImageService>,
}

/// Builds model clients from the API key fetched for an invocation.
pub trait LlmConnector: Send + Sync {
    fn connect(&self, api_key: String) -> LlmHandle;
}

/// Connects `LlmClient`s that share one HTTP client.
pub struct OpenAiConnector {
    client: Client,
    base_url: String,
}

impl OpenAiConnector {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl LlmConnector for OpenAiConnector {
    fn connect(&self, api_key: String) -> LlmHandle {
        let llm = Arc::new(LlmClient::new(
            self.client.clone(),
            self.base_url.as_str(),
            api_key,
        ));
        LlmHandle {
            completions: llm.clone(),
            images: llm,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatMessage], max_tokens: u32) -> Self {
        if is_reasoning_model(model) {
            Self {
                model,
                messages,
                temperature: 1.0,
                top_p: 1.0,
                max_tokens: None,
                max_completion_tokens: Some(max_tokens),
            }
        } else {
            Self {
                model,
                messages,
                temperature: 0.7,
                top_p: 1.0,
                max_tokens: Some(max_tokens),
                max_completion_tokens: None,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    quality: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

pub fn is_reasoning_model(model: &str) -> bool {
    REASONING_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

pub fn image_size(model: &str) -> &'static str {
    if model == LEGACY_IMAGE_MODEL {
        "512x512"
    } else {
        "1024x1024"
    }
}

/// Production client for the completion and image APIs.
/// Retries on 429 (rate limit), 5xx and transport errors with exponential backoff.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// POSTs `body` to `path` and returns the raw successful response.
    async fn post_with_retry<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(
        &self,
        model: &str,
        conversation: &Conversation,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        debug!(
            "Sending {} message(s) to {model} (budget {max_tokens})",
            conversation.messages().len()
        );
        let request = ChatCompletionRequest::new(model, conversation.messages(), max_tokens);
        let response: ChatCompletionResponse = self
            .post_with_retry("/chat/completions", &request)
            .await?
            .json()
            .await?;

        if let Some(usage) = &response.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyContent)
    }
}

#[async_trait]
impl ImageService for LlmClient {
    async fn generate_image(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let request = ImageRequest {
            model,
            prompt,
            quality: "standard",
            n: 1,
            size: image_size(model),
        };
        let response: ImageResponse = self
            .post_with_retry("/images/generations", &request)
            .await?
            .json()
            .await?;

        response
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .filter(|url| !url.is_empty())
            .ok_or(LlmError::MissingImageUrl)
    }

    async fn download(&self, url: &str) -> Result<Bytes, LlmError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: format!("image download from {url} failed"),
            });
        }
        Ok(response.bytes().await?)
    }
}
