//! Per-invocation prerequisites: completion API key, prompt templates and the
//! document-store credential, fetched concurrently before any item runs.
//! A failure here is fatal to the whole invocation.

use std::sync::Arc;

use tracing::info;

use crate::db::DocumentStoreCredential;
use crate::documents::DocumentStore;
use crate::errors::AppError;
use crate::generation::course::CourseGenerator;
use crate::generation::domains::{DomainSpec, GeneratorKind, ImagePrompt};
use crate::generation::images::{ImageGenerator, ImageStage};
use crate::generation::item::{ItemGenerator, RecordSink, SingleShotGenerator};
use crate::llm_client::{LlmHandle, IMAGE_MODEL};
use crate::secrets::{get_typed, SecretError, SecretStore};
use crate::state::AppState;

pub const API_KEY_FIELD: &str = "gptSecret";

/// Everything one invocation needs that is not process-wide.
pub struct Invocation {
    pub llm: LlmHandle,
    pub documents: Arc<dyn DocumentStore>,
    /// Request prompt, when one was asked for.
    pub prompt: Option<String>,
    /// Image prompt template, when one was asked for.
    pub image_template: Option<String>,
}

async fn fetch_prompt(
    state: &AppState,
    field: Option<&str>,
) -> Result<Option<String>, SecretError> {
    let Some(field) = field else {
        return Ok(None);
    };
    let config = &state.config;
    get_typed(
        state.secrets.as_ref(),
        &config.prompts_bucket,
        &config.prompts_key,
        Some(field),
    )
    .await
    .map(Some)
}

/// Fetches the shared prerequisites and attaches to the document store.
pub async fn load(
    state: &AppState,
    prompt_key: Option<&str>,
    image_prompt_key: Option<&str>,
) -> Result<Invocation, AppError> {
    let config = &state.config;
    let secrets: &dyn SecretStore = state.secrets.as_ref();

    let (api_key, prompt, image_template, credential) = tokio::try_join!(
        get_typed::<String>(
            secrets,
            &config.secrets_bucket,
            &config.secrets_key,
            Some(API_KEY_FIELD),
        ),
        fetch_prompt(state, prompt_key),
        fetch_prompt(state, image_prompt_key),
        get_typed::<DocumentStoreCredential>(
            secrets,
            &config.secrets_bucket,
            &config.document_credential_key,
            None,
        ),
    )?;
    info!("Invocation prerequisites loaded");

    let documents = state.documents.connect(&credential).await?;

    Ok(Invocation {
        llm: state.llm.connect(api_key),
        documents,
        prompt,
        image_template,
    })
}

/// Request prompt key of a single-shot domain.
pub fn request_prompt_key(spec: &DomainSpec) -> Option<&'static str> {
    match spec.generator {
        GeneratorKind::SingleShot { prompt_key, .. } => Some(prompt_key),
        GeneratorKind::Composite => None,
    }
}

/// Image template key, if the domain uses one and image generation is on.
pub fn image_prompt_key(spec: &DomainSpec, images_enabled: bool) -> Option<&'static str> {
    match spec.image {
        ImagePrompt::FromTemplate { prompt_key } if images_enabled => Some(prompt_key),
        _ => None,
    }
}

/// Loads the prerequisites for `spec` and builds its item generator.
pub async fn load_generator(
    state: &AppState,
    spec: &'static DomainSpec,
) -> Result<(Invocation, Box<dyn ItemGenerator>), AppError> {
    let images_enabled = state.config.enable_image_generation;
    let invocation = load(
        state,
        request_prompt_key(spec),
        image_prompt_key(spec, images_enabled),
    )
    .await?;

    let images = (images_enabled && spec.image != ImagePrompt::None).then(|| ImageStage {
        generator: ImageGenerator::new(
            invocation.llm.images.clone(),
            state.objects.clone(),
            IMAGE_MODEL,
        ),
        policy: spec.image,
        template: invocation.image_template.clone(),
    });
    let sink = RecordSink::new(spec, invocation.documents.clone(), images);

    let generator: Box<dyn ItemGenerator> = match spec.generator {
        GeneratorKind::Composite => {
            Box::new(CourseGenerator::new(invocation.llm.completions.clone(), sink))
        }
        GeneratorKind::SingleShot { .. } => {
            let prompt = invocation.prompt.clone().unwrap_or_default();
            let completions = invocation.llm.completions.clone();
            let single = SingleShotGenerator::new(spec, completions, prompt, sink)
                .ok_or_else(|| anyhow::anyhow!("{} is not a single-shot domain", spec.slug))?;
            Box::new(single)
        }
    };
    Ok((invocation, generator))
}
