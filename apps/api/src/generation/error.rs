use std::fmt;

use thiserror::Error;

use crate::documents::DocumentError;
use crate::llm_client::LlmError;
use crate::storage::ObjectStoreError;

/// Where in a generation an error happened. Carried into every failure log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DuplicateCheck,
    /// Single-shot record body, or the root of a composite.
    Record,
    Chapter { chapter: usize },
    Topic { chapter: usize, topic: usize },
    Image,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::DuplicateCheck => write!(f, "duplicate-check"),
            Stage::Record => write!(f, "record"),
            Stage::Chapter { chapter } => write!(f, "chapter {}", chapter + 1),
            Stage::Topic { chapter, topic } => {
                write!(f, "topic {} of chapter {}", topic + 1, chapter + 1)
            }
            Stage::Image => write!(f, "image"),
            Stage::Persist => write!(f, "persist"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion failed at {stage}: {source}")]
    Completion {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    /// Sanitized text was not a JSON object, or lacked a required field.
    #[error("unusable model output at {stage}: {reason}")]
    Parse { stage: Stage, reason: String },

    /// Recoverable: the record is persisted with an empty image.
    #[error("image generation failed: {0}")]
    ImageGeneration(#[from] ImageError),

    #[error("duplicate-check lookup failed: {0}")]
    DuplicateCheck(#[source] DocumentError),

    #[error("persist failed: {0}")]
    Persist(#[source] DocumentError),
}

impl GenerationError {
    pub fn stage(&self) -> Stage {
        match self {
            GenerationError::Completion { stage, .. } | GenerationError::Parse { stage, .. } => {
                *stage
            }
            GenerationError::ImageGeneration(_) => Stage::Image,
            GenerationError::DuplicateCheck(_) => Stage::DuplicateCheck,
            GenerationError::Persist(_) => Stage::Persist,
        }
    }

    pub fn parse(stage: Stage, reason: impl Into<String>) -> Self {
        GenerationError::Parse {
            stage,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image API: {0}")]
    Api(#[from] LlmError),

    #[error("image upload: {0}")]
    Upload(#[from] ObjectStoreError),

    #[error("record has no '{0}' to build an image prompt from")]
    MissingPromptSource(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_is_one_based() {
        assert_eq!(Stage::Chapter { chapter: 0 }.to_string(), "chapter 1");
        assert_eq!(
            Stage::Topic { chapter: 2, topic: 1 }.to_string(),
            "topic 2 of chapter 3"
        );
    }

    #[test]
    fn test_parse_error_reports_stage() {
        let err = GenerationError::parse(Stage::Chapter { chapter: 1 }, "missing 'topics'");
        assert_eq!(err.stage(), Stage::Chapter { chapter: 1 });
        assert_eq!(
            err.to_string(),
            "unusable model output at chapter 2: missing 'topics'"
        );
    }

    #[test]
    fn test_every_item_error_carries_a_stage() {
        let lookup =
            GenerationError::DuplicateCheck(DocumentError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(lookup.stage(), Stage::DuplicateCheck);

        let image = GenerationError::from(ImageError::MissingPromptSource("description"));
        assert_eq!(image.stage(), Stage::Image);

        let write = GenerationError::Persist(DocumentError::Conflict {
            collection: "recipes".into(),
            name: "Tacos".into(),
        });
        assert_eq!(write.stage(), Stage::Persist);
    }
}
