//! Avatar generation from the `avatar` traits on a user's document.

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::documents::DocumentStore;
use crate::errors::AppError;
use crate::generation::images::ImageGenerator;
use crate::users::USERS_COLLECTION;

pub const AVATAR_ASSET_NAME: &str = "avatar";

const AVATAR_BASE_PROMPT: &str = "Generate an avatar for a person. Shoulders and up with \
    background color #eefaf6 and nothing in the background.";

/// Trait field, then the text placed before and after its value.
const AVATAR_TRAITS: &[(&str, &str, &str)] = &[
    ("name", "The person's name is ", "."),
    ("gender", "The person is ", "."),
    ("ageRange", "They belong to the ", " age group."),
    ("ethnicity", "Ethnicity is ", "."),
    ("hairColor", "They have ", " hair."),
    ("eyeColor", "Their eye color is ", "."),
    ("clothingStyle", "Their clothing style is described as ", "."),
    ("accessories", "They are wearing ", "."),
    ("otherInfo", "Additional features: ", "."),
];

/// Base prompt plus one sentence per non-empty trait, in a fixed order.
pub fn avatar_prompt(user: &Value) -> String {
    let traits = user.get("avatar").unwrap_or(&Value::Null);
    let mut prompt = AVATAR_BASE_PROMPT.to_string();
    for (field, before, after) in AVATAR_TRAITS {
        let value = traits
            .get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(value) = value {
            prompt.push(' ');
            prompt.push_str(before);
            prompt.push_str(value);
            prompt.push_str(after);
        }
    }
    prompt
}

/// Generates the avatar, stores it under the user's key prefix and records
/// its URL on the user's document.
pub async fn generate_avatar(
    documents: &dyn DocumentStore,
    images: &ImageGenerator,
    user_id: Uuid,
) -> Result<String, AppError> {
    let user = documents
        .get(USERS_COLLECTION, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let prompt = avatar_prompt(&user.data);
    info!("Generating avatar for user {user_id}");
    let url = images
        .generate_and_store(&prompt, AVATAR_ASSET_NAME, Some(&user_id.to_string()))
        .await?;

    let mut fields = Map::new();
    fields.insert("avatarUrl".into(), Value::String(url.clone()));
    documents.set_merge(USERS_COLLECTION, user_id, fields).await?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use crate::test_support::{FixedImageService, MemoryDocumentStore, MemoryObjectStore};
    use serde_json::json;

    #[test]
    fn test_prompt_lists_only_present_traits() {
        let user = json!({
            "avatar": {
                "gender": "female",
                "ageRange": "30-40",
                "hairColor": "  ",
                "accessories": "round glasses",
                "eyeColor": null
            }
        });
        assert_eq!(
            avatar_prompt(&user),
            "Generate an avatar for a person. Shoulders and up with background color #eefaf6 \
             and nothing in the background. The person is female. They belong to the 30-40 \
             age group. They are wearing round glasses."
        );
    }

    #[test]
    fn test_prompt_without_traits_is_the_base() {
        assert_eq!(avatar_prompt(&json!({})), AVATAR_BASE_PROMPT);
    }

    #[tokio::test]
    async fn test_avatar_is_stored_under_the_user_and_linked() {
        let store = MemoryDocumentStore::default();
        let user = store.insert("users", json!({ "avatar": { "name": "Ada" } }));
        let objects = Arc::new(MemoryObjectStore::default());
        let images = ImageGenerator::new(
            Arc::new(FixedImageService::new("https://gen/avatar.png")),
            objects.clone(),
            "dall-e-3",
        );

        let url = generate_avatar(&store, &images, user).await.unwrap();

        let keys = objects.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(&format!("{user}/avatar_")), "{}", keys[0]);
        let stored = store.stored("users", user).unwrap();
        assert_eq!(stored["avatarUrl"], url);
        assert_eq!(stored["avatar"]["name"], "Ada");
    }

    #[tokio::test]
    async fn test_unknown_user_generates_nothing() {
        let store = MemoryDocumentStore::default();
        let service = FixedImageService::new("https://gen/avatar.png");
        let calls = service.calls();
        let images = ImageGenerator::new(
            Arc::new(service),
            Arc::new(MemoryObjectStore::default()),
            "dall-e-3",
        );

        let err = generate_avatar(&store, &images, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_image_failure_leaves_the_user_untouched() {
        let store = MemoryDocumentStore::default();
        let user = store.insert("users", json!({ "email": "ada@example.com" }));
        let images = ImageGenerator::new(
            Arc::new(FixedImageService::failing()),
            Arc::new(MemoryObjectStore::default()),
            "dall-e-3",
        );

        let err = generate_avatar(&store, &images, user).await.unwrap_err();
        assert!(matches!(err, AppError::Image(_)));
        assert!(store.stored("users", user).unwrap().get("avatarUrl").is_none());
    }
}
