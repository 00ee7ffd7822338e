//! Field normalization applied to a parsed record before it is persisted.

use serde_json::{Map, Value};

pub const VALID_LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];
pub const DEFAULT_LEVEL: &str = "intermediate";

/// A record field with a normalization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedField {
    /// Array or comma-joined string -> trimmed, lowercase string array.
    Tags,
    Category,
    Cuisine,
    /// Lowercase, clamped to `VALID_LEVELS`.
    Level,
    /// `ingredients[].name` trimmed and lowercased.
    IngredientNames,
}

pub fn normalize_record(record: &mut Map<String, Value>, fields: &[NormalizedField]) {
    for field in fields {
        match field {
            NormalizedField::Tags => {
                if let Some(tags) = record.get("tags").and_then(normalize_tags) {
                    record.insert("tags".into(), tags.into());
                }
            }
            NormalizedField::Category => lowercase_in_place(record, "category"),
            NormalizedField::Cuisine => lowercase_in_place(record, "cuisine"),
            NormalizedField::Level => {
                if let Some(level) = record.get("level") {
                    let level = normalize_level(level.as_str().unwrap_or_default());
                    record.insert("level".into(), Value::String(level.to_string()));
                }
            }
            NormalizedField::IngredientNames => {
                if let Some(Value::Array(ingredients)) = record.get_mut("ingredients") {
                    for ingredient in ingredients.iter_mut() {
                        if let Some(Value::String(name)) = ingredient.get_mut("name") {
                            *name = name.trim().to_lowercase();
                        }
                    }
                }
            }
        }
    }
}

/// Returns `None` when the value is neither an array nor a string.
pub fn normalize_tags(tags: &Value) -> Option<Vec<String>> {
    match tags {
        Value::String(joined) => Some(
            joined
                .split(',')
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect(),
        ),
        _ => None,
    }
}

/// Case-insensitive match against `VALID_LEVELS`, else `DEFAULT_LEVEL`.
pub fn normalize_level(level: &str) -> &'static str {
    let lowered = level.trim().to_lowercase();
    VALID_LEVELS
        .iter()
        .find(|valid| **valid == lowered)
        .copied()
        .unwrap_or(DEFAULT_LEVEL)
}

fn lowercase_in_place(record: &mut Map<String, Value>, key: &str) {
    if let Some(Value::String(value)) = record.get_mut(key) {
        *value = value.trim().to_lowercase();
    }
}
