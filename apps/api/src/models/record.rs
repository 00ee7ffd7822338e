use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::generation::domains::Domain;

/// A generated record as persisted: natural key, document id and the full
/// normalized body (including `createdDate` and `image`).
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedRecord {
    pub id: Uuid,
    #[serde(skip)]
    pub domain: Domain,
    pub name: String,
    pub data: Map<String, Value>,
}

impl GeneratedRecord {
    pub fn image(&self) -> &str {
        self.data
            .get("image")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}
