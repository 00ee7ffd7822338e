use serde::{Deserialize, Serialize};

/// One unit of generation requested by a caller.
///
/// Inbound arrays carry either bare names or `{ name, image? }` objects; both
/// decode to the same value. A supplied `image` short-circuits image
/// generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawWorkItem")]
pub struct WorkItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWorkItem {
    Name(String),
    Object {
        name: String,
        #[serde(default)]
        image: Option<String>,
    },
}

impl From<RawWorkItem> for WorkItem {
    fn from(raw: RawWorkItem) -> Self {
        match raw {
            RawWorkItem::Name(name) => WorkItem { name, image: None },
            RawWorkItem::Object { name, image } => WorkItem {
                name,
                image: image.filter(|url| !url.is_empty()),
            },
        }
    }
}

impl WorkItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
        }
    }
}
