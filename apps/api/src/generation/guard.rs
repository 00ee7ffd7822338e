//! Duplicate guard: point-in-time existence check on the natural key.
//!
//! Check-then-act, not a transaction. Two invocations racing on the same name
//! can both pass; the store's unique index turns the loser's write into a
//! `DocumentError::Conflict`.

use crate::documents::{DocumentError, DocumentStore};

pub const NATURAL_KEY: &str = "name";

pub async fn exists(
    documents: &dyn DocumentStore,
    collection: &str,
    name: &str,
) -> Result<bool, DocumentError> {
    let matches = documents
        .find_by_field(collection, NATURAL_KEY, name)
        .await?;
    Ok(!matches.is_empty())
}
