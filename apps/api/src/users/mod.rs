//! Per-user workflows: avatar generation and resume analysis.
//!
//! User-owned records live in collections nested under the user's document,
//! e.g. `users/<id>/easifyResponses`.

pub mod avatar;
pub mod handlers;
pub mod resume;

use uuid::Uuid;

pub const USERS_COLLECTION: &str = "users";

pub fn user_collection(user_id: Uuid, path: &str) -> String {
    format!("{USERS_COLLECTION}/{user_id}/{path}")
}
