pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::chat::handlers as chat;
use crate::easify::handlers as easify;
use crate::generation::handlers;
use crate::state::AppState;
use crate::users::handlers as users;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API
        .route("/api/v1/batches/:domain", post(handlers::handle_batch))
        .route("/api/v1/courses/queue", post(handlers::handle_queue_courses))
        .route(
            "/api/v1/courses/generate",
            post(handlers::handle_generate_course),
        )
        // Follow-up workflows
        .route(
            "/api/v1/industries/populate",
            post(handlers::handle_populate_industries),
        )
        .route(
            "/api/v1/images/backfill",
            post(handlers::handle_backfill_images),
        )
        // Chat API
        .route("/api/v1/chat", post(chat::handle_chat))
        // User API
        .route("/api/v1/users/:user_id/easify", post(easify::handle_easify))
        .route(
            "/api/v1/users/:user_id/avatar",
            post(users::handle_generate_avatar),
        )
        .route(
            "/api/v1/users/:user_id/resumes/:file_name/analysis",
            post(users::handle_analyze_resume),
        )
        .with_state(state)
}
