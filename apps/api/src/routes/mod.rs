pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/interviews", post(handlers::handle_create_interview))
        .route(
            "/api/v1/interviews/:id",
            get(handlers::handle_get_interview).delete(handlers::handle_delete_interview),
        )
        .route(
            "/api/v1/interviews/:id/answers",
            post(handlers::handle_submit_answer),
        )
        .route("/api/v1/interviews/:id/skip", post(handlers::handle_skip_topic))
        .route("/api/v1/interviews/:id/advance", post(handlers::handle_advance))
        .route("/api/v1/interviews/:id/submit", post(handlers::handle_submit_task))
        .route(
            "/api/v1/interviews/:id/terminate",
            post(handlers::handle_terminate),
        )
        .with_state(state)
}
