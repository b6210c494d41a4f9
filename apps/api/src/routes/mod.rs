pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;
use crate::tailoring::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Tailoring API
        .route("/api/v1/tailoring", post(handlers::handle_start_tailoring))
        .route(
            "/api/v1/tailoring/:resume_id/progress",
            get(handlers::handle_get_progress),
        )
        .route(
            "/api/v1/tailoring/:resume_id/result",
            get(handlers::handle_get_result),
        )
        .route("/api/v1/usage", get(handlers::handle_get_usage))
        .route("/api/v1/usage/tier", put(handlers::handle_set_tier))
        // Provider diagnostics
        .route("/api/v1/providers", get(handlers::handle_list_providers))
        .route(
            "/api/v1/providers/:name/test",
            post(handlers::handle_test_provider),
        )
        .with_state(state)
}
