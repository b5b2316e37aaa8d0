use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Quiz
        .route("/quiz", post(handlers::submit_quiz))
        .route("/quiz/sessions/:token", get(handlers::get_session))
        // Catalog identity
        .route("/fragrances/resolve/:raw_id", get(handlers::resolve_fragrance))
        // User analytics
        .route("/users/:user_id/engagement", get(handlers::get_engagement))
        .route("/users/:user_id/insights", get(handlers::get_insights))
        .route("/users/:user_id/analytics", delete(handlers::clear_analytics))
}
