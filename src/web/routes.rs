use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - everything except status requires a bearer token
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Chat turns
            .route(
                "/chat",
                post(handlers::chat::post_chat).delete(handlers::chat::delete_chat),
            )
            // History
            .route("/chats", get(handlers::chat::list_chats))
            .route("/chats/{id}/messages", get(handlers::chat::list_messages))
            .route("/models", get(handlers::api::list_models))
            // Charts
            .route("/chart", post(handlers::chart::generate_chart))
            .route("/chart/render", post(handlers::chart::render_chart))
            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
