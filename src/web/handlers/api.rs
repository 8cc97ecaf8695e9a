use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::config::ModelEntry;
use crate::web::auth::AuthUser;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub search_configured: bool,
    pub database_search: bool,
    pub llm_backend: String,
}

pub async fn list_models(State(state): State<Arc<AppState>>, _user: AuthUser) -> Json<Vec<ModelEntry>> {
    Json(state.config.models.clone())
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        search_configured: state.pipeline.search.is_configured(),
        database_search: state.pipeline.database_search,
        llm_backend: state.config.llm.backend.clone(),
    })
}
