use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use crate::chart::{self, ChartConfig, ChartError, Row};
use crate::web::auth::AuthUser;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChartRequest {
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub data: Vec<Row>,
    pub config: ChartConfig,
}

pub async fn generate_chart(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<ChartRequest>,
) -> Result<Json<ChartConfig>, (StatusCode, String)> {
    match chart::generate(&state.pipeline.llm, &payload.data, &payload.query).await {
        Ok(config) => Ok(Json(config)),
        Err(ChartError::EmptyData) => Err((StatusCode::BAD_REQUEST, "No chart data provided".to_string())),
        Err(e) => {
            error!("Chart generation failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate chart config".to_string(),
            ))
        }
    }
}

pub async fn render_chart(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<RenderRequest>,
) -> Result<Html<String>, (StatusCode, String)> {
    chart::render_html(&state.template_env, &payload.data, &payload.config)
        .map(Html)
        .map_err(|e| {
            error!("Template render error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render chart".to_string())
        })
}
