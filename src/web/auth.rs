use crate::web::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// The authenticated caller. Rejects with 401 before the handler body runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        match token.and_then(|t| state.user_for_token(t)) {
            Some(user) => Ok(AuthUser {
                id: user.to_string(),
            }),
            None => {
                debug!("Rejecting request to {} without a valid bearer token", parts.uri.path());
                Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()))
            }
        }
    }
}
