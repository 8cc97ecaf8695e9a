use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::{Chat, ChatMessage};
use crate::llm::{PromptMessage, Role};
use crate::pipeline::{compose, gather, generate_title, ChatEvent};
use crate::web::auth::AuthUser;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub id: String,
    pub messages: Vec<PromptMessage>,
    pub model_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteChatParams {
    pub id: Option<String>,
}

fn internal(context: &str, e: impl std::fmt::Display) -> (StatusCode, String) {
    error!("{}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "An error occurred while processing your request".to_string(),
    )
}

fn to_sse(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Delta(text) => Event::default()
            .event("delta")
            .data(json!({ "text": text }).to_string()),
        ChatEvent::Metadata { message_id } => Event::default()
            .event("metadata")
            .data(json!({ "messageIdFromServer": message_id }).to_string()),
        ChatEvent::Error(message) => Event::default()
            .event("error")
            .data(json!({ "error": message }).to_string()),
    }
}

/// Runs one chat turn and streams the answer as server-sent events.
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    if payload.id.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Missing chat id".to_string()));
    }

    let model = state
        .config
        .find_model(&payload.model_id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Model not found".to_string()))?;

    let user_message = payload
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "No user message found".to_string()))?;

    let pipeline = &state.pipeline;
    match pipeline
        .store
        .get_chat(&payload.id)
        .await
        .map_err(|e| internal("Failed to load chat", e))?
    {
        Some(chat) if chat.user_id != user.id => {
            warn!("User {} tried to post to chat {} owned by someone else", user.id, chat.id);
            return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
        }
        Some(_) => {}
        None => {
            let title = generate_title(&pipeline.llm, &user_message).await;
            info!("Creating chat {} ({})", payload.id, title);
            let stored = pipeline
                .store
                .save_chat(Chat {
                    id: payload.id.clone(),
                    user_id: user.id.clone(),
                    title,
                    created_at: chrono::Utc::now(),
                })
                .await
                .map_err(|e| internal("Failed to save chat", e))?;
            // Another first turn may have created it meanwhile
            if stored.user_id != user.id {
                warn!("User {} lost the race to create chat {}", user.id, stored.id);
                return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
            }
        }
    }

    pipeline
        .store
        .save_messages(vec![ChatMessage::new(&payload.id, Role::User, user_message.clone())])
        .await
        .map_err(|e| internal("Failed to save user message", e))?;

    let enrichment = gather(pipeline, &user_message)
        .await
        .map_err(|e| internal("Enrichment failed", e))?;

    let events = compose(
        pipeline,
        &payload.id,
        payload.messages,
        enrichment,
        &model.api_identifier,
    )
    .await
    .map_err(|e| internal("Failed to start answer", e))?;

    let stream = stream::unfold(events, |mut events| async move {
        events
            .recv()
            .await
            .map(|event| (Ok(to_sse(event)), events))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Deletes a chat the caller owns.
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DeleteChatParams>,
    user: Result<AuthUser, (StatusCode, String)>,
) -> Result<&'static str, (StatusCode, String)> {
    let Some(id) = params.id.filter(|id| !id.is_empty()) else {
        return Err((StatusCode::NOT_FOUND, "Not Found".to_string()));
    };
    let user = user?;

    let store = &state.pipeline.store;
    let chat = store
        .get_chat(&id)
        .await
        .map_err(|e| internal("Failed to load chat", e))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Not Found".to_string()))?;

    if chat.user_id != user.id {
        warn!("User {} tried to delete chat {} owned by someone else", user.id, id);
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
    }

    store
        .delete_chat(&id)
        .await
        .map_err(|e| internal("Failed to delete chat", e))?;

    Ok("Chat deleted")
}

/// The caller's chats, newest first.
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Chat>>, (StatusCode, String)> {
    let chats = state
        .pipeline
        .store
        .list_chats(&user.id)
        .await
        .map_err(|e| internal("Failed to list chats", e))?;
    Ok(Json(chats))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: AuthUser,
) -> Result<Json<Vec<ChatMessage>>, (StatusCode, String)> {
    let store = &state.pipeline.store;
    let chat = store
        .get_chat(&id)
        .await
        .map_err(|e| internal("Failed to load chat", e))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Not Found".to_string()))?;

    if chat.user_id != user.id {
        return Err((StatusCode::UNAUTHORIZED, "Unauthorized".to_string()));
    }

    let messages = store
        .list_messages(&id)
        .await
        .map_err(|e| internal("Failed to list messages", e))?;
    Ok(Json(messages))
}
