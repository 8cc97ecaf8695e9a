//! In-process doubles shared by the unit tests.

use crate::db::{Chat, ChatMessage, ChatStore, StoreError};
use crate::llm::{GenerationRequest, LanguageModel, LlmError, ResponseFormat, TokenStream};
use crate::relational::{RelationalError, RelationalSource};
use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays canned completions and token streams.
///
/// Completions are consumed in order; the last one is repeated once the
/// queue is down to a single entry.
#[derive(Default)]
pub struct ScriptedModel {
    completions: Mutex<VecDeque<String>>,
    tokens: Vec<Result<String, String>>,
    failing: bool,
    seen_models: Arc<Mutex<Vec<String>>>,
    seen_requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails as if the backend were unreachable.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_completion(self, text: &str) -> Self {
        self.completions.lock().unwrap().push_back(text.to_string());
        self
    }

    pub fn with_stream(mut self, tokens: &[&str]) -> Self {
        self.tokens = tokens.iter().map(|t| Ok(t.to_string())).collect();
        self
    }

    /// Streams `tokens`, then breaks with an error.
    pub fn with_broken_stream(mut self, tokens: &[&str]) -> Self {
        self = self.with_stream(tokens);
        self.tokens.push(Err("connection reset".to_string()));
        self
    }

    pub fn seen_models(&self) -> Arc<Mutex<Vec<String>>> {
        self.seen_models.clone()
    }

    pub fn seen_requests(&self) -> Arc<Mutex<Vec<GenerationRequest>>> {
        self.seen_requests.clone()
    }

    fn record(&self, model: &str, request: &GenerationRequest) {
        self.seen_models.lock().unwrap().push(model.to_string());
        self.seen_requests.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(
        &self,
        model: &str,
        request: &GenerationRequest,
        _format: ResponseFormat<'_>,
    ) -> Result<String, LlmError> {
        self.record(model, request);
        if self.failing {
            return Err(LlmError::ConnectionError("scripted outage".to_string()));
        }

        let mut queue = self.completions.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        next.ok_or_else(|| LlmError::ResponseError("no scripted completion".to_string()))
    }

    async fn stream(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<TokenStream, LlmError> {
        self.record(model, request);
        if self.failing {
            return Err(LlmError::ConnectionError("scripted outage".to_string()));
        }

        let tokens = self.tokens.clone();
        Ok(futures::stream::iter(
            tokens
                .into_iter()
                .map(|t| t.map_err(LlmError::ConnectionError)),
        )
        .boxed())
    }
}

#[derive(Default)]
pub struct MemoryChatStore {
    chats: Mutex<Vec<Chat>>,
    messages: Mutex<Vec<ChatMessage>>,
    reject_messages: bool,
    hide_chats: bool,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts chats but fails every message write.
    pub fn rejecting_messages() -> Self {
        Self {
            reject_messages: true,
            ..Self::default()
        }
    }

    /// Lookups never find a chat, as if it were created concurrently
    /// between the lookup and the insert.
    pub fn hiding_chats() -> Self {
        Self {
            hide_chats: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError> {
        if self.hide_chats {
            return Ok(None);
        }
        Ok(self.chats.lock().unwrap().iter().find(|c| c.id == id).cloned())
    }

    async fn save_chat(&self, chat: Chat) -> Result<Chat, StoreError> {
        let mut chats = self.chats.lock().unwrap();
        if let Some(existing) = chats.iter().find(|c| c.id == chat.id) {
            return Ok(existing.clone());
        }
        chats.push(chat.clone());
        Ok(chat)
    }

    async fn delete_chat(&self, id: &str) -> Result<(), StoreError> {
        self.chats.lock().unwrap().retain(|c| c.id != id);
        self.messages.lock().unwrap().retain(|m| m.chat_id != id);
        Ok(())
    }

    async fn save_messages(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        if self.reject_messages {
            return Err(StoreError::Corrupt("disk full".to_string()));
        }
        self.messages.lock().unwrap().extend(messages);
        Ok(())
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, StoreError> {
        let mut chats: Vec<Chat> = self
            .chats
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }
}

/// Relational source that counts how often it is consulted.
pub struct CountingRelational {
    calls: Arc<AtomicUsize>,
    rows: Result<Value, String>,
}

impl CountingRelational {
    pub fn returning(rows: Value) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            rows: Ok(rows),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            rows: Err(message.to_string()),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl RelationalSource for CountingRelational {
    async fn generate_query(&self, _question: &str) -> Result<String, RelationalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("SELECT 1".to_string())
    }

    async fn run_query(&self, _sql: &str) -> Result<Value, RelationalError> {
        self.rows.clone().map_err(RelationalError::Execution)
    }
}

/// Serves `router` on an ephemeral local port; returns the `_search` URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}/logs/_search", addr)
}
