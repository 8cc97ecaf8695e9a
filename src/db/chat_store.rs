use crate::db::db_pool::DuckPool;
use crate::llm::Role;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::params;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted chat turn. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: &str, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError>;
    /// Inserts the chat unless its id is taken; returns the chat that is stored.
    async fn save_chat(&self, chat: Chat) -> Result<Chat, StoreError>;
    /// Removes the chat and all of its messages.
    async fn delete_chat(&self, id: &str) -> Result<(), StoreError>;
    /// Appends messages in the given order.
    async fn save_messages(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError>;
    async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError>;
    /// The user's chats, newest first.
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, StoreError>;
}

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS chats (
    id VARCHAR PRIMARY KEY,
    user_id VARCHAR NOT NULL,
    title VARCHAR NOT NULL,
    created_at VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id VARCHAR PRIMARY KEY,
    chat_id VARCHAR NOT NULL,
    role VARCHAR NOT NULL,
    content VARCHAR NOT NULL,
    created_at VARCHAR NOT NULL
);
";

/// Chat history kept in a DuckDB file.
pub struct DuckChatStore {
    pool: DuckPool,
}

impl DuckChatStore {
    pub fn new(pool: DuckPool) -> Result<Self, StoreError> {
        let conn = pool.get()?;
        conn.execute_batch(CREATE_TABLES)?;
        info!("Chat store tables ready");
        Ok(Self { pool })
    }

    async fn with_conn<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut duckdb::Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        // DuckDB calls block; keep them off the async workers
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            work(&mut conn)
        })
        .await?
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {:?}: {}", raw, e)))
}

fn chat_from_row(row: (String, String, String, String)) -> Result<Chat, StoreError> {
    let (id, user_id, title, created_at) = row;
    Ok(Chat {
        id,
        user_id,
        title,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn select_chat(conn: &duckdb::Connection, id: &str) -> Result<Option<Chat>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, user_id, title, created_at FROM chats WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    })?;
    match rows.next() {
        Some(row) => Ok(Some(chat_from_row(row?)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl ChatStore for DuckChatStore {
    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| select_chat(conn, &id)).await
    }

    async fn save_chat(&self, chat: Chat) -> Result<Chat, StoreError> {
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO chats (id, user_id, title, created_at) VALUES (?, ?, ?, ?) \
                 ON CONFLICT DO NOTHING",
                params![chat.id, chat.user_id, chat.title, timestamp(&chat.created_at)],
            )?;
            if inserted == 0 {
                debug!("Chat {} already exists", chat.id);
            } else {
                debug!("Saved chat {}", chat.id);
            }
            select_chat(conn, &chat.id)?
                .ok_or_else(|| StoreError::Corrupt(format!("chat {} missing after insert", chat.id)))
        })
        .await
    }

    async fn delete_chat(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?", params![id])?;
            tx.execute("DELETE FROM chats WHERE id = ?", params![id])?;
            tx.commit()?;
            info!("Deleted chat {}", id);
            Ok(())
        })
        .await
    }

    async fn save_messages(&self, messages: Vec<ChatMessage>) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for message in &messages {
                tx.execute(
                    "INSERT INTO messages (id, chat_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
                    params![
                        message.id,
                        message.chat_id,
                        message.role.as_str(),
                        message.content,
                        timestamp(&message.created_at)
                    ],
                )?;
            }
            tx.commit()?;
            debug!("Saved {} message(s)", messages.len());
            Ok(())
        })
        .await
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let chat_id = chat_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, role, content, created_at FROM messages
                 WHERE chat_id = ? ORDER BY created_at, rowid",
            )?;
            let rows = stmt.query_map(params![chat_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (id, chat_id, role, content, created_at) = row?;
                let role = Role::parse(&role)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown role {:?}", role)))?;
                messages.push(ChatMessage {
                    id,
                    chat_id,
                    role,
                    content,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(messages)
        })
        .await
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>, StoreError> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, created_at FROM chats
                 WHERE user_id = ? ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.map(|row| chat_from_row(row?)).collect()
        })
        .await
    }
}
