pub mod chat_store;
pub mod db_pool;

pub use chat_store::{Chat, ChatMessage, ChatStore, DuckChatStore, StoreError};
pub use db_pool::{DuckDBConnectionManager, DuckPool};
