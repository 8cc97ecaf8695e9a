//! Secondary enrichment source: natural language questions answered with SQL
//! against a relational store. Only consulted when database search is enabled.

pub mod duck;
pub mod sql;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use duck::DuckRelationalSource;

#[derive(Debug, Error)]
pub enum RelationalError {
    #[error("query generation failed: {0}")]
    Generation(#[from] crate::llm::LlmError),
    #[error("generated SQL rejected: {0}")]
    Rejected(String),
    #[error("query execution failed: {0}")]
    Execution(String),
}

#[async_trait]
pub trait RelationalSource: Send + Sync {
    async fn generate_query(&self, question: &str) -> Result<String, RelationalError>;
    async fn run_query(&self, sql: &str) -> Result<Value, RelationalError>;
}
