//! Per-request chat pipeline: gather enrichment from the search index and the
//! relational store, then stream an answer grounded in it.

pub mod answer;
pub mod enrichment;
pub mod title;

use crate::db::ChatStore;
use crate::llm::{LlmError, LlmManager};
use crate::relational::RelationalSource;
use crate::search::{SearchClient, SearchError};
use std::sync::Arc;
use thiserror::Error;

pub use answer::{compose, ChatEvent};
pub use enrichment::{gather, Enrichment};
pub use title::generate_title;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Search fetch failures end the request; relational ones never do.
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("answer stream could not be opened: {0}")]
    Answer(#[from] LlmError),
}

/// Collaborators shared by every request.
#[derive(Clone)]
pub struct PipelineDeps {
    pub llm: Arc<LlmManager>,
    pub search: Arc<SearchClient>,
    pub store: Arc<dyn ChatStore>,
    pub relational: Option<Arc<dyn RelationalSource>>,
    /// Mirrors `ENABLE_DATABASE_SEARCH`
    pub database_search: bool,
}
