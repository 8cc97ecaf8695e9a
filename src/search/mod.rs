pub mod client;
pub mod query;
pub mod temporal;
pub mod translator;

use thiserror::Error;

pub use client::SearchClient;
pub use query::SearchQueryDocument;

#[derive(Debug, Error)]
pub enum SearchError {
    /// Required endpoint configuration is missing. Fatal for the request.
    #[error("search configuration error: {0}")]
    Configuration(String),
    #[error("search endpoint error: {status} {reason}")]
    Transport { status: u16, reason: String },
    #[error("search request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("search response was not JSON: {0}")]
    Decode(String),
}
