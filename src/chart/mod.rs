//! Chart configuration from tabular results and a server-side bar renderer.

pub mod config;
pub mod generator;
pub mod render;

use crate::llm::LlmError;
use serde_json::{Map, Value};
use thiserror::Error;

pub use config::{ChartConfig, ChartKind, FALLBACK_PALETTE};
pub use generator::generate;
pub use render::{render, render_html, ChartView};

/// One row of tabular data, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("no chart data provided")]
    EmptyData,
    #[error("Failed to generate chart config: {0}")]
    Generation(#[from] LlmError),
}
