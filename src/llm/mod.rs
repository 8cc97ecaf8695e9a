pub mod models;
pub mod providers;
pub mod stream;

use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use models::{GenerationRequest, ObjectSchema, PromptMessage, ResponseFormat, Role};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
    #[error("LLM output failed validation: {0}")]
    ValidationError(String),
}

/// Finite stream of answer tokens. Not restartable.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single completion; with `ResponseFormat::Json` the provider must ask the
    /// backend for schema-constrained JSON and return it verbatim.
    async fn complete(
        &self,
        model: &str,
        request: &GenerationRequest,
        format: ResponseFormat<'_>,
    ) -> Result<String, LlmError>;

    async fn stream(&self, model: &str, request: &GenerationRequest)
        -> Result<TokenStream, LlmError>;
}

pub struct LlmManager {
    provider: Box<dyn LanguageModel>,
    default_model: String,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider: Box<dyn LanguageModel> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self::with_provider(provider, config.model.clone()))
    }

    pub fn with_provider(provider: Box<dyn LanguageModel>, default_model: impl Into<String>) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
        }
    }

    fn model_for<'a>(&'a self, request: &'a GenerationRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.default_model)
    }

    pub async fn generate_text(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let model = self.model_for(&request);
        self.provider
            .complete(model, &request, ResponseFormat::Text)
            .await
    }

    /// Structured generation: output that is not JSON, violates `schema`, or
    /// does not fit `T` is rejected with `ValidationError`.
    pub async fn generate_object<T: DeserializeOwned>(
        &self,
        request: GenerationRequest,
        schema: &ObjectSchema,
    ) -> Result<T, LlmError> {
        let model = self.model_for(&request);
        let raw = self
            .provider
            .complete(model, &request, ResponseFormat::Json(schema))
            .await?;
        debug!(schema = schema.name, "structured output: {}", raw);

        let value = validate_object(&raw, schema)?;
        serde_json::from_value(value).map_err(|e| {
            LlmError::ValidationError(format!("{} does not match its type: {}", schema.name, e))
        })
    }

    pub async fn stream_text(&self, request: GenerationRequest) -> Result<TokenStream, LlmError> {
        let model = self.model_for(&request);
        self.provider.stream(model, &request).await
    }
}

/// Parses raw model output and checks it against the schema.
pub fn validate_object(raw: &str, schema: &ObjectSchema) -> Result<Value, LlmError> {
    let value: Value = serde_json::from_str(strip_code_fence(raw)).map_err(|e| {
        LlmError::ValidationError(format!("{} is not valid JSON: {}", schema.name, e))
    })?;

    let validator = jsonschema::validator_for(&schema.schema)
        .map_err(|e| LlmError::ConfigError(format!("invalid schema {}: {}", schema.name, e)))?;

    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        warn!(schema = schema.name, "structured output rejected: {}", errors.join("; "));
        return Err(LlmError::ValidationError(errors.join("; ")));
    }

    Ok(value)
}

// Models occasionally wrap JSON in ```json fences despite instructions
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use serde::Deserialize;
    use serde_json::json;

    fn point_schema() -> ObjectSchema {
        ObjectSchema {
            name: "point",
            schema: json!({
                "type": "object",
                "properties": {
                    "x": { "type": "number" },
                    "y": { "type": "number" }
                },
                "required": ["x", "y"]
            }),
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_validate_rejects_missing_field() {
        let err = validate_object(r#"{"x": 1}"#, &point_schema()).unwrap_err();
        assert!(matches!(err, LlmError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_generate_object_parses_valid_output() {
        let manager = LlmManager::with_provider(
            Box::new(ScriptedModel::new().with_completion(r#"{"x": 1, "y": 2.5}"#)),
            "test-model",
        );
        let point: Point = manager
            .generate_object(GenerationRequest::prompt("where?"), &point_schema())
            .await
            .unwrap();
        assert_eq!(point, Point { x: 1.0, y: 2.5 });
    }

    #[tokio::test]
    async fn test_generate_object_rejects_prose() {
        let manager = LlmManager::with_provider(
            Box::new(ScriptedModel::new().with_completion("Sure! Here is your point.")),
            "test-model",
        );
        let result: Result<Point, _> = manager
            .generate_object(GenerationRequest::prompt("where?"), &point_schema())
            .await;
        assert!(matches!(result, Err(LlmError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_default_model_used_when_unset() {
        let model = ScriptedModel::new().with_completion("ok");
        let seen = model.seen_models();
        let manager = LlmManager::with_provider(Box::new(model), "fallback");

        manager.generate_text(GenerationRequest::prompt("a")).await.unwrap();
        manager
            .generate_text(GenerationRequest::prompt("b").with_model("explicit"))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["fallback", "explicit"]);
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let config = LlmConfig {
            backend: "local".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(LlmManager::new(&config), Err(LlmError::ConfigError(_))));
    }
}
