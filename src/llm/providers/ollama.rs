use crate::config::LlmConfig;
use crate::llm::stream::lines;
use crate::llm::{
    GenerationRequest, LanguageModel, LlmError, PromptMessage, ResponseFormat, TokenStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    // Use serde to ignore unknown fields
    #[serde(flatten)]
    extra: std::collections::HashMap<String, Value>,
}

#[derive(Deserialize, Debug)]
struct OllamaMessage {
    content: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/chat".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self { client, api_url })
    }

    async fn send(&self, request: &OllamaRequest<'_>) -> Result<reqwest::Response, LlmError> {
        info!("Sending request to Ollama with model: {}", request.model);
        debug!("API URL: {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            // Try to get the error message from the response body
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::ResponseError(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        Ok(response)
    }
}

/// One NDJSON line of a streamed chat response.
fn parse_ndjson_line(line: &str) -> Result<Option<String>, LlmError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let chunk: OllamaResponse = serde_json::from_str(line)
        .map_err(|e| LlmError::ResponseError(format!("Malformed Ollama chunk: {}", e)))?;
    if let Some(err) = chunk.extra.get("error").and_then(Value::as_str) {
        return Err(LlmError::ResponseError(err.to_string()));
    }
    Ok(chunk
        .message
        .map(|m| m.content)
        .filter(|c| !c.is_empty()))
}

#[async_trait]
impl LanguageModel for OllamaProvider {
    async fn complete(
        &self,
        model: &str,
        request: &GenerationRequest,
        format: ResponseFormat<'_>,
    ) -> Result<String, LlmError> {
        let body = OllamaRequest {
            model,
            messages: request.flattened(),
            stream: false,
            format: match format {
                ResponseFormat::Text => None,
                ResponseFormat::Json(schema) => Some(schema.schema.clone()),
            },
            options: OllamaOptions { temperature: 0.1 },
        };

        let response_text = self
            .send(&body)
            .await?
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response = match serde_json::from_str::<OllamaResponse>(&response_text) {
            Ok(resp) => resp,
            Err(e) => {
                error!("Failed to parse Ollama response: {} - Response was: {}", e, response_text);
                return Err(LlmError::ResponseError(format!(
                    "Failed to parse Ollama response: {}",
                    e
                )));
            }
        };

        if !ollama_response.done {
            debug!("Ollama reported an unfinished non-streaming response");
        }

        ollama_response
            .message
            .map(|m| m.content)
            .ok_or_else(|| LlmError::ResponseError("Ollama response had no message".to_string()))
    }

    async fn stream(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<TokenStream, LlmError> {
        let body = OllamaRequest {
            model,
            messages: request.flattened(),
            stream: true,
            format: None,
            options: OllamaOptions { temperature: 0.7 },
        };

        let response = self.send(&body).await?;
        let tokens = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_ndjson_line(&line).transpose(),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(tokens.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ndjson_line() {
        let line = r#"{"model":"llama3","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        assert_eq!(parse_ndjson_line(line).unwrap().as_deref(), Some("Hi"));

        let last = r#"{"model":"llama3","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_ndjson_line(last).unwrap(), None);

        assert!(parse_ndjson_line(r#"{"error":"model not found"}"#).is_err());
        assert_eq!(parse_ndjson_line("").unwrap(), None);
    }
}
