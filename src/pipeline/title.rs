use crate::llm::{GenerationRequest, LlmManager, PromptMessage};
use crate::prompts::TITLE_SYSTEM_PROMPT;
use tracing::warn;

const MAX_TITLE_CHARS: usize = 80;

/// Short title for a new chat, summarising its first user message.
///
/// Falls back to the (truncated) message itself when the model is unavailable.
pub async fn generate_title(llm: &LlmManager, message: &str) -> String {
    let prompt = serde_json::to_string(&PromptMessage::user(message))
        .unwrap_or_else(|_| message.to_string());
    let request = GenerationRequest::prompt(prompt).with_system(TITLE_SYSTEM_PROMPT);

    match llm.generate_text(request).await {
        Ok(title) if !title.trim().is_empty() => clean_title(&title),
        Ok(_) => {
            warn!("Model returned an empty chat title");
            clean_title(message)
        }
        Err(e) => {
            warn!("Title generation failed, using the message instead: {}", e);
            clean_title(message)
        }
    }
}

fn clean_title(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '"' | ':'))
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    cleaned.chars().take(MAX_TITLE_CHARS).collect()
}
