use crate::db::ChatMessage;
use crate::llm::{GenerationRequest, PromptMessage, Role};
use crate::pipeline::{Enrichment, PipelineDeps, PipelineError};
use crate::prompts::answer_prompt;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

const EVENT_BUFFER: usize = 64;

/// What the client sees of an answer, in order: deltas, then one metadata or
/// error event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Delta(String),
    Metadata { message_id: String },
    Error(String),
}

/// Streams an answer grounded in `enrichment`.
///
/// Fails only when the model stream cannot be opened. Once streaming, the
/// full answer is stored as an assistant message before the metadata event
/// is sent and the channel closes.
pub async fn compose(
    deps: &PipelineDeps,
    chat_id: &str,
    messages: Vec<PromptMessage>,
    enrichment: Enrichment,
    model: &str,
) -> Result<mpsc::Receiver<ChatEvent>, PipelineError> {
    let user_query = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let system = answer_prompt(
        &enrichment.search_json(),
        &enrichment.database_json(),
        &user_query,
    );
    let request = GenerationRequest::conversation(messages)
        .with_system(system)
        .with_model(model);

    let mut tokens = deps.llm.stream_text(request).await?;
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let store = deps.store.clone();
    let chat_id = chat_id.to_string();

    tokio::spawn(async move {
        let mut answer = String::new();
        let mut client_gone = false;

        while let Some(token) = tokens.next().await {
            match token {
                Ok(text) => {
                    answer.push_str(&text);
                    if !client_gone && tx.send(ChatEvent::Delta(text)).await.is_err() {
                        debug!("Client disconnected from chat {}, finishing answer anyway", chat_id);
                        client_gone = true;
                    }
                }
                Err(e) => {
                    error!("Answer stream for chat {} failed: {}", chat_id, e);
                    let _ = tx.send(ChatEvent::Error(e.to_string())).await;
                    return;
                }
            }
        }

        let message = ChatMessage::new(&chat_id, Role::Assistant, answer);
        let message_id = message.id.clone();
        match store.save_messages(vec![message]).await {
            Ok(()) => info!("Saved answer {} for chat {}", message_id, chat_id),
            Err(e) => error!("Failed to save chat {}: {}", chat_id, e),
        }

        let _ = tx.send(ChatEvent::Metadata { message_id }).await;
    });

    Ok(rx)
}
