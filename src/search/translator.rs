use crate::llm::{GenerationRequest, LlmManager};
use crate::prompts::search_query_prompt;
use crate::search::query::{query_document_schema, SearchQueryDocument};
use crate::search::temporal;
use chrono::NaiveDate;
use tracing::{debug, error, warn};

/// Turns a user message into a validated search query document.
///
/// Returns `None` rather than an error when generation or validation fails:
/// callers skip search enrichment in that case.
pub async fn translate(
    llm: &LlmManager,
    message: &str,
    today: NaiveDate,
) -> Option<SearchQueryDocument> {
    if message.trim().is_empty() {
        warn!("Refusing to translate an empty message into a search query");
        return None;
    }

    let request = GenerationRequest::prompt(search_query_prompt(message, today));
    let mut document: SearchQueryDocument = match llm
        .generate_object(request, &query_document_schema())
        .await
    {
        Ok(doc) => doc,
        Err(e) => {
            error!("Error generating search query: {}", e);
            return None;
        }
    };

    temporal::apply(&mut document, message, today);
    debug!(
        "Search query for {:?}: keywords={:?} range={:?}",
        message,
        document.query.query_string.query,
        document.time_range()
    );

    Some(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn manager(output: &str) -> LlmManager {
        LlmManager::with_provider(Box::new(ScriptedModel::new().with_completion(output)), "m")
    }

    const WITH_GUESSED_RANGE: &str = r#"{
        "query": { "query_string": { "query": "error" } },
        "post_filter": { "range": { "@timestamp": { "gte": "2023-01-01T00:00:00Z", "lte": "2023-12-31T23:59:59Z" } } },
        "sort": [ { "@timestamp": { "order": "desc" } } ],
        "size": 100
    }"#;

    #[tokio::test]
    async fn test_filter_dropped_without_temporal_language() {
        let doc = translate(&manager(WITH_GUESSED_RANGE), "show me errors", today())
            .await
            .unwrap();
        assert!(doc.post_filter.is_none());
        assert_eq!(doc.query.query_string.query, "error");
    }

    #[tokio::test]
    async fn test_month_name_overrides_model_range() {
        let doc = translate(&manager(WITH_GUESSED_RANGE), "errors in April", today())
            .await
            .unwrap();
        let range = doc.time_range().unwrap();
        assert_eq!(range.gte, "2024-04-01T00:00:00Z");
        assert_eq!(range.lte, "2024-04-30T23:59:59Z");
    }

    #[tokio::test]
    async fn test_vague_time_keeps_model_range() {
        let doc = translate(&manager(WITH_GUESSED_RANGE), "recent errors", today())
            .await
            .unwrap();
        assert_eq!(doc.time_range().unwrap().gte, "2023-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_invalid_output_is_none() {
        assert!(translate(&manager(r#"{"match_all": {}}"#), "errors", today()).await.is_none());
        assert!(translate(&manager("not json"), "errors", today()).await.is_none());
    }

    #[tokio::test]
    async fn test_generation_failure_is_none() {
        let llm = LlmManager::with_provider(Box::new(ScriptedModel::failing()), "m");
        assert!(translate(&llm, "errors", today()).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_message_skips_model() {
        let model = ScriptedModel::new().with_completion(WITH_GUESSED_RANGE);
        let calls = model.seen_models();
        let llm = LlmManager::with_provider(Box::new(model), "m");
        assert!(translate(&llm, "   ", today()).await.is_none());
        assert!(calls.lock().unwrap().is_empty());
    }
}
