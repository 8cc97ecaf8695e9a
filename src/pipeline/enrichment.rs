use crate::pipeline::{PipelineDeps, PipelineError};
use crate::relational::{RelationalError, RelationalSource};
use crate::search::translator::translate;
use crate::search::SearchError;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{error, info, warn};

/// Results gathered for one request. Built once, then only read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub search: Option<Value>,
    pub database: Option<Value>,
}

impl Enrichment {
    /// Search results as prompt text; an absent source renders as `null`.
    pub fn search_json(&self) -> String {
        prompt_json(&self.search)
    }

    pub fn database_json(&self) -> String {
        prompt_json(&self.database)
    }
}

fn prompt_json(value: &Option<Value>) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Runs search and database enrichment side by side.
pub async fn gather(deps: &PipelineDeps, message: &str) -> Result<Enrichment, PipelineError> {
    gather_on(deps, message, Utc::now().date_naive()).await
}

/// `gather` with an explicit current date for relative time expressions.
pub async fn gather_on(
    deps: &PipelineDeps,
    message: &str,
    today: NaiveDate,
) -> Result<Enrichment, PipelineError> {
    let (search, database) = tokio::join!(
        search_enrichment(deps, message, today),
        database_enrichment(deps, message)
    );

    Ok(Enrichment {
        search: search?,
        database,
    })
}

async fn search_enrichment(
    deps: &PipelineDeps,
    message: &str,
    today: NaiveDate,
) -> Result<Option<Value>, SearchError> {
    let Some(document) = translate(&deps.llm, message, today).await else {
        warn!("No search query could be generated, answering without search results");
        return Ok(None);
    };

    // Without results there is nothing to cite, so fetch failures end the request
    match deps.search.fetch(&document).await {
        Ok(results) => Ok(Some(results)),
        Err(e) => {
            error!("Error fetching from search endpoint: {}", e);
            Err(e)
        }
    }
}

async fn database_enrichment(deps: &PipelineDeps, message: &str) -> Option<Value> {
    if !deps.database_search {
        return None;
    }
    let Some(source) = deps.relational.as_deref() else {
        warn!("Database search enabled but no relational source is configured");
        return None;
    };

    match query_relational(source, message).await {
        Ok(rows) => {
            info!("Database enrichment returned results");
            Some(rows)
        }
        Err(e) => {
            error!("Error executing database query: {}", e);
            None
        }
    }
}

async fn query_relational(
    source: &dyn RelationalSource,
    message: &str,
) -> Result<Value, RelationalError> {
    let sql = source.generate_query(message).await?;
    source.run_query(&sql).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::llm::LlmManager;
    use crate::search::SearchClient;
    use crate::testing::{serve, CountingRelational, MemoryChatStore, ScriptedModel};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const QUERY: &str = r#"{
        "query": { "query_string": { "query": "error" } },
        "sort": [{ "@timestamp": { "order": "desc" } }],
        "size": 100
    }"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    fn deps(
        model: ScriptedModel,
        search_url: Option<String>,
        relational: Option<CountingRelational>,
        database_search: bool,
    ) -> PipelineDeps {
        PipelineDeps {
            llm: Arc::new(LlmManager::with_provider(Box::new(model), "m")),
            search: Arc::new(
                SearchClient::new(&SearchConfig {
                    url: search_url,
                    ..SearchConfig::default()
                })
                .unwrap(),
            ),
            store: Arc::new(MemoryChatStore::new()),
            relational: relational.map(|r| Arc::new(r) as Arc<dyn RelationalSource>),
            database_search,
        }
    }

    async fn search_endpoint() -> String {
        serve(Router::new().route(
            "/logs/_search",
            post(|Json(body): Json<Value>| async move {
                Json(json!({ "hits": { "hits": [{ "_source": { "q": body["query"]["query_string"]["query"] } }] } }))
            }),
        ))
        .await
    }

    #[tokio::test]
    async fn test_database_not_consulted_when_flag_off() {
        let relational = CountingRelational::returning(json!([{ "n": 1 }]));
        let calls = relational.calls();
        let deps = deps(ScriptedModel::new().with_completion("nope"), None, Some(relational), false);

        let enrichment = gather_on(&deps, "how many errors?", today()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(enrichment.database, None);
    }

    #[tokio::test]
    async fn test_search_and_database_both_collected() {
        let relational = CountingRelational::returning(json!([{ "n": 3 }]));
        let calls = relational.calls();
        let url = search_endpoint().await;
        let deps = deps(ScriptedModel::new().with_completion(QUERY), Some(url), Some(relational), true);

        let enrichment = gather_on(&deps, "how many errors?", today()).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(enrichment.database, Some(json!([{ "n": 3 }])));
        assert_eq!(enrichment.search.unwrap()["hits"]["hits"][0]["_source"]["q"], "error");
    }

    #[tokio::test]
    async fn test_database_failure_is_swallowed() {
        let relational = CountingRelational::failing("no such table");
        let deps = deps(ScriptedModel::new().with_completion("nope"), None, Some(relational), true);

        let enrichment = gather_on(&deps, "errors", today()).await.unwrap();
        assert_eq!(enrichment, Enrichment::default());
    }

    #[tokio::test]
    async fn test_missing_search_url_fails_the_request() {
        let deps = deps(ScriptedModel::new().with_completion(QUERY), None, None, false);

        let err = gather_on(&deps, "errors", today()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Search(SearchError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_untranslatable_message_skips_search() {
        let url = search_endpoint().await;
        let deps = deps(ScriptedModel::new().with_completion("I cannot help"), Some(url), None, false);

        let enrichment = gather_on(&deps, "errors", today()).await.unwrap();
        assert_eq!(enrichment.search, None);
    }

    #[tokio::test]
    async fn test_transport_failure_fails_the_request() {
        let url = serve(Router::new().route(
            "/logs/_search",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let deps = deps(ScriptedModel::new().with_completion(QUERY), Some(url), None, false);

        let err = gather_on(&deps, "errors", today()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Search(SearchError::Transport { status: 500, .. })
        ));
    }

    #[test]
    fn test_absent_sources_render_as_null() {
        let enrichment = Enrichment {
            search: None,
            database: Some(json!([{ "n": 1 }])),
        };
        assert_eq!(enrichment.search_json(), "null");
        assert_eq!(enrichment.database_json(), r#"[{"n":1}]"#);
    }
}
