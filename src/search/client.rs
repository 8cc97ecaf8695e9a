use crate::config::SearchConfig;
use crate::search::query::SearchQueryDocument;
use crate::search::SearchError;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

/// Issues query documents against the search endpoint.
pub struct SearchClient {
    client: reqwest::Client,
    url: Option<String>,
    username: String,
    password: String,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SearchError::Request)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Executes the document and returns the engine's raw JSON response.
    pub async fn fetch(&self, document: &SearchQueryDocument) -> Result<Value, SearchError> {
        let url = self.url.as_deref().ok_or_else(|| {
            SearchError::Configuration(
                "ELASTICSEARCH_URL is not defined. Set it in the environment or the [search] section of the config"
                    .to_string(),
            )
        })?;

        info!("Querying search endpoint for {:?}", document.query.query_string.query);
        debug!("Search request body: {:?}", serde_json::to_string(document));

        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(document)
            .send()
            .await
            .map_err(SearchError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Search endpoint responded with status code: {} - {}", status, body);
            return Err(SearchError::Transport {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        response.json().await.map_err(|e| SearchError::Decode(e.to_string()))
    }
}
