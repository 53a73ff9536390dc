//! Google Programmable Search (Custom Search JSON API) client.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::logging::OpTimer;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("API Key or Search Engine ID not found.")]
    MissingCredentials,
    #[error("The search request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub pagemap: Value,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Web,
    Image,
}

#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    api_key: Option<String>,
    engine_id: Option<String>,
    base_url: String,
}

impl SearchClient {
    pub fn new(
        client: Client,
        api_key: Option<String>,
        engine_id: Option<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            engine_id,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(client: Client, config: &crate::config::SearchConfig) -> Self {
        Self::new(
            client,
            config.api_key.clone(),
            config.engine_id.clone(),
            &config.base_url,
        )
    }

    /// Ranked results for `query`; empty when nothing matched.
    pub async fn search(&self, query: &str, kind: SearchKind) -> Result<Vec<SearchItem>, SearchError> {
        let (Some(key), Some(cx)) = (self.api_key.as_deref(), self.engine_id.as_deref()) else {
            return Err(SearchError::MissingCredentials);
        };

        let timer = OpTimer::new("search", "custom_search");
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("key", key), ("cx", cx), ("q", query)]);
        if kind == SearchKind::Image {
            request = request.query(&[("searchType", "image")]);
        }

        let result: Result<Vec<SearchItem>, SearchError> = async {
            let response: SearchResponse = request.send().await?.error_for_status()?.json().await?;
            Ok(response.items)
        }
        .await;
        timer.finish_with_result(&result);
        result
    }
}
