//! The `internet_search` tool, backed by the Tavily search API.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agent::Result;
use agent::llm::Message;
use agent::tools::{FunctionalTool, ToolCall, ToolDefinition};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

pub const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
pub const DEFAULT_MAX_RESULTS: u8 = 5;
pub const MAX_RESULTS_LIMIT: u8 = 20;
/// Attempts per search, including the first.
pub const SEARCH_ATTEMPTS: usize = 3;

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl SearchError {
    /// Worth another attempt: timeouts, connection failures, rate limiting and
    /// server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Request(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            SearchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    General,
    News,
    Finance,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u8,
    pub topic: Topic,
    pub include_raw_content: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: DEFAULT_MAX_RESULTS,
            topic: Topic::General,
            include_raw_content: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub raw_content: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

pub struct TavilyClient {
    http: Client,
    api_key: String,
    endpoint: String,
    retry_delay: Duration,
}

impl TavilyClient {
    pub fn new(http: Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            endpoint: TAVILY_ENDPOINT.to_string(),
            retry_delay: RETRY_INITIAL_DELAY,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Delay before the first retry; each later retry waits twice as long.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        let factor = (self.retry_delay.as_millis() / 2).max(1) as u64;
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(RETRY_MAX_DELAY)
            .take(SEARCH_ATTEMPTS - 1)
    }

    pub async fn search(&self, request: &SearchRequest) -> std::result::Result<Vec<SearchHit>, SearchError> {
        RetryIf::spawn(
            self.retry_strategy(),
            || self.send(request),
            |err: &SearchError| {
                let retry = err.is_transient();
                if retry {
                    warn!(error = %err, "search failed, retrying");
                }
                retry
            },
        )
        .await
    }

    async fn send(&self, request: &SearchRequest) -> std::result::Result<Vec<SearchHit>, SearchError> {
        debug!(query = %request.query, topic = ?request.topic, "searching");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }
}

/// Every hit returned during a run, shared by all search tool instances.
#[derive(Clone, Default)]
pub struct SearchLog(Arc<Mutex<Vec<SearchHit>>>);

impl SearchLog {
    pub async fn record(&self, hits: &[SearchHit]) {
        self.0.lock().await.extend_from_slice(hits);
    }

    pub async fn hits(&self) -> Vec<SearchHit> {
        self.0.lock().await.clone()
    }

    /// One hit per url, keeping the highest score, best first.
    pub async fn distinct(&self) -> Vec<SearchHit> {
        let mut best: HashMap<String, SearchHit> = HashMap::new();
        for hit in self.hits().await {
            match best.get(&hit.url) {
                Some(kept) if kept.score.unwrap_or(f64::MIN) >= hit.score.unwrap_or(f64::MIN) => {}
                _ => {
                    best.insert(hit.url.clone(), hit);
                }
            }
        }

        let mut hits: Vec<SearchHit> = best.into_values().collect();
        hits.sort_by(|a, b| {
            b.score
                .unwrap_or(f64::MIN)
                .total_cmp(&a.score.unwrap_or(f64::MIN))
                .then_with(|| a.url.cmp(&b.url))
        });
        hits
    }
}

#[derive(Deserialize, JsonSchema)]
struct SearchArgs {
    /// search terms
    query: String,
    /// number of results, 1 to 20 (default 5)
    max_results: Option<u8>,
    /// general, news or finance (default general)
    topic: Option<Topic>,
    /// include the full page text (default false)
    include_raw_content: Option<bool>,
}

/// Agent tool: one instance per agent, all sharing the client and the log.
#[derive(Clone)]
pub struct InternetSearch {
    client: Arc<TavilyClient>,
    log: SearchLog,
}

impl InternetSearch {
    pub fn new(client: Arc<TavilyClient>, log: SearchLog) -> Self {
        Self { client, log }
    }
}

fn format_hits(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No results for \"{query}\".");
    }

    let mut s = format!("Search results for \"{query}\":\n");
    for (i, hit) in hits.iter().enumerate() {
        s.push_str(&format!("\n{}. {}\n   {}\n", i + 1, hit.title, hit.url));
        if let Some(score) = hit.score {
            s.push_str(&format!("   relevance: {score:.2}\n"));
        }
        if !hit.content.is_empty() {
            s.push_str(&format!("   {}\n", hit.content));
        }
        if let Some(raw) = &hit.raw_content {
            s.push_str(&format!("   full text:\n{raw}\n"));
        }
    }
    s
}

#[async_trait]
impl FunctionalTool for InternetSearch {
    fn definition(&self) -> Result<ToolDefinition> {
        ToolDefinition::new::<SearchArgs>(
            "internet_search",
            "search the web and return the most relevant pages with a short excerpt of each",
        )
    }

    async fn invoke_fn(&mut self, call: &ToolCall) -> Result<Message> {
        let args: SearchArgs = call.args()?;
        let request = SearchRequest {
            query: args.query,
            max_results: args
                .max_results
                .unwrap_or(DEFAULT_MAX_RESULTS)
                .clamp(1, MAX_RESULTS_LIMIT),
            topic: args.topic.unwrap_or_default(),
            include_raw_content: args.include_raw_content.unwrap_or(false),
        };

        // failures go back to the model so it can rephrase or carry on
        let result = match self.client.search(&request).await {
            Ok(hits) => {
                self.log.record(&hits).await;
                format_hits(&request.query, &hits)
            }
            Err(err) => {
                warn!(query = %request.query, error = %err, "search failed");
                format!(
                    "internet_search failed after {SEARCH_ATTEMPTS} attempts: {err}. Try a different query or continue with what you have."
                )
            }
        };

        Ok(call.reply(result))
    }
}
