use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::StoreError;

pub const MAX_TITLE_LEN: usize = 500;
pub const MAX_SOURCE_URL_LEN: usize = 1000;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Processing => "processing",
            QueryStatus::Completed => "completed",
            QueryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QueryStatus::Completed | QueryStatus::Failed)
    }

    /// Whether moving to `next` follows pending -> processing -> completed|failed.
    ///
    /// The store does not call this; callers that want monotonic transitions check it
    /// before calling `Session::set_query_status`.
    pub fn can_transition_to(self, next: QueryStatus) -> bool {
        use QueryStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub(crate) fn parse_column(raw: &str) -> Result<Self, StoreError> {
        raw.parse()
            .map_err(|_| StoreError::InvalidStatus(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchQuery {
    pub id: i64,
    pub query: String,
    pub status: QueryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResearchQuery {
    query: String,
    status: QueryStatus,
}

impl NewResearchQuery {
    pub fn new(query: impl Into<String>) -> Result<Self, StoreError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(StoreError::Validation(
                "query text must not be empty".to_string(),
            ));
        }
        Ok(Self {
            query,
            status: QueryStatus::Pending,
        })
    }

    pub fn with_status(mut self, status: QueryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchResult {
    pub id: i64,
    pub query_id: i64,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
    pub relevance_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewResearchResult {
    pub query_id: i64,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
    pub relevance_score: Option<f64>,
}

impl NewResearchResult {
    pub fn new(query_id: i64, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            query_id,
            title: title.into(),
            content: content.into(),
            source_url: None,
            relevance_score: None,
        }
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn relevance(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Validation(
                "result title must not be empty".to_string(),
            ));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(StoreError::Validation(format!(
                "result title exceeds {MAX_TITLE_LEN} characters"
            )));
        }
        if let Some(url) = &self.source_url {
            if url.chars().count() > MAX_SOURCE_URL_LEN {
                return Err(StoreError::Validation(format!(
                    "source url exceeds {MAX_SOURCE_URL_LEN} characters"
                )));
            }
        }
        if let Some(score) = self.relevance_score {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(StoreError::Validation(format!(
                    "relevance score {score} is outside 0.0..=1.0"
                )));
            }
        }
        Ok(())
    }
}
