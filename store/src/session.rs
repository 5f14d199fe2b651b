use sqlx::any::AnyRow;
use sqlx::{Any, AnyConnection, Row, Transaction};
use tracing::debug;

use crate::config::Backend;
use crate::models::{NewResearchQuery, NewResearchResult, QueryStatus, ResearchQuery, ResearchResult};
use crate::{Result, StoreError, timestamp};

const QUERY_COLUMNS: &str = "id, query, status, created_at, updated_at";
const RESULT_COLUMNS: &str =
    "id, query_id, title, content, source_url, relevance_score, created_at";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub status: Option<QueryStatus>,
    pub limit: Option<u32>,
}

/// A unit of work holding one pooled connection inside a transaction.
///
/// Nothing is visible to other sessions until [`Session::commit`]. Dropping the
/// session without committing rolls back and returns the connection.
pub struct Session {
    tx: Transaction<'static, Any>,
    backend: Backend,
}

impl Session {
    pub(crate) fn new(tx: Transaction<'static, Any>, backend: Backend) -> Self {
        Self { tx, backend }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub(crate) fn connection(&mut self) -> &mut AnyConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        debug!("session committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        debug!("session rolled back");
        Ok(())
    }

    pub async fn create_query(&mut self, new: &NewResearchQuery) -> Result<ResearchQuery> {
        let now = timestamp::now();
        let stamp = timestamp::encode(&now);

        let row = sqlx::query(
            "INSERT INTO research_queries (query, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(new.query())
        .bind(new.status().as_str())
        .bind(&stamp)
        .bind(&stamp)
        .fetch_one(&mut *self.tx)
        .await?;

        let id: i64 = row.try_get("id")?;
        debug!(query_id = id, "research query created");

        Ok(ResearchQuery {
            id,
            query: new.query().to_string(),
            status: new.status(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn get_query(&mut self, id: i64) -> Result<Option<ResearchQuery>> {
        let sql = format!("SELECT {QUERY_COLUMNS} FROM research_queries WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(query_from_row).transpose()
    }

    /// Set the status and bump `updated_at`. Transition order is not checked here;
    /// see [`QueryStatus::can_transition_to`].
    pub async fn set_query_status(&mut self, id: i64, status: QueryStatus) -> Result<ResearchQuery> {
        let sql = format!(
            "UPDATE research_queries SET status = $1, updated_at = $2 WHERE id = $3 \
             RETURNING {QUERY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(timestamp::encode(&timestamp::now()))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "research query",
                id,
            })?;

        debug!(query_id = id, %status, "research query status updated");
        query_from_row(&row)
    }

    /// Newest first.
    pub async fn list_queries(&mut self, filter: &QueryFilter) -> Result<Vec<ResearchQuery>> {
        let limit = i64::from(filter.limit.unwrap_or(50));

        let rows = match filter.status {
            Some(status) => {
                let sql = format!(
                    "SELECT {QUERY_COLUMNS} FROM research_queries WHERE status = $1 \
                     ORDER BY created_at DESC, id DESC LIMIT $2"
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .bind(limit)
                    .fetch_all(&mut *self.tx)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {QUERY_COLUMNS} FROM research_queries \
                     ORDER BY created_at DESC, id DESC LIMIT $1"
                );
                sqlx::query(&sql)
                    .bind(limit)
                    .fetch_all(&mut *self.tx)
                    .await?
            }
        };

        rows.iter().map(query_from_row).collect()
    }

    /// Remove a query and its results. The schema does not cascade, so results
    /// go first. Returns whether the query existed.
    pub async fn delete_query(&mut self, id: i64) -> Result<bool> {
        let results = sqlx::query("DELETE FROM research_results WHERE query_id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM research_queries WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        debug!(
            query_id = id,
            results = results.rows_affected(),
            "research query deleted"
        );
        Ok(deleted.rows_affected() > 0)
    }

    pub async fn add_result(&mut self, new: &NewResearchResult) -> Result<ResearchResult> {
        new.validate()?;
        let now = timestamp::now();

        // Optional columns are written as NULL literals rather than bound.
        let mut next = 4;
        let mut placeholder = |present: bool| {
            if present {
                next += 1;
                format!("${next}")
            } else {
                "NULL".to_string()
            }
        };
        let url_slot = placeholder(new.source_url.is_some());
        let score_slot = placeholder(new.relevance_score.is_some());

        let sql = format!(
            "INSERT INTO research_results \
             (query_id, title, content, created_at, source_url, relevance_score) \
             VALUES ($1, $2, $3, $4, {url_slot}, {score_slot}) RETURNING id"
        );
        let mut insert = sqlx::query(&sql)
            .bind(new.query_id)
            .bind(new.title.as_str())
            .bind(new.content.as_str())
            .bind(timestamp::encode(&now));
        if let Some(url) = &new.source_url {
            insert = insert.bind(url.as_str());
        }
        if let Some(score) = new.relevance_score {
            insert = insert.bind(score);
        }

        let row = insert.fetch_one(&mut *self.tx).await?;

        Ok(ResearchResult {
            id: row.try_get("id")?,
            query_id: new.query_id,
            title: new.title.clone(),
            content: new.content.clone(),
            source_url: new.source_url.clone(),
            relevance_score: new.relevance_score,
            created_at: now,
        })
    }

    pub async fn add_results(&mut self, new: &[NewResearchResult]) -> Result<Vec<ResearchResult>> {
        let mut stored = Vec::with_capacity(new.len());
        for result in new {
            stored.push(self.add_result(result).await?);
        }
        Ok(stored)
    }

    pub async fn get_result(&mut self, id: i64) -> Result<Option<ResearchResult>> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM research_results WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(result_from_row).transpose()
    }

    /// Most relevant first; results without a score come last.
    pub async fn results_for_query(&mut self, query_id: i64) -> Result<Vec<ResearchResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM research_results WHERE query_id = $1 \
             ORDER BY CASE WHEN relevance_score IS NULL THEN 1 ELSE 0 END, \
             relevance_score DESC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(query_id)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.iter().map(result_from_row).collect()
    }
}

fn query_from_row(row: &AnyRow) -> Result<ResearchQuery> {
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ResearchQuery {
        id: row.try_get("id")?,
        query: row.try_get("query")?,
        status: QueryStatus::parse_column(&status)?,
        created_at: timestamp::decode("created_at", &created_at)?,
        updated_at: timestamp::decode("updated_at", &updated_at)?,
    })
}

fn result_from_row(row: &AnyRow) -> Result<ResearchResult> {
    let created_at: String = row.try_get("created_at")?;

    Ok(ResearchResult {
        id: row.try_get("id")?,
        query_id: row.try_get("query_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        source_url: row.try_get("source_url")?,
        relevance_score: row.try_get("relevance_score")?,
        created_at: timestamp::decode("created_at", &created_at)?,
    })
}
