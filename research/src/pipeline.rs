//! One research run, end to end.
//!
//! With a database the query is recorded as `pending`, moved to `processing`
//! while the agent works, and finished as `completed` (with the report and
//! every distinct source) or `failed`. Each transition is its own session so
//! other readers see the progress.

use agent::callbacks::Callback;
use store::models::{MAX_SOURCE_URL_LEN, MAX_TITLE_LEN};
use store::{
    DatabaseManager, Migrator, NewResearchQuery, NewResearchResult, QueryStatus, ResearchQuery,
    StoreError,
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::agents::{self, AgentKind, Toolbox};
use crate::search::{SearchHit, SearchLog};
use crate::telemetry::{LangfuseTracer, RunTrace};

pub const REPORT_TITLE: &str = "Research report";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Agent(#[from] agent::Error),

    #[error("the {0} agent stopped without a report")]
    NoReport(AgentKind),

    #[error(
        "database schema is at version {current}, version {declared} is required; run `research db migrate up`"
    )]
    SchemaBehind { current: i64, declared: i64 },
}

pub struct RunRequest {
    pub query: String,
    pub agent: AgentKind,
    pub thread_id: Option<String>,
    pub transcript: Option<Box<dyn Callback + Send>>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>, agent: AgentKind) -> Self {
        Self {
            query: query.into(),
            agent,
            thread_id: None,
            transcript: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Set when the run was persisted.
    pub query_id: Option<i64>,
    pub report: String,
    /// Distinct search hits, best first.
    pub sources: Vec<SearchHit>,
}

pub struct Pipeline<'a> {
    toolbox: Toolbox,
    log: SearchLog,
    db: Option<&'a DatabaseManager>,
    tracer: Option<&'a LangfuseTracer>,
}

impl<'a> Pipeline<'a> {
    /// `log` must be the log the toolbox's search tool records into.
    pub fn new(toolbox: Toolbox, log: SearchLog) -> Self {
        Self {
            toolbox,
            log,
            db: None,
            tracer: None,
        }
    }

    pub fn with_database(mut self, db: &'a DatabaseManager) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_tracer(mut self, tracer: &'a LangfuseTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, PipelineError> {
        let mut trace = RunTrace::start(request.agent, &request.query, request.thread_id.clone());

        let outcome = self.run_traced(request, &mut trace).await;
        match &outcome {
            Ok(outcome) => trace.output = Some(outcome.report.clone()),
            Err(err) => trace.error = Some(err.to_string()),
        }
        if let Some(tracer) = self.tracer {
            tracer.record(&trace).await;
        }

        outcome
    }

    async fn run_traced(
        &self,
        request: RunRequest,
        trace: &mut RunTrace,
    ) -> Result<RunOutcome, PipelineError> {
        let Some(db) = self.db else {
            let report = self.research(request).await?;
            return Ok(RunOutcome {
                query_id: None,
                report,
                sources: self.log.distinct().await,
            });
        };

        ensure_schema(db).await?;

        let new = NewResearchQuery::new(request.query.clone())?;
        let query = db
            .session(move |s| Box::pin(async move { s.create_query(&new).await }))
            .await?;
        let id = query.id;
        trace.query_id = Some(id);
        info!(query_id = id, agent = %request.agent, "research query recorded");

        set_status(db, id, QueryStatus::Processing).await?;

        let finished = match self.research(request).await {
            Ok(report) => {
                let sources = self.log.distinct().await;
                store_findings(db, id, &report, &sources)
                    .await
                    .map(|_| (report, sources))
                    .map_err(PipelineError::from)
            }
            Err(err) => Err(err),
        };

        match finished {
            Ok((report, sources)) => {
                info!(query_id = id, sources = sources.len(), "research completed");
                Ok(RunOutcome {
                    query_id: Some(id),
                    report,
                    sources,
                })
            }
            Err(err) => {
                error!(query_id = id, error = %err, "research failed");
                if let Err(mark_err) = set_status(db, id, QueryStatus::Failed).await {
                    warn!(query_id = id, error = %mark_err, "could not mark query failed");
                }
                Err(err)
            }
        }
    }

    async fn research(&self, request: RunRequest) -> Result<String, PipelineError> {
        let mut agent = agents::build_agent(request.agent, &self.toolbox, request.transcript)?;
        let history = agent.run_task(&request.query).await?;

        agents::final_report(&history)
            .map(str::to_string)
            .ok_or(PipelineError::NoReport(request.agent))
    }
}

/// Persisting needs the schema this binary was built against.
async fn ensure_schema(db: &DatabaseManager) -> Result<(), PipelineError> {
    let status = Migrator::embedded(db.backend())?.status(db).await?;
    if !status.is_current() {
        return Err(PipelineError::SchemaBehind {
            current: status.current,
            declared: status.declared,
        });
    }
    Ok(())
}

async fn set_status(
    db: &DatabaseManager,
    id: i64,
    status: QueryStatus,
) -> Result<ResearchQuery, StoreError> {
    db.session(move |s| Box::pin(async move { s.set_query_status(id, status).await }))
        .await
}

/// Report, sources and the `completed` status land together or not at all.
async fn store_findings(
    db: &DatabaseManager,
    id: i64,
    report: &str,
    sources: &[SearchHit],
) -> Result<(), StoreError> {
    let mut rows = vec![NewResearchResult::new(id, REPORT_TITLE, report)];
    rows.extend(sources.iter().map(|hit| source_result(id, hit)));

    db.session(move |s| {
        Box::pin(async move {
            s.add_results(&rows).await?;
            s.set_query_status(id, QueryStatus::Completed).await?;
            Ok(())
        })
    })
    .await
}

/// Fit a search hit into the result columns: long titles are cut, oversized
/// urls dropped and scores clamped into 0..=1.
fn source_result(query_id: i64, hit: &SearchHit) -> NewResearchResult {
    let title = if hit.title.trim().is_empty() {
        &hit.url
    } else {
        &hit.title
    };
    let title: String = title.chars().take(MAX_TITLE_LEN).collect();

    let mut result = NewResearchResult::new(query_id, title, hit.content.clone());
    if hit.url.chars().count() <= MAX_SOURCE_URL_LEN {
        result = result.source_url(hit.url.clone());
    }
    if let Some(score) = hit.score.filter(|s| s.is_finite()) {
        result = result.relevance(score.clamp(0.0, 1.0));
    }
    result
}
