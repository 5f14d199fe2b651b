use std::fs::File;
use std::sync::Arc;

use agent::callbacks::{Callback, MessageLogger};
use agent::llm::OpenAI;
use agent::tools::Notebook;
use anyhow::Context;
use store::DatabaseManager;
use tracing::{debug, info};

use crate::agents::Toolbox;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::http_client;
use crate::output;
use crate::pipeline::{Pipeline, RunRequest};
use crate::search::{InternetSearch, SearchLog, TavilyClient};
use crate::telemetry::LangfuseTracer;

/// Handle `research run`.
pub async fn handle(args: RunArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    debug!(?config, "configuration loaded");

    let http = http_client::build(config.settings.cert_path.as_deref())
        .context("failed to build the HTTP client")?;

    let llm = OpenAI::with_endpoint(
        config.llm.model.clone(),
        &config.llm.api_key,
        &config.llm.base_url,
        http.clone(),
    );
    info!(provider = %config.llm.provider, model = %llm.model(), agent = %args.agent, "starting research");

    let log = SearchLog::default();
    let search = TavilyClient::new(http.clone(), config.tavily_api_key.clone());
    let toolbox = Toolbox {
        llm,
        search: InternetSearch::new(Arc::new(search), log.clone()),
        notebook: Notebook::new(),
        max_steps: args.max_steps,
    };

    let db = match &config.settings.database {
        Some(db_config) if !args.no_persist => Some(DatabaseManager::initialize(db_config)?),
        Some(_) => {
            info!("--no-persist given, results will not be saved");
            None
        }
        None => {
            info!("DATABASE_URL not set, results will not be saved");
            None
        }
    };
    let tracer = LangfuseTracer::from_settings(&config.settings.langfuse, http);

    let transcript: Option<Box<dyn Callback + Send>> = match &args.transcript {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create transcript {}", path.display()))?;
            let logger: Box<dyn Callback + Send> = MessageLogger::new(&args.query, file)?;
            Some(logger)
        }
        None => None,
    };

    let mut pipeline = Pipeline::new(toolbox, log);
    if let Some(db) = &db {
        pipeline = pipeline.with_database(db);
    }
    if let Some(tracer) = &tracer {
        pipeline = pipeline.with_tracer(tracer);
    }

    let request = RunRequest {
        thread_id: args.thread_id,
        transcript,
        ..RunRequest::new(args.query, args.agent)
    };
    let outcome = pipeline.run(request).await;

    if let Some(db) = &db {
        db.close().await;
    }
    let outcome = outcome.context("research run failed")?;

    println!("{}", output::format_report(&outcome.report));
    println!();
    println!("{}", output::format_sources(&outcome.sources).trim_end());
    if let Some(id) = outcome.query_id {
        println!();
        println!("Saved as query {id}. Show it again with `research history show {id}`.");
    }

    Ok(())
}
