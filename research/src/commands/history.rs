use anyhow::bail;
use store::{DatabaseManager, QueryFilter};

use crate::cli::HistoryCommand;
use crate::config::Settings;
use crate::output;

/// Handle `research history`.
pub async fn handle(command: HistoryCommand) -> anyhow::Result<()> {
    let settings = Settings::load()?;
    let db = DatabaseManager::initialize(settings.require_database()?)?;

    let result = run(&db, command).await;
    db.close().await;
    result
}

async fn run(db: &DatabaseManager, command: HistoryCommand) -> anyhow::Result<()> {
    match command {
        HistoryCommand::List { status, limit } => {
            let filter = QueryFilter {
                status,
                limit: Some(limit),
            };
            let queries = db
                .session(move |s| Box::pin(async move { s.list_queries(&filter).await }))
                .await?;
            println!("{}", output::query_table(&queries));
        }
        HistoryCommand::Show { id } => {
            let found = db
                .session(move |s| {
                    Box::pin(async move {
                        let Some(query) = s.get_query(id).await? else {
                            return Ok(None);
                        };
                        let results = s.results_for_query(id).await?;
                        Ok(Some((query, results)))
                    })
                })
                .await?;
            let Some((query, results)) = found else {
                bail!("research query {id} not found");
            };
            print!("{}", output::query_details(&query, &results));
        }
        HistoryCommand::Delete { id } => {
            let deleted = db
                .session(move |s| Box::pin(async move { s.delete_query(id).await }))
                .await?;
            if !deleted {
                bail!("research query {id} not found");
            }
            println!("deleted research query {id} and its results");
        }
    }
    Ok(())
}
