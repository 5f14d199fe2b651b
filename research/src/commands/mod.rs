//! Command handlers. Each returns `anyhow::Result` and prints its own output.

use crate::cli::Commands;

pub mod db;
pub mod history;
pub mod run;

/// Dispatch a parsed command to its handler.
pub async fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run::handle(args).await,
        Commands::Db(command) => db::handle(command).await,
        Commands::History(command) => history::handle(command).await,
    }
}
