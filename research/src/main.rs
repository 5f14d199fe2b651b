use std::process::ExitCode;

use clap::Parser;
use research::cli::Cli;
use research::config::{self, ConfigError};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // before logging starts, so LOG_LEVEL may come from .env
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();

    if let Err(error) = research::init_logging(cli.verbose, cli.quiet) {
        eprintln!("Error: {error:#}");
        return ExitCode::FAILURE;
    }
    match dotenv {
        Ok(Some(path)) => debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(error) => warn!(%error, "could not read .env"),
    }

    tokio::select! {
        result = research::commands::dispatch(cli.command) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => report(&error),
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            ExitCode::from(130)
        }
    }
}

fn report(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<ConfigError>() {
        Some(config_error) => eprintln!("Configuration error: {config_error}"),
        None => eprintln!("Error: {error:#}"),
    }
    ExitCode::FAILURE
}
