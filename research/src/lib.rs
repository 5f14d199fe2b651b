pub mod agents;
pub mod cli;
pub mod commands;
pub mod config;
pub mod http_client;
pub mod output;
pub mod pipeline;
pub mod search;
pub mod telemetry;

/// Install the `tracing` subscriber. `LOG_LEVEL` takes an `EnvFilter`
/// directive and wins over the flags.
pub fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
