use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use store::QueryStatus;

use crate::agents::AgentKind;

/// Web research agents with a persistent query history.
#[derive(Debug, Parser)]
#[command(name = "research", version, about = "Research agent CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose mode (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Research a question and print the report
    Run(RunArgs),

    /// Database maintenance
    #[command(subcommand)]
    Db(DbCommand),

    /// Past research queries
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The question to research
    pub query: String,

    /// Which research agent to use
    #[arg(short, long, value_enum, default_value_t = AgentKind::Simple)]
    pub agent: AgentKind,

    /// Do not record the query and its results, even if DATABASE_URL is set
    #[arg(long)]
    pub no_persist: bool,

    /// Conversation id, used as the trace session
    #[arg(long)]
    pub thread_id: Option<String>,

    /// Write the agent conversation as markdown to this file
    #[arg(long)]
    pub transcript: Option<PathBuf>,

    /// Agent steps before the run is abandoned
    #[arg(long, default_value_t = agent::DEFAULT_MAX_STEPS)]
    pub max_steps: usize,
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Check that the database answers
    Health,

    /// Schema migrations
    #[command(subcommand)]
    Migrate(MigrateCommand),
}

#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Show applied and pending migrations
    Status(SourceArgs),

    /// Apply pending migrations
    Up {
        /// Stop after this version
        #[arg(long)]
        target: Option<i64>,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Revert the latest applied migration
    Down(SourceArgs),

    /// Write the next empty up/down scripts for every dialect
    New {
        /// Short description, e.g. "add result tags"
        name: String,

        /// Migrations root holding one directory per dialect
        #[arg(long, default_value = "store/migrations")]
        source: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Read migrations from this directory instead of the built-in set
    #[arg(long)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List recent queries, newest first
    List {
        /// Only queries with this status
        #[arg(short, long)]
        status: Option<QueryStatus>,

        /// Maximum number of queries
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Show a query and its stored results
    Show {
        id: i64,
    },

    /// Delete a query and its results
    Delete {
        id: i64,
    },
}
