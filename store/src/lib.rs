mod config;
mod error;
mod manager;
pub mod migrate;
pub mod models;
mod session;
pub mod timestamp;

#[cfg(test)]
mod test_support;

pub use config::{Backend, DatabaseConfig, PoolSettings};
pub use error::StoreError;
pub type Result<T> = std::result::Result<T, StoreError>;

pub use manager::{DatabaseManager, PoolStatus};
pub use migrate::{AppliedMigration, Migration, MigrationStatus, Migrator};
pub use models::{NewResearchQuery, NewResearchResult, QueryStatus, ResearchQuery, ResearchResult};
pub use session::{QueryFilter, Session};
