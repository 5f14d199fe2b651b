use tempfile::TempDir;

use crate::config::{DatabaseConfig, PoolSettings};
use crate::manager::DatabaseManager;
use crate::migrate::Migrator;

/// A file-backed SQLite database in a fresh temp dir. Keep the dir alive for
/// as long as the database is used.
pub fn sqlite_config(pool: PoolSettings) -> (TempDir, DatabaseConfig) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("research.db").display());
    (dir, DatabaseConfig::new(url).with_pool(pool))
}

pub async fn migrated_sqlite() -> (TempDir, DatabaseManager) {
    let (dir, config) = sqlite_config(PoolSettings::default());
    let db = DatabaseManager::initialize(&config).unwrap();
    Migrator::embedded(db.backend())
        .unwrap()
        .upgrade(&db, None)
        .await
        .unwrap();
    (dir, db)
}
