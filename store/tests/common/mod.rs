#![allow(dead_code)]

use store::{DatabaseConfig, DatabaseManager, Migrator, PoolSettings};
use tempfile::TempDir;

pub fn sqlite_config(pool: PoolSettings) -> (TempDir, DatabaseConfig) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("research.db").display());
    (dir, DatabaseConfig::new(url).with_pool(pool))
}

pub async fn migrated(pool: PoolSettings) -> (TempDir, DatabaseManager) {
    let (dir, config) = sqlite_config(pool);
    let db = DatabaseManager::initialize(&config).unwrap();
    Migrator::embedded(db.backend())
        .unwrap()
        .upgrade(&db, None)
        .await
        .unwrap();
    (dir, db)
}
