mod common;

use std::fs;

use pretty_assertions::assert_eq;
use store::{Backend, DatabaseManager, Migration, Migrator, PoolSettings, StoreError};

use common::sqlite_config;

fn fresh() -> (tempfile::TempDir, DatabaseManager) {
    let (dir, config) = sqlite_config(PoolSettings::default());
    (dir, DatabaseManager::initialize(&config).unwrap())
}

async fn table_exists(db: &DatabaseManager, table: &str) -> bool {
    sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1")
        .bind(table)
        .fetch_optional(db.pool())
        .await
        .unwrap()
        .is_some()
}

#[tokio::test]
async fn empty_database_reports_every_script_pending() {
    let (_dir, db) = fresh();
    let status = Migrator::embedded(Backend::Sqlite)
        .unwrap()
        .status(&db)
        .await
        .unwrap();

    assert_eq!(status.current, 0);
    assert_eq!(status.declared, 2);
    assert!(!status.is_current());
    assert_eq!(
        status.pending,
        vec![
            (1, "create_research_queries".to_string()),
            (2, "create_research_results".to_string()),
        ]
    );
}

#[tokio::test]
async fn status_leaves_an_empty_database_untouched() {
    let (_dir, db) = fresh();
    let migrator = Migrator::embedded(Backend::Sqlite).unwrap();

    migrator.status(&db).await.unwrap();
    migrator.status(&db).await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert!(tables.is_empty(), "status created {tables:?}");

    migrator.upgrade(&db, Some(1)).await.unwrap();
    assert!(table_exists(&db, "schema_migrations").await);
}

#[tokio::test]
async fn upgrade_to_target_then_latest() {
    let (_dir, db) = fresh();
    let migrator = Migrator::embedded(Backend::Sqlite).unwrap();

    assert_eq!(migrator.upgrade(&db, Some(1)).await.unwrap(), vec![1]);
    assert!(table_exists(&db, "research_queries").await);
    assert!(!table_exists(&db, "research_results").await);

    assert_eq!(migrator.upgrade(&db, None).await.unwrap(), vec![2]);
    assert!(table_exists(&db, "research_results").await);

    assert!(migrator.upgrade(&db, None).await.unwrap().is_empty());
    assert!(migrator.status(&db).await.unwrap().is_current());
}

#[tokio::test]
async fn downgrade_reverts_one_script_at_a_time() {
    let (_dir, db) = fresh();
    let migrator = Migrator::embedded(Backend::Sqlite).unwrap();
    migrator.upgrade(&db, None).await.unwrap();

    let reverted = migrator.downgrade(&db).await.unwrap().unwrap();
    assert_eq!(reverted.version, 2);
    assert!(!table_exists(&db, "research_results").await);
    assert!(table_exists(&db, "research_queries").await);
    assert_eq!(migrator.status(&db).await.unwrap().current, 1);

    assert_eq!(migrator.downgrade(&db).await.unwrap().unwrap().version, 1);
    assert!(!table_exists(&db, "research_queries").await);
    assert!(migrator.downgrade(&db).await.unwrap().is_none());
}

#[tokio::test]
async fn upgrade_below_current_version_is_refused() {
    let (_dir, db) = fresh();
    let migrator = Migrator::embedded(Backend::Sqlite).unwrap();
    migrator.upgrade(&db, None).await.unwrap();

    assert!(matches!(
        migrator.upgrade(&db, Some(1)).await,
        Err(StoreError::MigrationSource(_))
    ));
    assert!(matches!(
        migrator.upgrade(&db, Some(9)).await,
        Err(StoreError::MigrationSource(_))
    ));
}

#[tokio::test]
async fn edited_script_is_reported_as_drift() {
    let (_dir, db) = fresh();
    Migrator::embedded(Backend::Sqlite).unwrap()
        .upgrade(&db, None)
        .await
        .unwrap();

    let mut edited = Migrator::embedded(Backend::Sqlite).unwrap().migrations().to_vec();
    edited[0].up.push_str("\n-- tweaked after release\n");
    let migrator = Migrator::new(Backend::Sqlite, edited).unwrap();

    assert!(matches!(
        migrator.status(&db).await,
        Err(StoreError::MigrationDrift(_))
    ));
    assert!(matches!(
        migrator.upgrade(&db, None).await,
        Err(StoreError::MigrationDrift(_))
    ));
}

#[tokio::test]
async fn unknown_applied_version_is_reported_as_drift() {
    let (_dir, db) = fresh();
    Migrator::embedded(Backend::Sqlite).unwrap()
        .upgrade(&db, None)
        .await
        .unwrap();

    let older = Migrator::embedded(Backend::Sqlite).unwrap().migrations()[..1].to_vec();
    let migrator = Migrator::new(Backend::Sqlite, older).unwrap();

    assert!(matches!(
        migrator.status(&db).await,
        Err(StoreError::MigrationDrift(_))
    ));
}

fn table_script(version: i64, table: &str) -> Migration {
    Migration {
        version,
        name: format!("create_{table}"),
        up: format!("CREATE TABLE {table} (id INTEGER PRIMARY KEY);"),
        down: format!("DROP TABLE {table};"),
    }
}

#[tokio::test]
async fn script_numbered_below_current_version_is_reported_as_drift() {
    let (_dir, db) = fresh();
    Migrator::new(
        Backend::Sqlite,
        vec![table_script(1, "alpha"), table_script(3, "gamma")],
    )
    .unwrap()
    .upgrade(&db, None)
    .await
    .unwrap();

    let late = Migrator::new(
        Backend::Sqlite,
        vec![
            table_script(1, "alpha"),
            table_script(2, "beta"),
            table_script(3, "gamma"),
        ],
    )
    .unwrap();

    assert!(matches!(
        late.status(&db).await,
        Err(StoreError::MigrationDrift(msg)) if msg.contains("0002_create_beta")
    ));
    assert!(matches!(
        late.upgrade(&db, None).await,
        Err(StoreError::MigrationDrift(_))
    ));
    assert!(!table_exists(&db, "beta").await);
}

#[tokio::test]
async fn failing_script_stops_the_run_at_the_last_good_version() {
    let (_dir, db) = fresh();

    let mut migrations = Migrator::embedded(Backend::Sqlite).unwrap().migrations().to_vec();
    migrations.push(Migration {
        version: 3,
        name: "broken".to_string(),
        up: "CREATE TABLE half_done (id INTEGER);\nALTER TABLE missing ADD COLUMN x TEXT;"
            .to_string(),
        down: "DROP TABLE half_done;".to_string(),
    });
    migrations.push(Migration {
        version: 4,
        name: "never_reached".to_string(),
        up: "CREATE TABLE never_reached (id INTEGER);".to_string(),
        down: "DROP TABLE never_reached;".to_string(),
    });
    let migrator = Migrator::new(Backend::Sqlite, migrations).unwrap();

    let err = migrator.upgrade(&db, None).await.unwrap_err();
    assert!(matches!(err, StoreError::Migration { version: 3, .. }));

    let status = migrator.status(&db).await.unwrap();
    assert_eq!(status.current, 2);
    assert_eq!(
        status.pending.iter().map(|(v, _)| *v).collect::<Vec<_>>(),
        vec![3, 4]
    );
    assert!(!table_exists(&db, "half_done").await);
    assert!(!table_exists(&db, "never_reached").await);
}

#[tokio::test]
async fn scripts_load_from_disk() {
    let (_dir, db) = fresh();
    let scripts = tempfile::tempdir().unwrap();
    Migrator::scaffold(scripts.path(), "create notes").unwrap();
    fs::write(
        scripts.path().join("sqlite/0001_create_notes.up.sql"),
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);",
    )
    .unwrap();
    fs::write(
        scripts.path().join("sqlite/0001_create_notes.down.sql"),
        "DROP TABLE notes;",
    )
    .unwrap();

    let migrator = Migrator::from_dir(scripts.path(), Backend::Sqlite).unwrap();
    assert_eq!(migrator.upgrade(&db, None).await.unwrap(), vec![1]);
    assert!(table_exists(&db, "notes").await);
}
