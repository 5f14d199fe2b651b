//! Versioned schema migrations.
//!
//! Each dialect has its own ordered set of `NNNN_name.up.sql` /
//! `NNNN_name.down.sql` scripts. Applied versions are recorded in
//! `schema_migrations` together with a SHA-256 checksum of the up script, so a
//! script edited after it was applied is reported instead of silently skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{info, warn};

use crate::config::Backend;
use crate::manager::DatabaseManager;
use crate::{Result, StoreError, timestamp};

const CREATE_BOOKKEEPING: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (\
     version BIGINT PRIMARY KEY, \
     name TEXT NOT NULL, \
     checksum TEXT NOT NULL, \
     applied_at TEXT NOT NULL)";

macro_rules! embedded_scripts {
    ($dialect:literal, [$($name:literal),* $(,)?]) => {
        &[$((
            $name,
            include_str!(concat!("../migrations/", $dialect, "/", $name, ".up.sql")),
            include_str!(concat!("../migrations/", $dialect, "/", $name, ".down.sql")),
        )),*]
    };
}

const POSTGRES_SCRIPTS: &[(&str, &str, &str)] = embedded_scripts!(
    "postgres",
    ["0001_create_research_queries", "0002_create_research_results"]
);

const SQLITE_SCRIPTS: &[(&str, &str, &str)] = embedded_scripts!(
    "sqlite",
    ["0001_create_research_queries", "0002_create_research_results"]
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub up: String,
    pub down: String,
}

impl Migration {
    /// Build from a `NNNN_name` stem.
    fn from_stem(stem: &str, up: String, down: String) -> Result<Self> {
        let (version, name) = stem.split_once('_').ok_or_else(|| {
            StoreError::MigrationSource(format!("{stem}: expected NNNN_name"))
        })?;
        let version = version.parse::<i64>().map_err(|_| {
            StoreError::MigrationSource(format!("{stem}: {version:?} is not a version number"))
        })?;
        if version <= 0 {
            return Err(StoreError::MigrationSource(format!(
                "{stem}: versions start at 1"
            )));
        }

        Ok(Self {
            version,
            name: name.to_string(),
            up,
            down,
        })
    }

    pub fn checksum(&self) -> String {
        format!("{:x}", Sha256::digest(self.up.as_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Latest version the scripts declare, 0 when there are none.
    pub declared: i64,
    /// Latest version recorded in the database, 0 for an empty database.
    pub current: i64,
    pub applied: Vec<AppliedMigration>,
    /// `(version, name)` of scripts not yet applied, in order.
    pub pending: Vec<(i64, String)>,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "schema version {} of {} declared",
            self.current, self.declared
        )?;
        for applied in &self.applied {
            writeln!(
                f,
                "  applied  {:04} {} ({})",
                applied.version,
                applied.name,
                timestamp::encode(&applied.applied_at)
            )?;
        }
        for (version, name) in &self.pending {
            writeln!(f, "  pending  {version:04} {name}")?;
        }
        Ok(())
    }
}

/// The ordered migrations for one dialect.
#[derive(Debug, Clone)]
pub struct Migrator {
    backend: Backend,
    migrations: Vec<Migration>,
}

impl Migrator {
    /// The scripts compiled into this build.
    pub fn embedded(backend: Backend) -> Result<Self> {
        let scripts = match backend {
            Backend::Postgres => POSTGRES_SCRIPTS,
            Backend::Sqlite => SQLITE_SCRIPTS,
        };
        Self::from_scripts(backend, scripts)
    }

    fn from_scripts(backend: Backend, scripts: &[(&str, &str, &str)]) -> Result<Self> {
        let migrations = scripts
            .iter()
            .map(|(stem, up, down)| Migration::from_stem(stem, up.to_string(), down.to_string()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(backend, migrations)
    }

    /// Read `<root>/<dialect>/NNNN_name.{up,down}.sql` from disk.
    pub fn from_dir(root: &Path, backend: Backend) -> Result<Self> {
        let dir = root.join(backend.dir_name());
        let mut ups = BTreeMap::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = file_name.strip_suffix(".up.sql") {
                ups.insert(stem.to_string(), path.clone());
            }
        }

        let mut migrations = Vec::with_capacity(ups.len());
        for (stem, up_path) in ups {
            let down_path = dir.join(format!("{stem}.down.sql"));
            if !down_path.exists() {
                return Err(StoreError::MigrationSource(format!(
                    "{stem}: missing {}",
                    down_path.display()
                )));
            }
            migrations.push(Migration::from_stem(
                &stem,
                fs::read_to_string(&up_path)?,
                fs::read_to_string(&down_path)?,
            )?);
        }

        Self::new(backend, migrations)
    }

    /// Sorts by version and rejects duplicates.
    pub fn new(backend: Backend, mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(StoreError::MigrationSource(format!(
                "version {} is declared twice ({} and {})",
                pair[0].version, pair[0].name, pair[1].name
            )));
        }

        Ok(Self {
            backend,
            migrations,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn declared_version(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Compare the database with the scripts. Read-only: a database without
    /// `schema_migrations` reads as empty. Fails on drift: an applied script
    /// whose checksum changed, an applied version with no script, or a
    /// pending script numbered below the current version.
    pub async fn status(&self, db: &DatabaseManager) -> Result<MigrationStatus> {
        self.ensure_backend(db)?;
        let applied = self.applied(db).await?;

        for record in &applied {
            match self.find(record.version) {
                None => {
                    return Err(StoreError::MigrationDrift(format!(
                        "database has version {} ({}) but no script declares it",
                        record.version, record.name
                    )));
                }
                Some(migration) if migration.checksum() != record.checksum => {
                    return Err(StoreError::MigrationDrift(format!(
                        "script {:04}_{} changed after it was applied",
                        migration.version, migration.name
                    )));
                }
                Some(_) => {}
            }
        }

        let current = applied.last().map_or(0, |a| a.version);
        let pending: Vec<(i64, String)> = self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|a| a.version == m.version))
            .map(|m| (m.version, m.name.clone()))
            .collect();

        // scripts only ever run in version order
        if let Some((version, name)) = pending.iter().find(|(v, _)| *v < current) {
            return Err(StoreError::MigrationDrift(format!(
                "script {version:04}_{name} is older than applied version {current}; \
                 renumber it above {current}"
            )));
        }

        Ok(MigrationStatus {
            declared: self.declared_version(),
            current,
            applied,
            pending,
        })
    }

    /// Apply pending scripts up to `target` (default: the latest), each in its
    /// own transaction. Stops at the first failure; earlier scripts stay
    /// applied. Returns the versions applied by this call.
    pub async fn upgrade(&self, db: &DatabaseManager, target: Option<i64>) -> Result<Vec<i64>> {
        let target = target.unwrap_or_else(|| self.declared_version());
        if target != 0 && self.find(target).is_none() {
            return Err(StoreError::MigrationSource(format!(
                "no script declares version {target}"
            )));
        }

        let status = self.status(db).await?;
        if status.current > target {
            return Err(StoreError::MigrationSource(format!(
                "database is at version {} which is past target {target}; downgrade instead",
                status.current
            )));
        }

        let mut applied = Vec::new();
        let due: Vec<i64> = status
            .pending
            .iter()
            .map(|(v, _)| *v)
            .filter(|v| *v <= target)
            .collect();
        if !due.is_empty() {
            sqlx::raw_sql(CREATE_BOOKKEEPING).execute(db.pool()).await?;
        }
        for version in &due {
            let Some(migration) = self.find(*version) else {
                continue;
            };
            self.apply(db, migration).await?;
            applied.push(migration.version);
        }

        if applied.is_empty() {
            info!(version = status.current, "schema already up to date");
        }
        Ok(applied)
    }

    /// Reverse the latest applied script. Returns what was reverted, or `None`
    /// for an empty database.
    pub async fn downgrade(&self, db: &DatabaseManager) -> Result<Option<AppliedMigration>> {
        let status = self.status(db).await?;
        let Some(latest) = status.applied.last().cloned() else {
            info!("no migrations applied, nothing to downgrade");
            return Ok(None);
        };
        let Some(migration) = self.find(latest.version) else {
            return Ok(None);
        };

        let mut session = db.begin().await?;
        sqlx::raw_sql(&migration.down)
            .execute(session.connection())
            .await
            .map_err(|source| StoreError::Migration {
                version: migration.version,
                name: migration.name.clone(),
                source,
            })?;
        sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
            .bind(migration.version)
            .execute(session.connection())
            .await?;
        session.commit().await?;

        info!(
            version = migration.version,
            name = %migration.name,
            "migration reverted"
        );
        Ok(Some(latest))
    }

    /// Write the next-numbered empty up/down pair for every dialect under
    /// `root`. Returns the created paths.
    pub fn scaffold(root: &Path, name: &str) -> Result<Vec<PathBuf>> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(StoreError::MigrationSource(format!(
                "{name:?} does not make a usable migration name"
            )));
        }

        let dialects = [Backend::Postgres, Backend::Sqlite];
        let mut next = 1;
        for backend in dialects {
            let dir = root.join(backend.dir_name());
            if dir.exists() {
                next = next.max(Self::from_dir(root, backend)?.declared_version() + 1);
            }
        }

        let stem = format!("{next:04}_{slug}");
        let mut created = Vec::new();
        for backend in dialects {
            let dir = root.join(backend.dir_name());
            fs::create_dir_all(&dir)?;
            for direction in ["up", "down"] {
                let path = dir.join(format!("{stem}.{direction}.sql"));
                fs::write(&path, format!("-- {stem} ({direction}, {backend})\n"))?;
                created.push(path);
            }
        }

        info!(%stem, "migration scaffolded");
        Ok(created)
    }

    fn find(&self, version: i64) -> Option<&Migration> {
        self.migrations.iter().find(|m| m.version == version)
    }

    fn ensure_backend(&self, db: &DatabaseManager) -> Result<()> {
        if db.backend() != self.backend {
            return Err(StoreError::MigrationSource(format!(
                "scripts are for {} but the database is {}",
                self.backend,
                db.backend()
            )));
        }
        Ok(())
    }

    async fn bookkeeping_exists(&self, db: &DatabaseManager) -> Result<bool> {
        let sql = match self.backend {
            Backend::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = 'schema_migrations'"
            }
            Backend::Sqlite => {
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'table' AND name = 'schema_migrations'"
            }
        };
        let count: i64 = sqlx::query_scalar(sql).fetch_one(db.pool()).await?;
        Ok(count > 0)
    }

    async fn applied(&self, db: &DatabaseManager) -> Result<Vec<AppliedMigration>> {
        if !self.bookkeeping_exists(db).await? {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT version, name, checksum, applied_at FROM schema_migrations ORDER BY version",
        )
        .fetch_all(db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let applied_at: String = row.try_get("applied_at")?;
                Ok(AppliedMigration {
                    version: row.try_get("version")?,
                    name: row.try_get("name")?,
                    checksum: row.try_get("checksum")?,
                    applied_at: timestamp::decode("applied_at", &applied_at)?,
                })
            })
            .collect()
    }

    async fn apply(&self, db: &DatabaseManager, migration: &Migration) -> Result<()> {
        let failed = |source| StoreError::Migration {
            version: migration.version,
            name: migration.name.clone(),
            source,
        };

        let mut session = db.begin().await?;
        if let Err(source) = sqlx::raw_sql(&migration.up)
            .execute(session.connection())
            .await
        {
            warn!(
                version = migration.version,
                name = %migration.name,
                error = %source,
                "migration failed, stopping"
            );
            if let Err(rollback_err) = session.rollback().await {
                warn!(error = %rollback_err, "rollback after failed migration failed");
            }
            return Err(failed(source));
        }

        sqlx::query(
            "INSERT INTO schema_migrations (version, name, checksum, applied_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(migration.version)
        .bind(migration.name.as_str())
        .bind(migration.checksum())
        .bind(timestamp::encode(&timestamp::now()))
        .execute(session.connection())
        .await
        .map_err(failed)?;
        session.commit().await?;

        info!(
            version = migration.version,
            name = %migration.name,
            "migration applied"
        );
        Ok(())
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
