use std::path::Path;

use anyhow::{Context, bail};
use store::{DatabaseManager, Migrator};

use crate::cli::{DbCommand, MigrateCommand};
use crate::config::Settings;

/// Handle `research db`.
pub async fn handle(command: DbCommand) -> anyhow::Result<()> {
    // scaffolding is offline and works without a database
    if let DbCommand::Migrate(MigrateCommand::New { name, source }) = &command {
        let written = Migrator::scaffold(source, name)
            .with_context(|| format!("failed to scaffold migration in {}", source.display()))?;
        for path in written {
            println!("created {}", path.display());
        }
        return Ok(());
    }

    let settings = Settings::load()?;
    let db_config = settings.require_database()?;
    let db = DatabaseManager::initialize(db_config)?;

    let result = match command {
        DbCommand::Health => health(&db, &db_config.redacted_url()).await,
        DbCommand::Migrate(command) => migrate(&db, command).await,
    };

    db.close().await;
    result
}

async fn health(db: &DatabaseManager, url: &str) -> anyhow::Result<()> {
    if !db.health_check().await {
        bail!("database at {url} is not reachable");
    }

    let pool = db.pool_status();
    println!(
        "database at {url} is healthy ({} backend, {} of {} connections open, {} idle)",
        db.backend(),
        pool.size,
        pool.capacity,
        pool.idle
    );
    Ok(())
}

fn migrator(db: &DatabaseManager, source: Option<&Path>) -> anyhow::Result<Migrator> {
    match source {
        Some(dir) => Migrator::from_dir(dir, db.backend())
            .with_context(|| format!("failed to read migrations from {}", dir.display())),
        None => Ok(Migrator::embedded(db.backend())?),
    }
}

async fn migrate(db: &DatabaseManager, command: MigrateCommand) -> anyhow::Result<()> {
    match command {
        MigrateCommand::Status(args) => {
            let status = migrator(db, args.source.as_deref())?.status(db).await?;
            print!("{status}");
            if !status.is_current() {
                println!("run `research db migrate up` to apply pending migrations");
            }
        }
        MigrateCommand::Up { target, source } => {
            let migrator = migrator(db, source.source.as_deref())?;
            let applied = migrator.upgrade(db, target).await?;
            if applied.is_empty() {
                println!("schema is already up to date");
            }
            for version in applied {
                let name = migrator
                    .migrations()
                    .iter()
                    .find(|m| m.version == version)
                    .map(|m| m.name.as_str())
                    .unwrap_or_default();
                println!("applied {version:04} {name}");
            }
        }
        MigrateCommand::Down(args) => {
            match migrator(db, args.source.as_deref())?.downgrade(db).await? {
                Some(reverted) => println!("reverted {:04} {}", reverted.version, reverted.name),
                None => println!("no migrations to revert"),
            }
        }
        MigrateCommand::New { .. } => unreachable!("scaffolding is handled before connecting"),
    }
    Ok(())
}
