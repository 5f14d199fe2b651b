use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::{debug, error, info, warn};

use crate::config::{Backend, DatabaseConfig, PoolSettings};
use crate::session::Session;
use crate::{Result, StoreError};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Open connections, idle or checked out.
    pub size: u32,
    pub idle: usize,
    pub capacity: u32,
}

/// Owns the connection pool and hands out units of work.
///
/// Construct one at startup and pass it by reference to whatever needs the
/// database; call [`DatabaseManager::close`] before the process exits.
pub struct DatabaseManager {
    pool: AnyPool,
    backend: Backend,
    settings: PoolSettings,
}

impl DatabaseManager {
    /// Build the pool for `config`.
    ///
    /// Connections are opened lazily, so this only fails for an unusable url;
    /// an unreachable server shows up through [`DatabaseManager::health_check`]
    /// or the first session.
    pub fn initialize(config: &DatabaseConfig) -> Result<Self> {
        let backend = config.backend()?;
        if config.pool.capacity() == 0 {
            return Err(StoreError::Validation(
                "database pool needs at least one connection (pool size plus overflow)".to_string(),
            ));
        }
        sqlx::any::install_default_drivers();

        info!(url = %config.redacted_url(), %backend, "initializing database pool");

        let settings = config.pool.clone();
        let pool = AnyPoolOptions::new()
            .min_connections(settings.pool_size)
            .max_connections(settings.capacity())
            .test_before_acquire(settings.pre_ping)
            .max_lifetime(settings.recycle())
            .acquire_timeout(settings.acquire_timeout())
            .connect_lazy(&config.url)?;

        Ok(Self {
            pool,
            backend,
            settings,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            capacity: self.settings.capacity(),
        }
    }

    /// Check out a connection and open a transaction on it.
    ///
    /// Waits for a free connection when the pool is at capacity. The returned
    /// session rolls back if it is dropped without [`Session::commit`].
    pub async fn begin(&self) -> Result<Session> {
        let tx = self.pool.begin().await?;
        debug!("connection checked out from pool");
        Ok(Session::new(tx, self.backend))
    }

    /// Run `work` as one unit of work.
    ///
    /// Commits when `work` returns `Ok`. When it returns `Err` the transaction is
    /// rolled back and the error handed back unchanged. The connection returns to
    /// the pool on every path.
    ///
    /// ```no_run
    /// # async fn demo(db: &store::DatabaseManager) -> store::Result<()> {
    /// use store::NewResearchQuery;
    ///
    /// let new = NewResearchQuery::new("What is LangGraph?")?;
    /// let query = db
    ///     .session(|s| Box::pin(async move { s.create_query(&new).await }))
    ///     .await?;
    /// println!("stored query {}", query.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn session<T, F>(&self, work: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T>>,
    {
        let mut session = self.begin().await?;

        match work(&mut session).await {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                error!(error = %err, "database session error, rolling back");
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Round-trip a trivial statement. Never returns an error: failures are
    /// logged and reported as `false`.
    pub async fn health_check(&self) -> bool {
        let probe = sqlx::query("SELECT 1").execute(&self.pool);

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, probe).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                error!(error = %err, "database health check failed");
                false
            }
            Err(_) => {
                error!(
                    timeout_secs = HEALTH_CHECK_TIMEOUT.as_secs(),
                    "database health check timed out"
                );
                false
            }
        }
    }

    /// Close every connection. Sessions still running finish first.
    pub async fn close(&self) {
        info!("disposing database connections");
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
