use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unsupported database url scheme: {0}")]
    UnsupportedBackend(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Referential integrity violation: {0}")]
    ForeignKeyViolation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid timestamp in column {column}: {source}")]
    Timestamp {
        column: &'static str,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid status value: {0:?}")]
    InvalidStatus(String),

    #[error("Migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Migration source error: {0}")]
    MigrationSource(String),

    #[error("Migration drift: {0}")]
    MigrationDrift(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, StoreError::ForeignKeyViolation(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // sqlite only reports the extended code when it was enabled on the connection
            if matches!(db_err.kind(), ErrorKind::ForeignKeyViolation)
                || db_err.message().contains("FOREIGN KEY constraint failed")
            {
                return StoreError::ForeignKeyViolation(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}
