use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the schema manager and response store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file could not be opened. Fatal at startup.
    #[error("Database {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Legacy migration failed; all changes were rolled back and the
    /// legacy table is untouched.
    #[error("Migration of legacy responses table failed: {0}")]
    Migration(#[source] rusqlite::Error),

    /// Legacy migration failed and the rollback failed too.
    #[error("Migration failed ({migration}) and rollback failed ({rollback})")]
    RollbackFailed {
        migration: rusqlite::Error,
        rollback: rusqlite::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether the store can no longer be used in this process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::RollbackFailed { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
