use std::path::{Path, PathBuf};
use std::time::Duration;
use rusqlite::{Connection, OpenFlags};

use crate::error::{StoreError, StoreResult};

/// Location of the survey database. Every operation opens its own
/// connection from this; nothing holds a connection between calls.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn open(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.path).map_err(|source| StoreError::Unavailable {
            path: self.path.clone(),
            source,
        })?;

        configure_conn(&conn).map_err(|source| StoreError::Unavailable {
            path: self.path.clone(),
            source,
        })?;

        Ok(conn)
    }

    /// Connection for inspecting the file without changing it: no journal
    /// PRAGMAs are written, and a missing file is `Ok(None)` rather than
    /// being created.
    pub fn open_read_only(&self) -> StoreResult<Option<Connection>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .and_then(|conn| {
                conn.busy_timeout(Duration::from_secs(5))?;
                Ok(conn)
            })
            .map_err(|source| StoreError::Unavailable {
                path: self.path.clone(),
                source,
            })?;

        Ok(Some(conn))
    }
}

fn configure_conn(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_file() {
        let tmp = tempdir().unwrap();
        let db = Database::new(tmp.path().join("wellbeing.db"));
        db.open().unwrap();
        assert!(db.path().exists());
    }

    #[test]
    fn test_open_read_only_leaves_missing_file_alone() {
        let tmp = tempdir().unwrap();
        let db = Database::new(tmp.path().join("wellbeing.db"));
        assert!(db.open_read_only().unwrap().is_none());
        assert!(!db.path().exists());
    }

    #[test]
    fn test_open_read_only_rejects_writes() {
        let tmp = tempdir().unwrap();
        let db = Database::new(tmp.path().join("wellbeing.db"));
        Connection::open(db.path())
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();

        let conn = db.open_read_only().unwrap().unwrap();
        assert!(conn.execute_batch("INSERT INTO t VALUES (1);").is_err());
    }

    #[test]
    fn test_open_in_missing_dir_is_unavailable() {
        let tmp = tempdir().unwrap();
        let db = Database::new(tmp.path().join("no/such/dir/wellbeing.db"));
        let err = db.open().unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(err.is_fatal());
    }
}
