use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::{debug, error, info};

use crate::db::conn::Database;
use crate::error::{StoreError, StoreResult};

pub const RESPONSES_TABLE: &str = "responses";
const STAGING_TABLE: &str = "responses_new";

/// Shape of the responses table found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// No responses table yet
    Absent,
    /// Single `stress` and `motivation` columns
    Legacy,
    /// Three sub-question columns per dimension
    Current,
}

fn create_table_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT,
            department TEXT,
            stress_q1 INTEGER,
            stress_q2 INTEGER,
            stress_q3 INTEGER,
            motivation_q1 INTEGER,
            motivation_q2 INTEGER,
            motivation_q3 INTEGER
        );"
    )
}

pub struct SchemaManager {
    db: Database,
}

impl SchemaManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // The inspection methods below never create the file or switch its
    // journal mode; only `ensure_current_schema` writes.

    pub fn table_exists(&self) -> StoreResult<bool> {
        match self.db.open_read_only()? {
            Some(conn) => Ok(table_exists(&conn)?),
            None => Ok(false),
        }
    }

    pub fn has_legacy_shape(&self) -> StoreResult<bool> {
        match self.db.open_read_only()? {
            Some(conn) => Ok(has_legacy_shape(&conn)?),
            None => Ok(false),
        }
    }

    pub fn version(&self) -> StoreResult<SchemaVersion> {
        match self.db.open_read_only()? {
            Some(conn) => Ok(detect_version(&conn)?),
            None => Ok(SchemaVersion::Absent),
        }
    }

    /// Bring the on-disk table to the current shape. Safe to call on every
    /// start; a current table is left as it is.
    pub fn ensure_current_schema(&self) -> StoreResult<SchemaVersion> {
        let mut conn = self.db.open()?;

        let found = detect_version(&conn)?;
        debug!(?found, path = %self.db.path().display(), "Detected responses schema");

        match found {
            SchemaVersion::Absent => {
                conn.execute_batch(&create_table_sql(RESPONSES_TABLE))?;
                info!("Created {} table", RESPONSES_TABLE);
            }
            SchemaVersion::Legacy => {
                migrate_legacy(&mut conn)?;
            }
            SchemaVersion::Current => {}
        }

        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_responses_department
                ON responses (department);",
        )?;

        Ok(detect_version(&conn)?)
    }
}

pub fn table_exists(conn: &Connection) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [RESPONSES_TABLE],
            |row| row.get(0),
        )
        .optional()?;

    Ok(found.is_some())
}

fn column_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let names = stmt.query_map([RESPONSES_TABLE], |row| row.get(0))?;
    names.collect()
}

/// The current schema never has columns named exactly `stress` and
/// `motivation`, so both being present identifies the legacy table.
pub fn has_legacy_shape(conn: &Connection) -> rusqlite::Result<bool> {
    if !table_exists(conn)? {
        return Ok(false);
    }

    let columns = column_names(conn)?;
    Ok(columns.iter().any(|c| c == "stress") && columns.iter().any(|c| c == "motivation"))
}

pub fn detect_version(conn: &Connection) -> rusqlite::Result<SchemaVersion> {
    if !table_exists(conn)? {
        Ok(SchemaVersion::Absent)
    } else if has_legacy_shape(conn)? {
        Ok(SchemaVersion::Legacy)
    } else {
        Ok(SchemaVersion::Current)
    }
}

/// Replace the legacy table with a current one in a single transaction.
/// On failure nothing is changed and the legacy table stays in place.
fn migrate_legacy(conn: &mut Connection) -> StoreResult<usize> {
    info!("Legacy {} table detected, migrating", RESPONSES_TABLE);

    let tx = conn.transaction()?;

    match copy_legacy_rows(&tx) {
        Ok(count) => {
            tx.commit().map_err(|e| {
                error!("Failed to commit migration: {}", e);
                StoreError::Migration(e)
            })?;
            info!(rows = count, "Migrated legacy responses to current schema");
            Ok(count)
        }
        Err(migration) => {
            error!("Migration failed, rolling back: {}", migration);
            match tx.rollback() {
                Ok(()) => Err(StoreError::Migration(migration)),
                Err(rollback) => {
                    error!("Rollback failed: {}", rollback);
                    Err(StoreError::RollbackFailed { migration, rollback })
                }
            }
        }
    }
}

// Per-question history did not exist before the split, so each old
// aggregate is copied into all three of its sub-question columns.
fn copy_legacy_rows(tx: &Transaction) -> rusqlite::Result<usize> {
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {STAGING_TABLE};"))?;
    tx.execute_batch(&create_table_sql(STAGING_TABLE))?;

    let count = tx.execute(
        &format!(
            "INSERT INTO {STAGING_TABLE} (
                id, timestamp, department,
                stress_q1, stress_q2, stress_q3,
                motivation_q1, motivation_q2, motivation_q3
            )
            SELECT id, timestamp, department,
                stress, stress, stress,
                motivation, motivation, motivation
            FROM {RESPONSES_TABLE}"
        ),
        [],
    )?;

    tx.execute_batch(&format!(
        "DROP TABLE {RESPONSES_TABLE};
        ALTER TABLE {STAGING_TABLE} RENAME TO {RESPONSES_TABLE};"
    ))?;

    Ok(count)
}
