//! Open the metadata database and answer identity queries.

use log::debug;
use rusqlite::Connection;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::record::ExtractionSchema;
use crate::utils::config::{METADATA_TABLE, WAL_PRAGMAS};

use super::StoreError;

/// SQLite-backed [`MetadataStore`](super::MetadataStore). One connection per run.
pub struct SqliteStore {
    pub(super) conn: Connection,
    pub(super) schema: Arc<ExtractionSchema>,
    pub(super) insert_sql: String,
    contains_sql: String,
    table: &'static str,
}

/// Enable WAL with the tuning pragmas (idempotent).
fn apply_wal(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.execute_batch(WAL_PRAGMAS)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    rows.collect()
}

impl SqliteStore {
    /// Open or create the database at `path` and ensure the metadata table exists.
    pub fn open(
        path: &Path,
        schema: Arc<ExtractionSchema>,
        busy_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let init = |source: rusqlite::Error| StoreError::Init {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(init)?;
        conn.busy_timeout(busy_timeout).map_err(init)?;
        apply_wal(&conn).map_err(init)?;
        debug!("Opened store {}", path.display());
        Self::ensure_table(conn, schema, path)
    }

    /// In-memory store with the same table (tests and dry runs; no WAL).
    pub fn open_in_memory(schema: Arc<ExtractionSchema>) -> Result<Self, StoreError> {
        let path = Path::new(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Init {
            path: path.to_path_buf(),
            source,
        })?;
        Self::ensure_table(conn, schema, path)
    }

    /// `CREATE TABLE IF NOT EXISTS`, then verify an existing table carries every column.
    fn ensure_table(
        conn: Connection,
        schema: Arc<ExtractionSchema>,
        path: &Path,
    ) -> Result<Self, StoreError> {
        let table = METADATA_TABLE;
        let init = |source: rusqlite::Error| StoreError::Init {
            path: PathBuf::from(path),
            source,
        };
        conn.execute_batch(&schema.create_table_sql(table))
            .map_err(init)?;
        let existing = table_columns(&conn, table).map_err(init)?;
        let missing = schema.missing_columns(&existing);
        if !missing.is_empty() {
            return Err(StoreError::IncompatibleTable {
                path: path.to_path_buf(),
                table: table.to_string(),
                missing: missing.iter().map(|c| c.to_string()).collect(),
            });
        }
        Ok(SqliteStore {
            insert_sql: schema.insert_sql(table),
            contains_sql: format!("SELECT 1 FROM {table} WHERE file_path = ?1 LIMIT 1"),
            conn,
            schema,
            table,
        })
    }

    /// Underlying connection, for ad-hoc queries on the stored rows.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(super) fn lookup(&self, file_path: &str) -> rusqlite::Result<bool> {
        self.conn.prepare_cached(&self.contains_sql)?.exists([file_path])
    }

    pub(super) fn load_identities(&self) -> rusqlite::Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT file_path FROM {}", self.table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    }

    pub(super) fn count_rows(&self) -> rusqlite::Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
                row.get(0)
            })?;
        Ok(n.max(0) as u64)
    }
}
