//! SQLite bar store with full-replace writes.
//!
//! A replace runs as one transaction: drop the old table, create it with the
//! canonical schema, insert every row, commit. Any failure before the commit
//! rolls back, leaving the previous table exactly as it was.

use super::schema::{BarSchema, COLUMNS};
use crate::domain::{Bar, BarTable};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid table name '{0}' (expected [A-Za-z_][A-Za-z0-9_]*)")]
    InvalidTableName(String),

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Row count, symbols and time span of a stored bar table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub rows: usize,
    pub symbols: Vec<String>,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

/// An open handle on one SQLite file.
///
/// Dropping the store closes the connection; `close` does the same but
/// reports any error SQLite raises while finalizing.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

fn check_table_name(table: &str) -> Result<(), StoreError> {
    if BarSchema::is_valid_table_name(table) {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(table.to_string()))
    }
}

impl SqliteStore {
    /// Open the store at `path`, creating the file (and its directory) if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        debug!(path = %path.display(), "opened store");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace `table` with the rows of `bars`. Returns the number of rows written.
    pub fn replace_table(&mut self, table: &str, bars: &BarTable) -> Result<usize, StoreError> {
        check_table_name(table)?;

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), ())?;
        tx.execute(&BarSchema::create_table_sql(table), ())?;
        {
            let mut insert = tx.prepare(&BarSchema::insert_sql(table))?;
            for bar in bars.bars() {
                insert.execute(params![
                    bar.symbol,
                    bar.timestamp,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;

        debug!(table, rows = bars.len(), "replaced table");
        Ok(bars.len())
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Column names of `table` in declaration order.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, StoreError> {
        check_table_name(table)?;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT name FROM pragma_table_info('{table}') ORDER BY cid"))?;
        let names = stmt
            .query_map((), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if names.is_empty() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        Ok(names)
    }

    /// All rows of `table`, ordered by timestamp.
    pub fn load_table(&self, table: &str) -> Result<Vec<Bar>, StoreError> {
        check_table_name(table)?;
        if !self.table_exists(table)? {
            return Err(StoreError::TableNotFound(table.to_string()));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM \"{table}\" ORDER BY timestamp",
            COLUMNS.join(", ")
        ))?;
        let bars = stmt
            .query_map((), |row| {
                Ok(Bar {
                    symbol: row.get(0)?,
                    timestamp: row.get(1)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(bars)
    }

    /// Summary of `table`, or None if it does not exist.
    pub fn table_summary(&self, table: &str) -> Result<Option<TableSummary>, StoreError> {
        check_table_name(table)?;
        if !self.table_exists(table)? {
            return Ok(None);
        }

        let (rows, first_timestamp, last_timestamp) = self.conn.query_row(
            &format!("SELECT COUNT(*), MIN(timestamp), MAX(timestamp) FROM \"{table}\""),
            (),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT DISTINCT symbol FROM \"{table}\" ORDER BY symbol"))?;
        let symbols = stmt
            .query_map((), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(TableSummary {
            rows: rows as usize,
            symbols,
            first_timestamp,
            last_timestamp,
        }))
    }

    /// Close the connection, surfacing any error from SQLite.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}
