//! Ingestion pipeline: fetch → normalize → replace table → report.
//!
//! The store is opened only after the provider frame has been normalized, so a
//! failed fetch or a malformed response never touches the database file.

use super::normalize::{NormalizeError, Normalizer};
use super::provider::{is_valid_symbol, DataError, DataProvider};
use super::schema::BarSchema;
use super::store::{SqliteStore, StoreError};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingest request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Fetch(#[from] DataError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One ingestion run: a symbol, an inclusive date range, and a destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    symbol: String,
    start: NaiveDate,
    end: NaiveDate,
    table: String,
}

impl IngestRequest {
    /// Validate and build a request. The symbol is trimmed and uppercased.
    pub fn new(
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        table: &str,
    ) -> Result<Self, IngestError> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(IngestError::InvalidRequest("symbol is empty".into()));
        }
        if !is_valid_symbol(&symbol) {
            return Err(IngestError::InvalidRequest(format!(
                "symbol '{symbol}' contains characters outside [A-Z0-9.^=-]"
            )));
        }
        if start > end {
            return Err(IngestError::InvalidRequest(format!(
                "start date {start} is after end date {end}"
            )));
        }
        if !BarSchema::is_valid_table_name(table) {
            return Err(IngestError::InvalidRequest(format!(
                "table name '{table}' is not a plain identifier"
            )));
        }
        Ok(Self {
            symbol,
            start,
            end,
            table: table.to_string(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// What a successful run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub symbol: String,
    pub table: String,
    pub database: PathBuf,
    pub provider: String,
    pub rows: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub content_hash: String,
}

/// Run the pipeline once, replacing `request.table()` in the store at `database`.
pub fn ingest(
    provider: &dyn DataProvider,
    database: &Path,
    request: &IngestRequest,
) -> Result<IngestReport, IngestError> {
    let symbol = request.symbol();
    info!(
        symbol,
        start = %request.start,
        end = %request.end,
        provider = provider.name(),
        "fetching daily bars"
    );

    let raw = provider.fetch(symbol, request.start, request.end)?;
    if raw.is_empty() {
        return Err(DataError::EmptyResult {
            symbol: symbol.to_string(),
            start: request.start,
            end: request.end,
        }
        .into());
    }

    let table = Normalizer::normalize(raw, symbol, request.start, request.end)?;

    let mut store = SqliteStore::open(database)?;
    let rows = store.replace_table(request.table(), &table)?;
    store.close()?;

    let report = IngestReport {
        symbol: symbol.to_string(),
        table: request.table().to_string(),
        database: database.to_path_buf(),
        provider: provider.name().to_string(),
        rows,
        first_timestamp: table.first_timestamp(),
        last_timestamp: table.last_timestamp(),
        content_hash: table.content_hash(),
    };
    info!(
        symbol,
        table = %report.table,
        database = %report.database.display(),
        rows,
        "stored bars"
    );
    Ok(report)
}
