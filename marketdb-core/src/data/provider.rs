//! Data provider trait, raw frame shapes, and structured fetch errors.
//!
//! The DataProvider trait abstracts over data sources (Yahoo Finance, CSV import)
//! so we can swap implementations and mock for tests. Providers hand back the
//! data in whatever column layout they naturally produce; the normalizer turns
//! every layout into the canonical bar table.

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};
use thiserror::Error;

/// Structured error types for fetch operations.
///
/// Every variant is terminal for the run; nothing here is retried.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from provider for {symbol}")]
    Http { status: u16, symbol: String },

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("provider returned no rows for {symbol} between {start} and {end}")]
    EmptyResult {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

/// One column of a multi-level frame, keyed by `(field, ticker)`.
#[derive(Debug, Clone)]
pub struct LeveledColumn {
    /// Level 0: the price field, e.g. "Close".
    pub field: String,
    /// Level 1: the ticker the column belongs to.
    pub ticker: String,
    pub values: Column,
}

/// Column layouts a provider may return.
#[derive(Debug, Clone)]
pub enum RawColumns {
    /// One level of column names, e.g. `Open, High, Low, Close, Volume`.
    Flat(DataFrame),
    /// Two levels of column keys, e.g. `("Close", "AJG")`.
    MultiLevel(Vec<LeveledColumn>),
}

/// Provider output before normalization.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Row index: epoch nanoseconds of each row's trading date.
    pub index: Vec<i64>,
    pub columns: RawColumns,
}

impl RawFrame {
    pub fn height(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// True if `symbol` is a non-empty uppercase ticker: `[A-Z0-9.^=-]+`.
///
/// Covers share classes (`BRK-B`, `BRK.B`), indices (`^GSPC`) and FX pairs
/// (`EURUSD=X`), and keeps the symbol safe to place in a URL path segment.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.chars().all(|c| {
            c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '^' | '=' | '-')
        })
}

/// Trait for data providers (Yahoo Finance, CSV import, etc).
///
/// Implementations handle the specifics of fetching data from a particular source.
/// The contract is: given `(symbol, start, end)` with both dates inclusive, return
/// zero or more daily bars or fail.
pub trait DataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch daily OHLCV bars for a symbol over a date range.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<RawFrame, DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_symbols_are_valid() {
        for symbol in ["AJG", "MSFT", "BRK-B", "BRK.B", "^GSPC", "EURUSD=X", "7203"] {
            assert!(is_valid_symbol(symbol), "{symbol}");
        }
    }

    #[test]
    fn symbols_with_url_syntax_are_rejected() {
        for symbol in ["", "ajg", "AJG?period1=0", "AJG/../X", "AJG&interval=1m", "A JG", "AJG#"] {
            assert!(!is_valid_symbol(symbol), "{symbol}");
        }
    }
}
