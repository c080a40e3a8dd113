//! Bar: one symbol's trading summary for a single day.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Seconds in one calendar day.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Daily OHLCV bar for a single symbol.
///
/// `timestamp` is Unix epoch seconds at UTC midnight of the trading day.
/// Field order matches the stored column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Price and volume sanity: nothing negative, low/high bracket open and close.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.open >= 0.0
            && self.high >= 0.0
            && self.low >= 0.0
            && self.close >= 0.0
            && self.volume >= 0
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
            && self.high >= self.low
    }
}

/// Epoch seconds at UTC midnight of `date`.
pub fn midnight_utc(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("bar table is empty")]
    Empty,

    #[error("bar table mixes symbols: expected {expected}, found {found}")]
    MixedSymbols { expected: String, found: String },

    #[error("timestamps not strictly ascending at row {index}")]
    NotAscending { index: usize },

    #[error("bar at timestamp {timestamp} violates OHLCV invariants")]
    InsaneBar { timestamp: i64 },
}

/// Ordered bars for one symbol from a single ingestion run.
///
/// Invariants (checked on construction): non-empty, one symbol,
/// timestamps strictly ascending, every bar sane.
#[derive(Debug, Clone, PartialEq)]
pub struct BarTable {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarTable {
    pub fn new(bars: Vec<Bar>) -> Result<Self, BarError> {
        let symbol = bars.first().ok_or(BarError::Empty)?.symbol.clone();

        for (i, bar) in bars.iter().enumerate() {
            if bar.symbol != symbol {
                return Err(BarError::MixedSymbols {
                    expected: symbol,
                    found: bar.symbol.clone(),
                });
            }
            if !bar.is_sane() {
                return Err(BarError::InsaneBar {
                    timestamp: bar.timestamp,
                });
            }
            if i > 0 && bars[i - 1].timestamp >= bar.timestamp {
                return Err(BarError::NotAscending { index: i });
            }
        }

        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false for a constructed table; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_timestamp(&self) -> i64 {
        self.bars[0].timestamp
    }

    pub fn last_timestamp(&self) -> i64 {
        self.bars[self.bars.len() - 1].timestamp
    }

    /// blake3 digest of the rows. Identical tables hash identically.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for bar in &self.bars {
            hasher.update(bar.symbol.as_bytes());
            hasher.update(&bar.timestamp.to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}
