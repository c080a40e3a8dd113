//! CSV import provider: offline fallback for the Yahoo fetch.
//!
//! Expects a header row with a `Date` column (`YYYY-MM-DD`) and price columns
//! in any case, e.g. the `Date,Open,High,Low,Close,Adj Close,Volume` layout
//! Yahoo's download button produces. Columns come back flat and unrenamed;
//! the normalizer lowercases them.

use super::provider::{DataError, DataProvider, RawColumns, RawFrame};
use crate::domain::bar::midnight_utc;
use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};
use std::path::{Path, PathBuf};
use tracing::debug;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Reads daily bars from a local CSV file.
pub struct CsvProvider {
    path: PathBuf,
}

impl CsvProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> DataError {
        DataError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn csv_error(&self, e: csv::Error) -> DataError {
        if e.is_io_error() {
            if let csv::ErrorKind::Io(source) = e.into_kind() {
                return self.io_error(source);
            }
            return DataError::ResponseFormatChanged("csv I/O error".into());
        }
        DataError::ResponseFormatChanged(format!("{}: {e}", self.path.display()))
    }
}

/// Parse one numeric cell. Blank, `null` and non-finite cells become None.
fn parse_cell(raw: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    let value: f64 = trimmed.parse()?;
    Ok(value.is_finite().then_some(value))
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_import"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawFrame, DataError> {
        let file = std::fs::File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut reader = csv::Reader::from_reader(file);

        let headers = reader.headers().map_err(|e| self.csv_error(e))?.clone();
        let date_idx = headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case("date"))
            .ok_or_else(|| {
                DataError::ResponseFormatChanged(format!(
                    "{}: no Date column in header",
                    self.path.display()
                ))
            })?;

        let value_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        let mut index = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); value_columns.len()];

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| self.csv_error(e))?;
            let raw_date = record.get(date_idx).unwrap_or_default().trim();
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|_| {
                DataError::ResponseFormatChanged(format!(
                    "{} row {}: bad date '{raw_date}'",
                    self.path.display(),
                    line + 2
                ))
            })?;
            if date < start || date > end {
                continue;
            }

            index.push(midnight_utc(date) * NANOS_PER_SECOND);
            for (slot, (i, name)) in value_columns.iter().enumerate() {
                let cell = record.get(*i).unwrap_or_default();
                let value = parse_cell(cell).map_err(|_| {
                    DataError::ResponseFormatChanged(format!(
                        "{} row {}: bad {name} value '{cell}'",
                        self.path.display(),
                        line + 2
                    ))
                })?;
                values[slot].push(value);
            }
        }

        if index.is_empty() {
            return Err(DataError::EmptyResult {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }

        let columns: Vec<Column> = value_columns
            .into_iter()
            .zip(values)
            .map(|((_, name), data)| Column::new(name.into(), data))
            .collect();
        let df = DataFrame::new(columns)
            .map_err(|e| DataError::ResponseFormatChanged(format!("csv columns: {e}")))?;

        debug!(path = %self.path.display(), rows = index.len(), "read csv bars");
        Ok(RawFrame {
            index,
            columns: RawColumns::Flat(df),
        })
    }
}
