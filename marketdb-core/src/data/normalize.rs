//! Normalization: any provider column layout in, canonical bar table out.
//!
//! Steps, in order: flatten column keys to lowercase field names, attach the
//! symbol, derive `timestamp` from the nanosecond index, drop void and
//! out-of-range rows, drop rows that break the OHLCV invariants, then sort and
//! dedupe on timestamp.

use super::provider::{LeveledColumn, RawColumns, RawFrame};
use super::schema::{BarSchema, SchemaError, REQUIRED_FIELDS};
use crate::domain::bar::{midnight_utc, Bar, BarError, BarTable, SECONDS_PER_DAY};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Gaps longer than this between consecutive bars are reported.
const SUSPICIOUS_GAP_DAYS: i64 = 5;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("provider response is missing field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}' appears more than once after lowercasing")]
    DuplicateField { field: String },

    #[error("column '{field}' has {actual} rows but the index has {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("no valid rows left for {symbol} after normalization")]
    NoValidRows { symbol: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Bar(#[from] BarError),

    #[error("frame operation failed: {0}")]
    Polars(#[from] PolarsError),
}

/// Normalizer for provider frames
pub struct Normalizer;

impl Normalizer {
    /// Turn a raw provider frame into a canonical bar table for `symbol`.
    ///
    /// Rows outside `[start, end]` (inclusive calendar dates, UTC) are dropped.
    pub fn normalize(
        raw: RawFrame,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BarTable, NormalizeError> {
        let height = raw.height();
        let mut fields = Self::flatten(raw.columns, symbol)?;

        let timestamps: Vec<i64> = raw.index.iter().map(|ns| ns / NANOS_PER_SECOND).collect();
        let mut columns = vec![Column::new("timestamp".into(), timestamps)];
        for field in REQUIRED_FIELDS {
            let mut column = fields.remove(field).ok_or_else(|| NormalizeError::MissingField {
                field: field.to_string(),
            })?;
            if column.len() != height {
                return Err(NormalizeError::LengthMismatch {
                    field: field.to_string(),
                    expected: height,
                    actual: column.len(),
                });
            }
            column.rename(field.into());
            columns.push(column);
        }

        let start_ts = midnight_utc(start);
        let end_ts = midnight_utc(end) + SECONDS_PER_DAY;

        let cleaned = DataFrame::new(columns)?
            .lazy()
            .select([
                lit(symbol).alias("symbol"),
                col("timestamp"),
                col("open").cast(DataType::Float64),
                col("high").cast(DataType::Float64),
                col("low").cast(DataType::Float64),
                col("close").cast(DataType::Float64),
                col("volume").cast(DataType::Int64),
            ])
            .drop_nulls(None)
            .filter(
                col("timestamp")
                    .gt_eq(lit(start_ts))
                    .and(col("timestamp").lt(lit(end_ts))),
            )
            .collect()?;

        let valid = Self::validate(cleaned.clone().lazy()).collect()?;
        let rejected = cleaned.height() - valid.height();
        if rejected > 0 {
            warn!(symbol, rejected, "dropped bars violating OHLCV invariants");
        }

        let df = Self::canonicalize(valid.lazy()).collect()?;
        BarSchema::validate(&df)?;

        for anomaly in Self::detect_anomalies(&df)? {
            match anomaly.severity {
                Severity::Warning => warn!(
                    symbol,
                    kind = ?anomaly.anomaly_type,
                    count = anomaly.count,
                    "data anomaly"
                ),
                Severity::Info => info!(
                    symbol,
                    kind = ?anomaly.anomaly_type,
                    count = anomaly.count,
                    "data anomaly"
                ),
            }
        }

        debug!(
            symbol,
            raw_rows = height,
            kept = df.height(),
            "normalized provider frame"
        );
        Self::to_table(&df, symbol)
    }

    /// Collapse either column layout into lowercase field name -> column.
    ///
    /// Multi-level frames keep level 0 only. Columns belonging to the requested
    /// ticker are selected; if the provider labelled none of them with it, every
    /// column is used as-is.
    fn flatten(
        columns: RawColumns,
        symbol: &str,
    ) -> Result<HashMap<String, Column>, NormalizeError> {
        let named: Vec<(String, Column)> = match columns {
            RawColumns::Flat(df) => df
                .get_columns()
                .iter()
                .map(|c| (c.name().to_lowercase(), c.clone()))
                .collect(),
            RawColumns::MultiLevel(leveled) => {
                let any_match = leveled
                    .iter()
                    .any(|c| c.ticker.eq_ignore_ascii_case(symbol));
                leveled
                    .into_iter()
                    .filter(|c| !any_match || c.ticker.eq_ignore_ascii_case(symbol))
                    .map(|LeveledColumn { field, values, .. }| (field.to_lowercase(), values))
                    .collect()
            }
        };

        let mut fields = HashMap::with_capacity(named.len());
        for (name, column) in named {
            if fields.insert(name.clone(), column).is_some() {
                return Err(NormalizeError::DuplicateField { field: name });
            }
        }
        Ok(fields)
    }

    /// Canonicalize data: sort ascending by timestamp, keep the first row per timestamp
    pub fn canonicalize(df: LazyFrame) -> LazyFrame {
        df.sort(
            ["timestamp"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .unique_stable(Some(vec!["timestamp".into()]), UniqueKeepStrategy::First)
    }

    /// Keep only bars with no negative values where low/high bracket open and close
    pub fn validate(df: LazyFrame) -> LazyFrame {
        df.filter(
            col("open")
                .gt_eq(lit(0.0))
                .and(col("high").gt_eq(lit(0.0)))
                .and(col("low").gt_eq(lit(0.0)))
                .and(col("close").gt_eq(lit(0.0)))
                .and(col("volume").gt_eq(lit(0i64)))
                .and(col("low").lt_eq(col("open")))
                .and(col("low").lt_eq(col("close")))
                .and(col("high").gt_eq(col("open")))
                .and(col("high").gt_eq(col("close"))),
        )
    }

    /// Detect anomalies worth logging (zero volume, long gaps between bars)
    pub fn detect_anomalies(df: &DataFrame) -> Result<Vec<AnomalyReport>, NormalizeError> {
        let mut anomalies = Vec::new();

        let zero_volume_count = df
            .column("volume")?
            .i64()?
            .into_iter()
            .filter(|v| *v == Some(0))
            .count();
        if zero_volume_count > 0 {
            anomalies.push(AnomalyReport {
                anomaly_type: AnomalyType::ZeroVolume,
                count: zero_volume_count,
                severity: Severity::Warning,
            });
        }

        let timestamps: Vec<i64> = df
            .column("timestamp")?
            .i64()?
            .into_iter()
            .flatten()
            .collect();
        let gap_count = timestamps
            .windows(2)
            .filter(|w| w[1] - w[0] > SUSPICIOUS_GAP_DAYS * SECONDS_PER_DAY)
            .count();
        if gap_count > 0 {
            anomalies.push(AnomalyReport {
                anomaly_type: AnomalyType::SuspiciousGap,
                count: gap_count,
                severity: Severity::Info,
            });
        }

        Ok(anomalies)
    }

    fn to_table(df: &DataFrame, symbol: &str) -> Result<BarTable, NormalizeError> {
        let timestamps = df.column("timestamp")?.i64()?;
        let opens = df.column("open")?.f64()?;
        let highs = df.column("high")?.f64()?;
        let lows = df.column("low")?.f64()?;
        let closes = df.column("close")?.f64()?;
        let volumes = df.column("volume")?.i64()?;

        let mut bars = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let (Some(timestamp), Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
                timestamps.get(i),
                opens.get(i),
                highs.get(i),
                lows.get(i),
                closes.get(i),
                volumes.get(i),
            ) else {
                continue;
            };
            let bar = Bar {
                symbol: symbol.to_string(),
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            };
            // NaN compares as the largest float in frame filters, so recheck here.
            if bar.is_sane() {
                bars.push(bar);
            } else {
                warn!(symbol, timestamp, "dropped void bar");
            }
        }

        if bars.is_empty() {
            return Err(NormalizeError::NoValidRows {
                symbol: symbol.to_string(),
            });
        }
        Ok(BarTable::new(bars)?)
    }
}

#[derive(Debug)]
pub struct AnomalyReport {
    pub anomaly_type: AnomalyType,
    pub count: usize,
    pub severity: Severity,
}

#[derive(Debug, PartialEq)]
pub enum AnomalyType {
    ZeroVolume,
    SuspiciousGap,
}

#[derive(Debug, PartialEq)]
pub enum Severity {
    Info,
    Warning,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::COLUMNS;

    const DAY_NS: i64 = SECONDS_PER_DAY * NANOS_PER_SECOND;
    // 2024-01-02 00:00:00 UTC
    const JAN_2: i64 = 1_704_153_600;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn index(days: &[i64]) -> Vec<i64> {
        days.iter().map(|d| JAN_2 * NANOS_PER_SECOND + d * DAY_NS).collect()
    }

    fn flat_frame(days: &[i64]) -> RawFrame {
        let n = days.len();
        let df = df!(
            "Open" => vec![100.0; n],
            "High" => vec![105.0; n],
            "Low" => vec![99.0; n],
            "Close" => vec![103.0; n],
            "Adj Close" => vec![102.5; n],
            "Volume" => vec![1_000i64; n],
        )
        .unwrap();
        RawFrame {
            index: index(days),
            columns: RawColumns::Flat(df),
        }
    }

    fn leveled(field: &str, ticker: &str, values: Column) -> LeveledColumn {
        LeveledColumn {
            field: field.into(),
            ticker: ticker.into(),
            values,
        }
    }

    fn normalize_2024(raw: RawFrame) -> Result<BarTable, NormalizeError> {
        Normalizer::normalize(raw, "AJG", date(2024, 1, 1), date(2024, 12, 31))
    }

    #[test]
    fn test_flat_frame_normalizes() {
        let table = normalize_2024(flat_frame(&[0, 1, 2])).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.symbol(), "AJG");
        assert_eq!(table.first_timestamp(), JAN_2);
        assert_eq!(table.bars()[1].timestamp, JAN_2 + SECONDS_PER_DAY);
        assert_eq!(table.bars()[0].volume, 1_000);
    }

    #[test]
    fn test_multi_level_frame_selects_requested_ticker() {
        let n = 2;
        let raw = RawFrame {
            index: index(&[0, 1]),
            columns: RawColumns::MultiLevel(vec![
                leveled("Close", "AJG", Column::new("c".into(), vec![103.0; n])),
                leveled("Close", "MSFT", Column::new("c2".into(), vec![400.0; n])),
                leveled("High", "AJG", Column::new("h".into(), vec![105.0; n])),
                leveled("Low", "AJG", Column::new("l".into(), vec![99.0; n])),
                leveled("Open", "AJG", Column::new("o".into(), vec![100.0; n])),
                leveled("Volume", "AJG", Column::new("v".into(), vec![7i64; n])),
                leveled("Volume", "MSFT", Column::new("v2".into(), vec![9i64; n])),
            ]),
        };
        let table = normalize_2024(raw).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.bars()[0].close, 103.0);
        assert_eq!(table.bars()[0].volume, 7);
    }

    #[test]
    fn test_multi_level_without_matching_ticker_uses_level_zero() {
        let raw = RawFrame {
            index: index(&[0]),
            columns: RawColumns::MultiLevel(vec![
                leveled("Open", "AJG.X", Column::new("o".into(), vec![100.0])),
                leveled("High", "AJG.X", Column::new("h".into(), vec![105.0])),
                leveled("Low", "AJG.X", Column::new("l".into(), vec![99.0])),
                leveled("Close", "AJG.X", Column::new("c".into(), vec![103.0])),
                leveled("Volume", "AJG.X", Column::new("v".into(), vec![5i64])),
            ]),
        };
        let table = normalize_2024(raw).unwrap();
        assert_eq!(table.bars()[0].symbol, "AJG");
    }

    #[test]
    fn test_flat_and_multi_level_agree() {
        let flat = normalize_2024(flat_frame(&[0, 1])).unwrap();
        let raw = RawFrame {
            index: index(&[0, 1]),
            columns: RawColumns::MultiLevel(vec![
                leveled("Volume", "AJG", Column::new("v".into(), vec![1_000i64; 2])),
                leveled("Close", "AJG", Column::new("c".into(), vec![103.0; 2])),
                leveled("Low", "AJG", Column::new("l".into(), vec![99.0; 2])),
                leveled("High", "AJG", Column::new("h".into(), vec![105.0; 2])),
                leveled("Open", "AJG", Column::new("o".into(), vec![100.0; 2])),
            ]),
        };
        let multi = normalize_2024(raw).unwrap();
        assert_eq!(flat, multi);
    }

    #[test]
    fn test_timestamp_truncates_sub_second_index() {
        let mut raw = flat_frame(&[0]);
        raw.index = vec![JAN_2 * NANOS_PER_SECOND + 999_999_999];
        let table = normalize_2024(raw).unwrap();
        assert_eq!(table.first_timestamp(), JAN_2);
    }

    #[test]
    fn test_sorts_and_dedupes_timestamps() {
        let n = 4;
        let df = df!(
            "open" => &[100.0, 101.0, 102.0, 103.0],
            "high" => vec![110.0; n],
            "low" => vec![90.0; n],
            "close" => vec![100.0; n],
            "volume" => vec![1i64; n],
        )
        .unwrap();
        let raw = RawFrame {
            index: index(&[2, 0, 2, 1]),
            columns: RawColumns::Flat(df),
        };
        let table = normalize_2024(raw).unwrap();
        let stamps: Vec<i64> = table.bars().iter().map(|b| b.timestamp).collect();
        assert_eq!(
            stamps,
            vec![JAN_2, JAN_2 + SECONDS_PER_DAY, JAN_2 + 2 * SECONDS_PER_DAY]
        );
        // First occurrence of the duplicated day wins.
        assert_eq!(table.bars()[2].open, 100.0);
    }

    #[test]
    fn test_drops_rows_outside_range() {
        let table = Normalizer::normalize(
            flat_frame(&[-1, 0, 1, 2]),
            "AJG",
            date(2024, 1, 2),
            date(2024, 1, 3),
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.first_timestamp(), JAN_2);
        assert_eq!(table.last_timestamp(), JAN_2 + SECONDS_PER_DAY);
    }

    #[test]
    fn test_drops_null_and_invalid_rows() {
        let df = df!(
            "open" => &[Some(100.0), None, Some(100.0), Some(-1.0)],
            "high" => &[Some(105.0), None, Some(95.0), Some(105.0)],
            "low" => &[Some(99.0), None, Some(99.0), Some(99.0)],
            "close" => &[Some(103.0), None, Some(103.0), Some(103.0)],
            "volume" => &[Some(10i64), None, Some(10), Some(10)],
        )
        .unwrap();
        let raw = RawFrame {
            index: index(&[0, 1, 2, 3]),
            columns: RawColumns::Flat(df),
        };
        let table = normalize_2024(raw).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.first_timestamp(), JAN_2);
    }

    #[test]
    fn test_drops_nan_prices() {
        let df = df!(
            "open" => &[100.0, f64::NAN],
            "high" => &[105.0, 105.0],
            "low" => &[99.0, 99.0],
            "close" => &[103.0, 103.0],
            "volume" => &[10i64, 10],
        )
        .unwrap();
        let raw = RawFrame {
            index: index(&[0, 1]),
            columns: RawColumns::Flat(df),
        };
        let table = normalize_2024(raw).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_missing_field_is_error() {
        let df = df!(
            "Open" => &[100.0],
            "High" => &[105.0],
            "Low" => &[99.0],
            "Close" => &[103.0],
        )
        .unwrap();
        let raw = RawFrame {
            index: index(&[0]),
            columns: RawColumns::Flat(df),
        };
        match normalize_2024(raw) {
            Err(NormalizeError::MissingField { field }) => assert_eq!(field, "volume"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_field_after_lowercasing_is_error() {
        let raw = RawFrame {
            index: index(&[0]),
            columns: RawColumns::MultiLevel(vec![
                leveled("Close", "AJG", Column::new("a".into(), vec![1.0])),
                leveled("close", "AJG", Column::new("b".into(), vec![1.0])),
            ]),
        };
        assert!(matches!(
            normalize_2024(raw),
            Err(NormalizeError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let mut raw = flat_frame(&[0, 1]);
        raw.index = index(&[0, 1, 2]);
        assert!(matches!(
            normalize_2024(raw),
            Err(NormalizeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_all_rows_filtered_is_error() {
        let result = Normalizer::normalize(
            flat_frame(&[0, 1]),
            "AJG",
            date(2025, 1, 1),
            date(2025, 1, 31),
        );
        assert!(matches!(result, Err(NormalizeError::NoValidRows { .. })));
    }

    #[test]
    fn test_canonical_frame_column_order() {
        let df = df!(
            "volume" => &[1i64],
            "close" => &[1.0],
            "low" => &[1.0],
            "high" => &[1.0],
            "open" => &[1.0],
            "timestamp" => &[0i64],
            "symbol" => &["AJG"],
        )
        .unwrap()
        .select(COLUMNS)
        .unwrap();
        assert!(BarSchema::validate(&df).is_ok());
    }

    #[test]
    fn test_detect_anomalies_flags_zero_volume_and_gaps() {
        let df = df!(
            "symbol" => &["AJG", "AJG", "AJG"],
            "timestamp" => &[0i64, SECONDS_PER_DAY, 10 * SECONDS_PER_DAY],
            "open" => &[100.0, 100.0, 100.0],
            "high" => &[105.0, 105.0, 105.0],
            "low" => &[99.0, 99.0, 99.0],
            "close" => &[103.0, 103.0, 103.0],
            "volume" => &[0i64, 1000, 0],
        )
        .unwrap();

        let anomalies = Normalizer::detect_anomalies(&df).unwrap();

        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].anomaly_type, AnomalyType::ZeroVolume);
        assert_eq!(anomalies[0].count, 2);
        assert_eq!(anomalies[0].severity, Severity::Warning);
        assert_eq!(anomalies[1].anomaly_type, AnomalyType::SuspiciousGap);
        assert_eq!(anomalies[1].count, 1);
        assert_eq!(anomalies[1].severity, Severity::Info);
    }
}
