//! Yahoo Finance data provider.
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API and returns them keyed by
//! `(field, ticker)`.
//! One request per run: no retries, bounded by the client timeout.
//!
//! Yahoo Finance has no official API and is subject to unannounced format changes.
//! The CSV import path is the fallback when Yahoo is unavailable.

use super::provider::{
    is_valid_symbol, DataError, DataProvider, LeveledColumn, RawColumns, RawFrame,
};
use crate::config::ProviderConfig;
use crate::domain::bar::midnight_utc;
use chrono::{DateTime, Days, NaiveDate};
use polars::prelude::Column;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    symbol: Option<String>,
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| DataError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build the chart API URL for a symbol and an inclusive date range.
    fn chart_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = midnight_utc(start);
        let end_ts = end
            .checked_add_days(Days::new(1))
            .map(midnight_utc)
            .unwrap_or_else(|| midnight_utc(end));
        format!(
            "{}/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true",
            self.base_url
        )
    }

    /// Parse the chart API response into a multi-level raw frame.
    fn parse_response(
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        resp: ChartResponse,
    ) -> Result<RawFrame, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let empty = || DataError::EmptyResult {
            symbol: symbol.to_string(),
            start,
            end,
        };

        // Yahoo omits `timestamp` entirely when the range has no trading days.
        let timestamps = data.timestamp.filter(|t| !t.is_empty()).ok_or_else(empty)?;

        let (ticker, gmtoffset) = match data.meta {
            Some(meta) => (
                meta.symbol.unwrap_or_else(|| symbol.to_string()),
                meta.gmtoffset.unwrap_or(0),
            ),
            None => (symbol.to_string(), 0),
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let n = timestamps.len();
        let mut index = Vec::with_capacity(n);
        let mut open = Vec::with_capacity(n);
        let mut high = Vec::with_capacity(n);
        let mut low = Vec::with_capacity(n);
        let mut close = Vec::with_capacity(n);
        let mut adj_close = Vec::with_capacity(n);
        let mut volume = Vec::with_capacity(n);

        for (i, &ts) in timestamps.iter().enumerate() {
            let o = quote.open.get(i).copied().flatten();
            let h = quote.high.get(i).copied().flatten();
            let l = quote.low.get(i).copied().flatten();
            let c = quote.close.get(i).copied().flatten();
            let v = quote.volume.get(i).copied().flatten();

            // Skip bars where all OHLCV are None (holidays/non-trading days)
            if o.is_none() && h.is_none() && l.is_none() && c.is_none() && v.is_none() {
                continue;
            }

            // Session timestamps are intraday; key each bar by its exchange-local date.
            let date = DateTime::from_timestamp(ts + gmtoffset, 0)
                .map(|dt| dt.date_naive())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            index.push(midnight_utc(date) * NANOS_PER_SECOND);
            open.push(o);
            high.push(h);
            low.push(l);
            close.push(c);
            volume.push(v);
            adj_close.push(adj_closes.as_ref().and_then(|a| a.get(i).copied().flatten()));
        }

        if index.is_empty() {
            return Err(empty());
        }

        let leveled = |field: &str, values: Column| LeveledColumn {
            field: field.to_string(),
            ticker: ticker.clone(),
            values,
        };
        let columns = vec![
            leveled("Adj Close", Column::new("Adj Close".into(), adj_close)),
            leveled("Close", Column::new("Close".into(), close)),
            leveled("High", Column::new("High".into(), high)),
            leveled("Low", Column::new("Low".into(), low)),
            leveled("Open", Column::new("Open".into(), open)),
            leveled("Volume", Column::new("Volume".into(), volume)),
        ];

        Ok(RawFrame {
            index,
            columns: RawColumns::MultiLevel(columns),
        })
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RawFrame, DataError> {
        // The symbol becomes a URL path segment.
        if !is_valid_symbol(symbol) {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        let url = self.chart_url(symbol, start, end);
        debug!(%url, "requesting chart");

        let resp = self.client.get(&url).send().map_err(|e| {
            if e.is_timeout() {
                DataError::NetworkUnreachable(format!("request timed out: {e}"))
            } else {
                DataError::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DataError::Http {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(symbol, start, end, chart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parse(json: &str) -> Result<RawFrame, DataError> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooProvider::parse_response("AJG", date(2024, 1, 1), date(2024, 12, 31), resp)
    }

    #[test]
    fn chart_url_covers_inclusive_end() {
        let provider = YahooProvider::new(&ProviderConfig::default()).unwrap();
        let url = provider.chart_url("AJG", date(2024, 1, 1), date(2024, 12, 31));
        assert!(url.starts_with("https://query2.finance.yahoo.com/v8/finance/chart/AJG?"));
        assert!(url.contains("period1=1704067200"));
        // 2025-01-01 00:00:00 UTC
        assert!(url.contains("period2=1735689600"));
        assert!(url.contains("interval=1d"));
    }

    #[test]
    fn symbol_with_url_syntax_is_rejected_before_request() {
        // Unroutable base URL: reaching the network would surface as NetworkUnreachable.
        let provider = YahooProvider::new(&ProviderConfig {
            timeout_secs: 1,
            base_url: "http://127.0.0.1:9".to_string(),
            ..ProviderConfig::default()
        })
        .unwrap();
        let result = provider.fetch("AJG?period1=0", date(2024, 1, 1), date(2024, 1, 31));
        assert!(matches!(result, Err(DataError::SymbolNotFound { .. })));
    }

    #[test]
    fn parses_bars_and_skips_holidays() {
        // 2024-01-02 and 2024-01-03 14:30 UTC sessions, with a null row between.
        let json = r#"{"chart":{"result":[{
            "meta":{"symbol":"AJG","gmtoffset":-18000},
            "timestamp":[1704205800,1704249000,1704292200],
            "indicators":{
              "quote":[{"open":[224.1,null,225.0],"high":[226.5,null,227.0],
                        "low":[222.8,null,223.9],"close":[225.9,null,226.4],
                        "volume":[812300,null,655100]}],
              "adjclose":[{"adjclose":[223.0,null,223.5]}]}}],"error":null}}"#;

        let frame = parse(json).unwrap();
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.index[0], 1_704_153_600 * NANOS_PER_SECOND);
        assert_eq!(frame.index[1], 1_704_240_000 * NANOS_PER_SECOND);

        match frame.columns {
            RawColumns::MultiLevel(cols) => {
                assert_eq!(cols.len(), 6);
                assert!(cols.iter().all(|c| c.ticker == "AJG"));
                let close = cols.iter().find(|c| c.field == "Close").unwrap();
                assert_eq!(close.values.f64().unwrap().get(1), Some(226.4));
            }
            RawColumns::Flat(_) => panic!("expected multi-level columns"),
        }
    }

    #[test]
    fn not_found_error_maps_to_symbol_not_found() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        match parse(json) {
            Err(DataError::SymbolNotFound { symbol }) => assert_eq!(symbol, "AJG"),
            other => panic!("expected SymbolNotFound, got {other:?}"),
        }
    }

    #[test]
    fn missing_timestamps_is_empty_result() {
        let json = r#"{"chart":{"result":[{
            "meta":{"symbol":"AJG","gmtoffset":-18000},
            "indicators":{"quote":[{"open":[],"high":[],"low":[],"close":[],"volume":[]}]}}],
            "error":null}}"#;
        assert!(matches!(parse(json), Err(DataError::EmptyResult { .. })));
    }

    #[test]
    fn all_null_rows_is_empty_result() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704205800],
            "indicators":{"quote":[{"open":[null],"high":[null],"low":[null],
                                    "close":[null],"volume":[null]}]}}],"error":null}}"#;
        assert!(matches!(parse(json), Err(DataError::EmptyResult { .. })));
    }

    #[test]
    fn other_chart_errors_are_format_errors() {
        let json = r#"{"chart":{"result":null,
            "error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        assert!(matches!(
            parse(json),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }
}
