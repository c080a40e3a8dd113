//! File configuration for the `marketdb` binary.
//!
//! Every key is optional. The CLI layers its flags over this file, and this
//! file over the built-in defaults. The pipeline itself never reads defaults:
//! it only sees the resolved values.
//!
//! ```toml
//! [ingest]
//! symbol = "AJG"
//! start = "2024-01-01"
//! end = "2024-12-31"
//! database = "market.db"
//! table = "ohlcv"
//!
//! [provider]
//! timeout_secs = 30
//!
//! [toolchain]
//! compiler = "zig"
//! optimize = "ReleaseSafe"
//! root = "."
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "marketdb.toml";

pub const DEFAULT_SYMBOL: &str = "AJG";
pub const DEFAULT_START: &str = "2024-01-01";
pub const DEFAULT_END: &str = "2024-12-31";
pub const DEFAULT_DATABASE: &str = "market.db";
pub const DEFAULT_TABLE: &str = "ohlcv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid date '{value}' for {key} (expected YYYY-MM-DD)")]
    InvalidDate { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ingest: IngestConfig,
    pub provider: ProviderConfig,
    pub toolchain: ToolchainConfig,
}

/// Ingestion parameters. Dates are kept as strings until resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub symbol: String,
    pub start: String,
    pub end: String,
    pub database: PathBuf,
    pub table: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_SYMBOL.to_string(),
            start: DEFAULT_START.to_string(),
            end: DEFAULT_END.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn start_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date("start", &self.start)
    }

    pub fn end_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date("end", &self.end)
    }
}

/// HTTP provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Whole-request timeout. The fetch is never retried.
    pub timeout_secs: u64,
    pub user_agent: String,
    pub base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            base_url: "https://query2.finance.yahoo.com".to_string(),
        }
    }
}

/// Compiler toolchain settings for the `compile-*` commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub compiler: String,
    pub optimize: String,
    /// Project root that `usr/` sources and `zig-out/` artifacts are relative to.
    pub root: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: "zig".to_string(),
            optimize: "ReleaseSafe".to_string(),
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Resolve the config for a run.
    ///
    /// An explicit path must exist. Without one, `marketdb.toml` in the working
    /// directory is used if present, otherwise the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Parse a `YYYY-MM-DD` date, naming the offending key on failure.
pub fn parse_date(key: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        key,
        value: value.to_string(),
    })
}
