//! Data ingestion: providers, normalization, and the SQLite store

pub mod csv_import;
pub mod ingest;
pub mod normalize;
pub mod provider;
pub mod schema;
pub mod store;
pub mod yahoo;

pub use csv_import::CsvProvider;
pub use ingest::{ingest, IngestError, IngestReport, IngestRequest};
pub use normalize::{NormalizeError, Normalizer};
pub use provider::{is_valid_symbol, DataError, DataProvider, LeveledColumn, RawColumns, RawFrame};
pub use schema::{BarSchema, COLUMNS};
pub use store::{SqliteStore, StoreError, TableSummary};
pub use yahoo::YahooProvider;
