//! marketdb core: daily OHLCV ingestion into a local SQLite store.
//!
//! This crate contains:
//! - Domain types (bars and the validated bar table)
//! - Data providers (Yahoo Finance chart API, CSV import)
//! - Normalization of flat and multi-level provider frames
//! - SQLite store with transactional full-replace writes
//! - The ingestion pipeline tying them together
//! - File configuration and the `zig build-lib` wrapper

pub mod config;
pub mod data;
pub mod domain;
pub mod toolchain;
