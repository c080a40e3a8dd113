//! Domain types for marketdb

pub mod bar;

pub use bar::{Bar, BarError, BarTable};
