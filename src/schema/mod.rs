//! Long-format input records
//!
//! This module reads flat JSON records (array or NDJSON) and converts them
//! into typed samples using a configurable column-name map.

mod adapter;
mod columns;

pub use adapter::*;
pub use columns::*;
