//! Lab result store: CSV ingestion, reference-range repair and the validated
//! mutations that rewrite the store wholesale.
//!
//! Three parts:
//! 1. `csv_store`: parse/load/write the six-column store file
//! 2. `repair`: per-analyte forward/backward fill of missing bounds
//! 3. `mutation`: append entry and bound update, validated before any change

mod csv_store;
mod mutation;
mod repair;

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use csv_store::*;
pub use mutation::*;
pub use repair::*;
