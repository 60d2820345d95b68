//! Summary reports built from the repaired dataset and the rendered charts.
//!
//! Two artifacts, both named `lab_results_report` by default:
//! 1. Workbook: "All Data", "Selected Graphs" and "Current Data" sheets
//! 2. PDF: latest value per analyte, then two selected charts per page
//!
//! Selected analytes without a chart on disk are skipped, never an error.

mod pdf;
mod snapshot;
mod workbook;

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workbook error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("PDF error: {0}")]
    Pdf(String),
}

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════

pub use pdf::*;
pub use snapshot::*;
pub use workbook::*;
