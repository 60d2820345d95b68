use std::path::{Path, PathBuf};

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "Labtrend";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Date format of the store file and of every rendered date (MM/DD/YY).
pub const STORE_DATE_FORMAT: &str = "%m/%d/%y";

/// Default store file, relative to the working root.
pub const DEFAULT_STORE_FILE: &str = "lab_results.csv";

/// Default plot directory, relative to the working root.
pub const DEFAULT_PLOTS_DIR: &str = "plots";

/// Base name shared by the workbook and the PDF report.
pub const REPORT_BASE_NAME: &str = "lab_results_report";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "labtrend=info,warn"
}

/// Where the pipeline reads the store and writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    pub store_path: PathBuf,
    pub plots_dir: PathBuf,
    /// Directory receiving the workbook and PDF reports.
    pub output_dir: PathBuf,
}

impl PipelineConfig {
    /// All paths at their defaults under `root`.
    pub fn with_root(root: &Path) -> Self {
        Self {
            store_path: root.join(DEFAULT_STORE_FILE),
            plots_dir: root.join(DEFAULT_PLOTS_DIR),
            output_dir: root.to_path_buf(),
        }
    }

    pub fn workbook_path(&self) -> PathBuf {
        self.output_dir.join(format!("{REPORT_BASE_NAME}.xlsx"))
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.output_dir.join(format!("{REPORT_BASE_NAME}.pdf"))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_root(Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_paths_share_base_name() {
        let config = PipelineConfig::with_root(Path::new("/data/labs"));
        assert_eq!(
            config.workbook_path(),
            PathBuf::from("/data/labs/lab_results_report.xlsx")
        );
        assert_eq!(
            config.pdf_path(),
            PathBuf::from("/data/labs/lab_results_report.pdf")
        );
    }

    #[test]
    fn defaults_are_relative_to_working_dir() {
        let config = PipelineConfig::default();
        assert!(config.store_path.ends_with(DEFAULT_STORE_FILE));
        assert!(config.plots_dir.ends_with(DEFAULT_PLOTS_DIR));
    }

    #[test]
    fn app_name_is_labtrend() {
        assert_eq!(APP_NAME, "Labtrend");
    }
}
