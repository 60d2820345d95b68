//! Public entry points over the store, plots and reports.
//!
//! Every operation runs through [`traced`], which opens a span named after
//! the operation and logs its duration and outcome. Mutations validate first,
//! rewrite the store, and hand back a fresh [`LabData`]; the caller's value is
//! never touched.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::models::LabData;
use crate::plots::{self, PlotArtifact, PlotError};
use crate::report::{self, GraphPlacement, ReportError};
use crate::store::{self, BoundsUpdate, NewEntry, StoreError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plot(#[from] PlotError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Short description of a successful result, logged on completion.
pub trait Outcome {
    fn summary(&self) -> String;
}

impl Outcome for LabData {
    fn summary(&self) -> String {
        format!("{} records, {} labels", self.dataset.len(), self.grouping.len())
    }
}

impl Outcome for Vec<PlotArtifact> {
    fn summary(&self) -> String {
        format!("{} charts", self.len())
    }
}

impl Outcome for Vec<GraphPlacement> {
    fn summary(&self) -> String {
        format!("{} graphs placed", self.len())
    }
}

impl Outcome for Vec<String> {
    fn summary(&self) -> String {
        format!("{} labels", self.len())
    }
}

/// Runs `op` inside an `info` span, logging start, completion with elapsed
/// milliseconds, or the error.
pub fn traced<T, E, F>(operation: &'static str, op: F) -> Result<T, E>
where
    T: Outcome,
    E: std::fmt::Display,
    F: FnOnce() -> Result<T, E>,
{
    let _span = tracing::info_span!("lab_pipeline", operation).entered();
    let start = Instant::now();
    tracing::info!(operation, "Started");

    let result = op();
    let elapsed_ms = start.elapsed().as_millis();
    match &result {
        Ok(value) => tracing::info!(
            operation,
            elapsed_ms = %elapsed_ms,
            outcome = %value.summary(),
            "Completed"
        ),
        Err(e) => tracing::error!(operation, elapsed_ms = %elapsed_ms, error = %e, "Failed"),
    }
    result
}

/// Paths of the two report artifacts and what went into them.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSet {
    pub workbook: PathBuf,
    pub pdf: PathBuf,
    pub placements: Vec<GraphPlacement>,
    pub pdf_charts: Vec<String>,
}

impl Outcome for ReportSet {
    fn summary(&self) -> String {
        format!(
            "{} graphs in workbook, {} charts in PDF",
            self.placements.len(),
            self.pdf_charts.len()
        )
    }
}

pub struct LabPipeline {
    config: PipelineConfig,
}

impl LabPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Loads the store and repairs missing reference ranges. The repaired
    /// bounds live in memory only until the next mutation rewrites the store.
    pub fn ingest(&self) -> Result<LabData, PipelineError> {
        traced("ingest", || {
            let dataset = store::load_store(&self.config.store_path)?;
            let (dataset, grouping) = store::repair_bounds(dataset);
            Ok(LabData { dataset, grouping })
        })
    }

    pub fn append_entry(&self, data: &LabData, entry: &NewEntry) -> Result<LabData, PipelineError> {
        traced("append_entry", || {
            let dataset = store::append_entry(&data.dataset, entry)?;
            store::write_store(&self.config.store_path, &dataset)?;
            Ok(LabData::new(dataset))
        })
    }

    pub fn update_bounds(
        &self,
        data: &LabData,
        update: &BoundsUpdate,
    ) -> Result<LabData, PipelineError> {
        traced("update_bounds", || {
            let dataset = store::update_bounds(&data.dataset, update)?;
            store::write_store(&self.config.store_path, &dataset)?;
            Ok(LabData::new(dataset))
        })
    }

    pub fn render_plots(&self, data: &LabData) -> Result<Vec<PlotArtifact>, PipelineError> {
        traced("render_plots", || {
            Ok(plots::render_plots(
                &data.dataset,
                &data.grouping,
                &self.config.plots_dir,
            )?)
        })
    }

    /// Stems of the charts currently on disk.
    pub fn list_plots(&self) -> Result<Vec<String>, PipelineError> {
        traced("list_plots", || Ok(plots::list_plot_artifacts(&self.config.plots_dir)?))
    }

    pub fn build_workbook(
        &self,
        data: &LabData,
        selected: &[String],
        destination: &Path,
    ) -> Result<Vec<GraphPlacement>, PipelineError> {
        traced("build_workbook", || {
            Ok(report::build_workbook(
                &data.dataset,
                &data.grouping,
                selected,
                &self.config.plots_dir,
                destination,
            )?)
        })
    }

    pub fn build_pdf(
        &self,
        data: &LabData,
        selected: &[String],
        destination: &Path,
    ) -> Result<Vec<String>, PipelineError> {
        traced("build_pdf", || {
            Ok(report::build_pdf(
                &data.dataset,
                &data.grouping,
                selected,
                destination,
                &self.config.plots_dir,
            )?)
        })
    }

    /// Writes both reports under the configured output directory.
    pub fn generate_reports(
        &self,
        data: &LabData,
        selected: &[String],
    ) -> Result<ReportSet, PipelineError> {
        traced("generate_reports", || {
            if selected.is_empty() {
                return Err(PipelineError::Validation(
                    "Please select at least one label".into(),
                ));
            }
            std::fs::create_dir_all(&self.config.output_dir).map_err(ReportError::from)?;

            let workbook = self.config.workbook_path();
            let pdf = self.config.pdf_path();
            let placements = self.build_workbook(data, selected, &workbook)?;
            let pdf_charts = self.build_pdf(data, selected, &pdf)?;
            Ok(ReportSet {
                workbook,
                pdf,
                placements,
                pdf_charts,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORE: &str = "\
label,unit,value,date,lower_bound,upper_bound
Glucose,mg/dL,90,01/01/24,70,
Glucose,mg/dL,95,02/01/24,,110
Sodium,mmol/L,140,01/15/24,135,145
";

    fn pipeline(root: &Path) -> LabPipeline {
        std::fs::write(root.join("lab_results.csv"), STORE).unwrap();
        LabPipeline::new(PipelineConfig::with_root(root))
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ingest_repairs_bounds_in_memory_only() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path());
        let data = pipeline.ingest().unwrap();

        for record in data.dataset.records.iter().filter(|r| r.label == "Glucose") {
            assert_eq!(record.lower_bound, Some(70.0));
            assert_eq!(record.upper_bound, Some(110.0));
        }
        let on_disk = std::fs::read_to_string(&pipeline.config().store_path).unwrap();
        assert_eq!(on_disk, STORE);
    }

    #[test]
    fn missing_store_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = LabPipeline::new(PipelineConfig::with_root(tmp.path()));
        assert!(matches!(
            pipeline.ingest(),
            Err(PipelineError::Store(StoreError::Io(_)))
        ));
    }

    #[test]
    fn rejected_append_leaves_store_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path());
        let data = pipeline.ingest().unwrap();

        let entry = NewEntry {
            label: "Sodium".into(),
            unit: None,
            value: "abc".into(),
            date: "03/01/24".into(),
        };
        let result = pipeline.append_entry(&data, &entry);

        assert!(matches!(
            result,
            Err(PipelineError::Store(StoreError::Validation(_)))
        ));
        assert_eq!(data.dataset.len(), 3);
        let on_disk = std::fs::read_to_string(&pipeline.config().store_path).unwrap();
        assert_eq!(on_disk, STORE);
    }

    #[test]
    fn append_rewrites_store_and_regroups() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path());
        let data = pipeline.ingest().unwrap();

        let entry = NewEntry {
            label: "Sodium".into(),
            unit: None,
            value: "138".into(),
            date: "03/01/24".into(),
        };
        let updated = pipeline.append_entry(&data, &entry).unwrap();

        assert_eq!(updated.grouping.cardinality("Sodium"), 2);
        assert_eq!(data.grouping.cardinality("Sodium"), 1);

        let reloaded = pipeline.ingest().unwrap();
        assert_eq!(reloaded.dataset.len(), 4);
        let appended = &reloaded.dataset.records[3];
        assert_eq!(appended.unit, "mmol/L");
        assert_eq!(appended.value, Some(138.0));
    }

    #[test]
    fn bound_update_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path());
        let data = pipeline.ingest().unwrap();

        let update = BoundsUpdate {
            label: "Sodium".into(),
            lower: Some("136".into()),
            upper: None,
        };
        pipeline.update_bounds(&data, &update).unwrap();

        let reloaded = pipeline.ingest().unwrap();
        let sodium = &reloaded.dataset.records[2];
        assert_eq!((sodium.lower_bound, sodium.upper_bound), (Some(136.0), None));
    }

    #[test]
    fn bound_update_keeps_other_labels_text_cells() {
        let tmp = tempfile::tempdir().unwrap();
        let store = format!("{STORE}TSH,mU/L,<0.01,01/01/24,0.4,4.0\n");
        std::fs::write(tmp.path().join("lab_results.csv"), store).unwrap();
        let pipeline = LabPipeline::new(PipelineConfig::with_root(tmp.path()));
        let data = pipeline.ingest().unwrap();

        let update = BoundsUpdate {
            label: "Sodium".into(),
            lower: Some("136".into()),
            upper: Some("146".into()),
        };
        pipeline.update_bounds(&data, &update).unwrap();

        let on_disk = std::fs::read_to_string(&pipeline.config().store_path).unwrap();
        assert!(on_disk.contains("TSH,mU/L,<0.01,01/01/24,0.4,4\n"));
        let tsh = &pipeline.ingest().unwrap().dataset.records[3];
        assert_eq!(tsh.value, None);
        assert_eq!(tsh.value_text(), "<0.01");
    }

    #[test]
    fn reports_skip_labels_without_charts() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path());
        let data = pipeline.ingest().unwrap();
        let artifacts = pipeline.render_plots(&data).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(pipeline.list_plots().unwrap(), vec!["glucose"]);

        let reports = pipeline
            .generate_reports(&data, &labels(&["Glucose", "Sodium"]))
            .unwrap();

        assert_eq!(reports.placements.len(), 1);
        assert_eq!(reports.pdf_charts, vec!["Glucose"]);
        assert!(std::fs::read(&reports.workbook).unwrap().starts_with(b"PK"));
        assert!(std::fs::read(&reports.pdf).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = pipeline(tmp.path());
        let data = pipeline.ingest().unwrap();

        assert!(matches!(
            pipeline.generate_reports(&data, &[]),
            Err(PipelineError::Validation(_))
        ));
        assert!(!pipeline.config().workbook_path().exists());
    }
}
