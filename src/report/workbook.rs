use std::path::{Path, PathBuf};

use chrono::Datelike;
use rust_xlsxwriter::{ExcelDateTime, Format, Image, Workbook, Worksheet, XlsxError};
use serde::Serialize;

use super::snapshot::{latest_entries, sorted_for_listing};
use super::ReportError;
use crate::models::{ColumnNames, Dataset, Grouping, LabRecord};
use crate::plots::plot_path;

pub const ALL_DATA_SHEET: &str = "All Data";
pub const SELECTED_GRAPHS_SHEET: &str = "Selected Graphs";
pub const CURRENT_DATA_SHEET: &str = "Current Data";

/// Excel number format matching the store's date text.
const DATE_NUM_FORMAT: &str = "mm/dd/yy";
const GRID_FIRST_ROW: u32 = 1;
const GRID_ROW_PITCH: u32 = 20;
const GRID_COL_PITCH: u16 = 8;
const GRID_COLUMNS: usize = 2;
const IMAGE_SCALE: f64 = 0.5;

/// Where a chart lands on the "Selected Graphs" sheet (0-based cell).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPlacement {
    pub label: String,
    pub path: PathBuf,
    pub row: u32,
    pub col: u16,
}

/// Lays out the selected charts two per row. An analyte is placed only when
/// it has at least two results and its chart exists; skipped selections do
/// not leave a gap in the grid.
pub fn plan_graph_grid(
    grouping: &Grouping,
    selected: &[String],
    plots_dir: &Path,
) -> Vec<GraphPlacement> {
    let mut placements = Vec::new();
    for label in selected {
        if grouping.cardinality(label) < 2 {
            tracing::debug!(label = %label, "Not enough results for a chart");
            continue;
        }
        let path = plot_path(plots_dir, label);
        if !path.exists() {
            tracing::debug!(label = %label, path = %path.display(), "Chart missing, skipped");
            continue;
        }
        let n = placements.len();
        placements.push(GraphPlacement {
            label: label.clone(),
            path,
            row: GRID_FIRST_ROW + (n / GRID_COLUMNS) as u32 * GRID_ROW_PITCH,
            col: (n % GRID_COLUMNS) as u16 * GRID_COL_PITCH,
        });
    }
    placements
}

/// Writes the three-sheet workbook to `destination` and returns the chart
/// placements it made.
pub fn build_workbook(
    dataset: &Dataset,
    grouping: &Grouping,
    selected: &[String],
    plots_dir: &Path,
    destination: &Path,
) -> Result<Vec<GraphPlacement>, ReportError> {
    let header = Format::new().set_bold();
    let date_format = Format::new().set_num_format(DATE_NUM_FORMAT);
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(ALL_DATA_SHEET)?;
    write_header(sheet, dataset.columns.as_slice(), &header)?;
    for (i, record) in sorted_for_listing(dataset).into_iter().enumerate() {
        write_record(sheet, i as u32 + 1, record, &date_format)?;
    }

    let placements = plan_graph_grid(grouping, selected, plots_dir);
    let sheet = workbook.add_worksheet();
    sheet.set_name(SELECTED_GRAPHS_SHEET)?;
    for placement in &placements {
        let image = Image::new(&placement.path)?
            .set_scale_width(IMAGE_SCALE)
            .set_scale_height(IMAGE_SCALE);
        sheet.insert_image(placement.row, placement.col, &image)?;
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name(CURRENT_DATA_SHEET)?;
    write_header(sheet, dataset.columns.as_slice(), &header)?;
    for (i, record) in latest_entries(dataset, grouping).into_iter().enumerate() {
        write_record(sheet, i as u32 + 1, record, &date_format)?;
    }

    workbook.save(destination)?;
    tracing::info!(
        path = %destination.display(),
        rows = dataset.len(),
        graphs = placements.len(),
        "Workbook written"
    );
    Ok(placements)
}

fn write_header(sheet: &mut Worksheet, columns: &[String], format: &Format) -> Result<(), XlsxError> {
    for (col, name) in columns.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, format)?;
    }
    Ok(())
}

/// One store row across all six columns. Kept non-numeric text is written
/// as a string; missing cells stay empty.
fn write_record(
    sheet: &mut Worksheet,
    row: u32,
    record: &LabRecord,
    date_format: &Format,
) -> Result<(), XlsxError> {
    sheet.write_string(row, ColumnNames::LABEL as u16, &record.label)?;
    sheet.write_string(row, ColumnNames::UNIT as u16, &record.unit)?;
    write_numeric(sheet, row, ColumnNames::VALUE, record.value, record.raw.value.as_deref())?;
    if let Some(date) = record.date {
        let date = ExcelDateTime::from_ymd(date.year() as u16, date.month() as u8, date.day() as u8)?;
        sheet.write_datetime_with_format(row, ColumnNames::DATE as u16, &date, date_format)?;
    }
    write_numeric(
        sheet,
        row,
        ColumnNames::LOWER,
        record.lower_bound,
        record.raw.lower_bound.as_deref(),
    )?;
    write_numeric(
        sheet,
        row,
        ColumnNames::UPPER,
        record.upper_bound,
        record.raw.upper_bound.as_deref(),
    )?;
    Ok(())
}

fn write_numeric(
    sheet: &mut Worksheet,
    row: u32,
    column: usize,
    number: Option<f64>,
    text: Option<&str>,
) -> Result<(), XlsxError> {
    match (number, text) {
        (Some(n), _) => {
            sheet.write_number(row, column as u16, n)?;
        }
        (None, Some(text)) => {
            sheet.write_string(row, column as u16, text)?;
        }
        (None, None) => {}
    }
    Ok(())
}
