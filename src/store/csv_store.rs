use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use super::StoreError;
use crate::config::STORE_DATE_FORMAT;
use crate::models::{ColumnNames, Dataset, LabRecord, RawCells};

const COLUMN_COUNT: usize = 6;

/// One store row as text, columns taken by position.
#[derive(Debug, Deserialize)]
struct RawRow {
    label: String,
    unit: String,
    value: String,
    date: String,
    lower: String,
    upper: String,
}

/// Opens and parses the store file. An unreadable file is fatal.
pub fn load_store(path: &Path) -> Result<Dataset, StoreError> {
    let file = File::open(path)?;
    let dataset = parse_store(file)?;
    tracing::info!(path = %path.display(), rows = dataset.len(), "Loaded lab store");
    Ok(dataset)
}

/// Reads rows in file order. Dates that do not parse as MM/DD/YY become
/// `None`. Value and bound cells that are not numbers read as `None` with
/// their text kept in [`RawCells`], so a rewrite passes them through
/// unchanged. No row is dropped.
pub fn parse_store<R: Read>(source: R) -> Result<Dataset, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let columns = column_names(reader.headers()?);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let mut raw = result?;
        raw.truncate(COLUMN_COUNT);
        while raw.len() < COLUMN_COUNT {
            raw.push_field("");
        }
        let row: RawRow = raw.deserialize(None)?;
        // +2: header line plus 1-based numbering
        let line = idx + 2;

        let (value, raw_value) = parse_cell(row.value, line, columns.get(ColumnNames::VALUE));
        let (lower_bound, raw_lower) = parse_cell(row.lower, line, columns.get(ColumnNames::LOWER));
        let (upper_bound, raw_upper) = parse_cell(row.upper, line, columns.get(ColumnNames::UPPER));
        records.push(LabRecord {
            value,
            date: parse_date(&row.date),
            lower_bound,
            upper_bound,
            raw: RawCells {
                value: raw_value,
                lower_bound: raw_lower,
                upper_bound: raw_upper,
            },
            label: row.label,
            unit: row.unit,
        });
    }

    Ok(Dataset::new(columns, records))
}

/// Rewrites the whole store. Dates go out as MM/DD/YY, nulls as empty cells,
/// kept non-numeric text as it was read.
pub fn write_store(path: &Path, dataset: &Dataset) -> Result<(), StoreError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(dataset.columns.as_slice())?;
    for record in &dataset.records {
        let value = record.value_text();
        let date = format_date(record.date);
        let lower = record.lower_text();
        let upper = record.upper_text();
        writer.write_record([
            record.label.as_str(),
            record.unit.as_str(),
            value.as_str(),
            date.as_str(),
            lower.as_str(),
            upper.as_str(),
        ])?;
    }
    writer.flush()?;
    tracing::info!(path = %path.display(), rows = dataset.len(), "Rewrote lab store");
    Ok(())
}

/// Strict MM/DD/YY parse; anything else is `None`.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(text, STORE_DATE_FORMAT).ok()
}

/// MM/DD/YY, or an empty string for a missing date.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(STORE_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Number, or the cell's text when it is not one. Empty cells are neither.
fn parse_cell(text: String, line: usize, column: &str) -> (Option<f64>, Option<String>) {
    if text.is_empty() {
        return (None, None);
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => (Some(v), None),
        _ => {
            tracing::warn!(line, column, value = %text, "Non-numeric cell kept as text");
            (None, Some(text))
        }
    }
}

fn column_names(header: &csv::StringRecord) -> ColumnNames {
    if header.len() < COLUMN_COUNT {
        return ColumnNames::default();
    }
    ColumnNames(std::array::from_fn(|i| header[i].to_string()))
}
