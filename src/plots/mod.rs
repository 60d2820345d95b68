//! Per-analyte trend charts.
//!
//! One PNG per analyte with at least two results, written to
//! `<plots_dir>/<sanitize(label)>.png`. The reference range is overlaid as a
//! shaded band when both bounds are known, otherwise as a dashed line at the
//! single known bound.

mod glyph_backend;

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use plotters::prelude::*;
use plotters::style::FontTransform;
use serde::Serialize;
use thiserror::Error;

use crate::config::STORE_DATE_FORMAT;
use crate::filename::sanitize;
use crate::models::{cmp_date_nulls_last, Dataset, Grouping, LabRecord};
use glyph_backend::GlyphTextBackend;

// ═══════════════════════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Drawing error for '{label}': {reason}")]
    Drawing { label: String, reason: String },
}

/// Reference-range overlay drawn behind the value series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Overlay {
    Band { lower: f64, upper: f64 },
    LowerLine { lower: f64 },
    UpperLine { upper: f64 },
    None,
}

impl Overlay {
    pub fn choose(lower: Option<f64>, upper: Option<f64>) -> Self {
        match (lower, upper) {
            (Some(lower), Some(upper)) => Overlay::Band { lower, upper },
            (Some(lower), None) => Overlay::LowerLine { lower },
            (None, Some(upper)) => Overlay::UpperLine { upper },
            (None, None) => Overlay::None,
        }
    }

    fn levels(&self) -> Vec<f64> {
        match *self {
            Overlay::Band { lower, upper } => vec![lower, upper],
            Overlay::LowerLine { lower } => vec![lower],
            Overlay::UpperLine { upper } => vec![upper],
            Overlay::None => vec![],
        }
    }
}

/// A chart written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotArtifact {
    pub label: String,
    pub path: PathBuf,
    pub overlay: Overlay,
}

const PLOT_SIZE: (u32, u32) = (1000, 500);
const SERIES_COLOR: RGBColor = RGBColor(31, 119, 180);
const RANGE_COLOR: RGBColor = RGBColor(128, 128, 128);
/// Dashes per overlay line across the x span.
const DASH_COUNT: usize = 40;

// ═══════════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════════

/// Path of the chart for `label` inside `plots_dir`.
pub fn plot_path(plots_dir: &Path, label: &str) -> PathBuf {
    plots_dir.join(format!("{}.png", sanitize(label)))
}

/// Renders every analyte with two or more results, overwriting existing
/// charts. Analytes are visited in label order.
pub fn render_plots(
    dataset: &Dataset,
    grouping: &Grouping,
    output_dir: &Path,
) -> Result<Vec<PlotArtifact>, PlotError> {
    std::fs::create_dir_all(output_dir)?;

    let mut artifacts = Vec::new();
    for (label, members) in grouping.iter() {
        if members.len() < 2 {
            tracing::debug!(label, "Single result, no chart");
            continue;
        }

        let mut records: Vec<&LabRecord> = members.iter().filter_map(|&i| dataset.get(i)).collect();
        records.sort_by(|a, b| cmp_date_nulls_last(a.date, b.date));

        let lower = records.iter().filter_map(|r| r.lower_bound).reduce(f64::min);
        let upper = records.iter().filter_map(|r| r.upper_bound).reduce(f64::max);
        let overlay = Overlay::choose(lower, upper);

        let path = plot_path(output_dir, label);
        draw_chart(&path, label, &records, overlay).map_err(|reason| PlotError::Drawing {
            label: label.to_string(),
            reason,
        })?;

        tracing::info!(label, path = %path.display(), ?overlay, "Wrote chart");
        artifacts.push(PlotArtifact {
            label: label.to_string(),
            path,
            overlay,
        });
    }
    Ok(artifacts)
}

/// Stems of the `.png` files in `plots_dir`, sorted. A missing directory
/// has no charts.
pub fn list_plot_artifacts(plots_dir: &Path) -> Result<Vec<String>, PlotError> {
    if !plots_dir.exists() {
        return Ok(Vec::new());
    }
    let mut stems = Vec::new();
    for entry in std::fs::read_dir(plots_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    stems.sort();
    Ok(stems)
}

fn day_number(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce())
}

fn format_day(x: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
        .map(|d| d.format(STORE_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Pads a data extent so flat or single-point series still get a visible
/// range.
fn padded(min: f64, max: f64, flat_pad: f64) -> (f64, f64) {
    let span = max - min;
    if span <= f64::EPSILON {
        (min - flat_pad, max + flat_pad)
    } else {
        (min - span * 0.05, max + span * 0.05)
    }
}

fn extent(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn draw_chart(
    path: &Path,
    label: &str,
    records: &[&LabRecord],
    overlay: Overlay,
) -> Result<(), String> {
    // Undated or valueless results cannot be placed on the time axis.
    let points: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| Some((day_number(r.date?), r.value?)))
        .collect();
    let unit = records.first().map(|r| r.unit.as_str()).unwrap_or_default();

    let (x_min, x_max) = extent(points.iter().map(|p| p.0))
        .map(|(lo, hi)| padded(lo, hi, 1.0))
        .unwrap_or((0.0, 1.0));
    let levels = overlay.levels();
    let (y_min, y_max) = extent(points.iter().map(|p| p.1).chain(levels.iter().copied()))
        .map(|(lo, hi)| padded(lo, hi, (hi.abs() * 0.1).max(1.0)))
        .unwrap_or((0.0, 1.0));

    let root = GlyphTextBackend::new(BitMapBackend::new(path, PLOT_SIZE)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| e.to_string())?;

    let mut chart = ChartBuilder::on(&root)
        .caption(label, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(110)
        .y_label_area_size(80)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)
        .map_err(|e| e.to_string())?;

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc(format!("{label} ({unit})"))
        .x_labels(10)
        .x_label_formatter(&|x| format_day(*x))
        .x_label_style(
            ("sans-serif", 14)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .axis_desc_style(("sans-serif", 16))
        .draw()
        .map_err(|e| e.to_string())?;

    // Band spans the dated results, like the series it frames.
    let (span_start, span_end) = match (points.first(), points.last()) {
        (Some(first), Some(last)) if last.0 > first.0 => (first.0, last.0),
        _ => (x_min, x_max),
    };

    match overlay {
        Overlay::Band { lower, upper } => {
            let fill = RANGE_COLOR.mix(0.3).filled();
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [(span_start, lower), (span_end, upper)],
                    fill,
                )))
                .map_err(|e| e.to_string())?
                .label("Normal Range")
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], fill));
        }
        Overlay::LowerLine { lower: level } | Overlay::UpperLine { upper: level } => {
            let name = if matches!(overlay, Overlay::LowerLine { .. }) {
                "Lower Bound"
            } else {
                "Upper Bound"
            };
            let style = RANGE_COLOR.stroke_width(2);
            chart
                .draw_series(dashes(level, (x_min, x_max), style))
                .map_err(|e| e.to_string())?
                .label(name)
                .legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + 8, y), (x + 12, y), (x + 20, y)], style)
                });
        }
        Overlay::None => {}
    }

    chart
        .draw_series(LineSeries::new(
            points.iter().copied(),
            SERIES_COLOR.stroke_width(2),
        ))
        .map_err(|e| e.to_string())?
        .label(label)
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], SERIES_COLOR.stroke_width(2)));
    chart
        .draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, 4, SERIES_COLOR.filled())),
        )
        .map_err(|e| e.to_string())?;

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK.mix(0.3))
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(|e| e.to_string())?;

    root.present().map_err(|e| e.to_string())?;
    Ok(())
}

/// Dash segments of a horizontal line at `level` across `(from, to)`.
fn dashes(level: f64, (from, to): (f64, f64), style: ShapeStyle) -> Vec<PathElement<(f64, f64)>> {
    let step = (to - from) / DASH_COUNT as f64;
    (0..DASH_COUNT)
        .map(|i| {
            let start = from + step * i as f64;
            PathElement::new(vec![(start, level), (start + step * 0.6, level)], style)
        })
        .collect()
}
