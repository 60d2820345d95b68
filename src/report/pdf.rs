use std::borrow::Cow;
use std::io::{BufWriter, Cursor};
use std::path::{Path, PathBuf};

use printpdf::image_crate::codecs::png::PngDecoder;
use printpdf::image_crate::ImageDecoder;
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point,
};

use super::snapshot::latest_entries;
use super::ReportError;
use crate::models::{ColumnNames, Dataset, Grouping};
use crate::plots::plot_path;
use crate::store::format_date;

pub const PDF_TITLE: &str = "Lab Results Report";
const SNAPSHOT_HEADING: &str = "Most Current Data";

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN_LEFT: f32 = 10.0;
const MARGIN_TOP: f32 = 10.0;
const MARGIN_BOTTOM: f32 = 15.0;
const CELL_W: f32 = 40.0;
const CELL_H: f32 = 10.0;
const IMAGE_W: f32 = 190.0;
/// Distance from the page top to the top edge of each chart slot.
const SLOT_TOPS: [f32; 2] = [30.0, 150.0];
/// Approximate Helvetica advance as a fraction of the font size.
const AVG_GLYPH_EM: f32 = 0.5;
const PT_TO_MM: f32 = 0.3528;

/// Assembled PDF, the analytes that made it onto a chart page, and the
/// number of pages.
#[derive(Debug, Clone)]
pub struct PdfReport {
    pub bytes: Vec<u8>,
    pub charted: Vec<String>,
    pub pages: usize,
}

/// Page index (0-based) and distance from the page top of one box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSlot {
    pub page: usize,
    pub top: f32,
}

/// A chart that exists on disk and the slot it goes into.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSlot {
    pub label: String,
    pub path: PathBuf,
    pub slot: PageSlot,
}

/// Slots for `rows` table rows under the header on the first page. A row
/// that would cross the bottom margin starts a new page at the top margin.
pub fn plan_table_rows(rows: usize) -> Vec<PageSlot> {
    let mut page = 0;
    let mut top = MARGIN_TOP + 2.0 * CELL_H;
    let mut slots = Vec::with_capacity(rows);
    for _ in 0..rows {
        if top + CELL_H > PAGE_H - MARGIN_BOTTOM {
            page += 1;
            top = MARGIN_TOP;
        }
        slots.push(PageSlot { page, top });
        top += CELL_H;
    }
    slots
}

/// Two chart slots per page, starting on `first_page`. Every page opens with
/// its first slot; selections without a chart on disk take no slot.
pub fn plan_chart_slots(selected: &[String], plots_dir: &Path, first_page: usize) -> Vec<ChartSlot> {
    let mut slots = Vec::new();
    for label in selected {
        let path = plot_path(plots_dir, label);
        if !path.exists() {
            tracing::debug!(label = %label, path = %path.display(), "Chart missing, skipped");
            continue;
        }
        let n = slots.len();
        slots.push(ChartSlot {
            label: label.clone(),
            path,
            slot: PageSlot {
                page: first_page + n / SLOT_TOPS.len(),
                top: SLOT_TOPS[n % SLOT_TOPS.len()],
            },
        });
    }
    slots
}

/// Builds the PDF in memory: a title and latest-value table, then the
/// selected charts two per page in selection order. Selections without a
/// chart on disk are skipped.
pub fn generate_pdf(
    dataset: &Dataset,
    grouping: &Grouping,
    selected: &[String],
    plots_dir: &Path,
) -> Result<PdfReport, ReportError> {
    let (doc, page1, layer1) = PdfDocument::new(PDF_TITLE, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;

    let mut layers = vec![doc.get_page(page1).get_layer(layer1)];
    centered_text(&layers[0], SNAPSHOT_HEADING, 16.0, MARGIN_TOP + 7.0, &bold);

    // Latest-value table
    let columns = &dataset.columns.as_slice()[..=ColumnNames::DATE];
    table_row(&layers[0], columns.iter().map(String::as_str), MARGIN_TOP + CELL_H, &bold);
    let latest = latest_entries(dataset, grouping);
    for (record, slot) in latest.iter().zip(plan_table_rows(latest.len())) {
        let layer = layer_for(&doc, &mut layers, slot.page);
        let value = record.value_text();
        let date = format_date(record.date);
        let cells = [record.label.as_str(), record.unit.as_str(), value.as_str(), date.as_str()];
        table_row(&layer, cells.into_iter(), slot.top, &font);
    }

    // Chart pages
    let charts = plan_chart_slots(selected, plots_dir, layers.len());
    for chart in &charts {
        let layer = layer_for(&doc, &mut layers, chart.slot.page);
        let title = format!("{} Graph", chart.label);
        centered_text(&layer, &title, 12.0, chart.slot.top - 4.0, &bold);
        place_chart(&layer, &chart.path, chart.slot.top)?;
    }

    let pages = layers.len();
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("save error: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| ReportError::Pdf(format!("buffer error: {e}")))?;
    Ok(PdfReport {
        bytes,
        charted: charts.into_iter().map(|c| c.label).collect(),
        pages,
    })
}

/// Writes the PDF to `destination`, returning the analytes charted.
pub fn build_pdf(
    dataset: &Dataset,
    grouping: &Grouping,
    selected: &[String],
    destination: &Path,
    plots_dir: &Path,
) -> Result<Vec<String>, ReportError> {
    let report = generate_pdf(dataset, grouping, selected, plots_dir)?;
    std::fs::write(destination, &report.bytes)?;
    tracing::info!(
        path = %destination.display(),
        bytes = report.bytes.len(),
        charts = report.charted.len(),
        "PDF written"
    );
    Ok(report.charted)
}

/// PDF y coordinate for a distance measured from the page top.
fn from_top(mm: f32) -> Mm {
    Mm(PAGE_H - mm)
}

/// Layer of page `page`, adding pages until it exists.
fn layer_for(
    doc: &PdfDocumentReference,
    layers: &mut Vec<PdfLayerReference>,
    page: usize,
) -> PdfLayerReference {
    while layers.len() <= page {
        let (page_index, layer_index) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        layers.push(doc.get_page(page_index).get_layer(layer_index));
    }
    layers[page].clone()
}

/// Text the builtin fonts can show. Only ASCII survives their encoding, so
/// common Latin letters and lab symbols are transliterated and anything
/// else becomes `?`.
pub fn pdf_text(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let mapped = match c {
            'µ' | 'μ' => "u",
            'Ä' => "Ae",
            'Ö' => "Oe",
            'Ü' => "Ue",
            'ä' => "ae",
            'ö' => "oe",
            'ü' => "ue",
            'ß' => "ss",
            'À' | 'Á' | 'Â' | 'Ã' | 'Å' => "A",
            'à' | 'á' | 'â' | 'ã' | 'å' => "a",
            'Ç' => "C",
            'ç' => "c",
            'È' | 'É' | 'Ê' | 'Ë' => "E",
            'è' | 'é' | 'ê' | 'ë' => "e",
            'Ì' | 'Í' | 'Î' | 'Ï' => "I",
            'ì' | 'í' | 'î' | 'ï' => "i",
            'Ñ' => "N",
            'ñ' => "n",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' => "O",
            'ò' | 'ó' | 'ô' | 'õ' | 'ø' => "o",
            'Ù' | 'Ú' | 'Û' => "U",
            'ù' | 'ú' | 'û' => "u",
            'Ý' => "Y",
            'ý' | 'ÿ' => "y",
            '°' => "deg",
            '±' => "+/-",
            '≤' => "<=",
            '≥' => ">=",
            '×' => "x",
            '²' => "2",
            '³' => "3",
            '\u{2013}' | '\u{2014}' => "-",
            _ => "?",
        };
        out.push_str(mapped);
    }
    Cow::Owned(out)
}

fn centered_text(layer: &PdfLayerReference, text: &str, size: f32, baseline: f32, font: &IndirectFontRef) {
    let text = pdf_text(text);
    let width = text.chars().count() as f32 * size * AVG_GLYPH_EM * PT_TO_MM;
    let x = ((PAGE_W - width) / 2.0).max(MARGIN_LEFT);
    layer.use_text(text, size, Mm(x), from_top(baseline), font);
}

/// Bordered 40×10 mm cells starting at the left margin, text left-aligned.
fn table_row<'a>(
    layer: &PdfLayerReference,
    cells: impl Iterator<Item = &'a str>,
    top: f32,
    font: &IndirectFontRef,
) {
    for (i, text) in cells.enumerate() {
        let left = MARGIN_LEFT + i as f32 * CELL_W;
        let corners = [
            (left, top),
            (left + CELL_W, top),
            (left + CELL_W, top + CELL_H),
            (left, top + CELL_H),
        ];
        layer.add_line(Line {
            points: corners
                .iter()
                .map(|&(x, y)| (Point::new(Mm(x), from_top(y)), false))
                .collect(),
            is_closed: true,
        });
        layer.use_text(pdf_text(text), 10.0, Mm(left + 1.5), from_top(top + 7.0), font);
    }
}

/// Embeds the chart at full content width with its top edge at `slot_top`.
fn place_chart(layer: &PdfLayerReference, path: &Path, slot_top: f32) -> Result<(), ReportError> {
    let bytes = std::fs::read(path)?;
    let decoder = PngDecoder::new(Cursor::new(bytes))
        .map_err(|e| ReportError::Pdf(format!("{}: {e}", path.display())))?;
    let (width_px, height_px) = decoder.dimensions();
    let image = Image::try_from(decoder)
        .map_err(|e| ReportError::Pdf(format!("{}: {e}", path.display())))?;

    let dpi = width_px as f32 * 25.4 / IMAGE_W;
    let height_mm = height_px as f32 * 25.4 / dpi;
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(MARGIN_LEFT)),
            translate_y: Some(from_top(slot_top + height_mm)),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
    Ok(())
}
