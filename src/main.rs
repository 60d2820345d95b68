use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use labtrend::config::PipelineConfig;
use labtrend::models::LabData;
use labtrend::pipeline::{LabPipeline, PipelineError};
use labtrend::store::{format_date, BoundsUpdate, NewEntry};

#[derive(Parser, Debug)]
#[command(name = "labtrend")]
#[command(author, version, about = "Track lab results, chart each analyte and build summary reports")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Lab result store (CSV)
    #[arg(long, default_value = labtrend::config::DEFAULT_STORE_FILE)]
    store: PathBuf,

    /// Directory for per-analyte charts
    #[arg(long, default_value = labtrend::config::DEFAULT_PLOTS_DIR)]
    plots_dir: PathBuf,

    /// Directory receiving the workbook and PDF reports
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List analytes with their result count, unit and reference range
    Labels,

    /// Append a result
    Add {
        label: String,
        value: String,
        /// MM/DD/YY
        date: String,
        /// Required when the label is new
        #[arg(short, long)]
        unit: Option<String>,
    },

    /// Replace the reference range of every result for an analyte
    Bounds {
        label: String,
        #[arg(long)]
        lower: Option<String>,
        #[arg(long)]
        upper: Option<String>,
    },

    /// Render a chart for every analyte with two or more results
    Plots,

    /// List charts present in the plot directory
    Graphs,

    /// Build the workbook and PDF reports for the selected analytes
    Report {
        #[arg(long, num_args = 1.., required = true)]
        select: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct LabelSummary {
    label: String,
    unit: String,
    results: usize,
    latest_value: String,
    latest_date: String,
    lower_bound: String,
    upper_bound: String,
}

fn label_summaries(data: &LabData) -> Vec<LabelSummary> {
    labtrend::report::latest_entries(&data.dataset, &data.grouping)
        .into_iter()
        .map(|record| {
            // Bounds shown are those of the group's first member.
            let first = data
                .dataset
                .records
                .iter()
                .find(|r| r.label == record.label)
                .unwrap_or(record);
            LabelSummary {
                label: record.label.clone(),
                unit: record.unit.clone(),
                results: data.grouping.cardinality(&record.label),
                latest_value: record.value_text(),
                latest_date: format_date(record.date),
                lower_bound: first.lower_text(),
                upper_bound: first.upper_text(),
            }
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), PipelineError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::Validation(format!("JSON output failed: {e}")))?;
    println!("{text}");
    Ok(())
}

fn run(args: Args) -> Result<(), PipelineError> {
    let pipeline = LabPipeline::new(PipelineConfig {
        store_path: args.store,
        plots_dir: args.plots_dir,
        output_dir: args.out_dir,
    });

    match args.command {
        Command::Labels => {
            let data = pipeline.ingest()?;
            let summaries = label_summaries(&data);
            if args.json {
                return print_json(&summaries);
            }
            for s in &summaries {
                println!(
                    "{:<28} {:>4}  {:>10} {:<10} on {:<8}  range [{}, {}]",
                    s.label, s.results, s.latest_value, s.unit, s.latest_date, s.lower_bound, s.upper_bound
                );
            }
        }
        Command::Add { label, value, date, unit } => {
            let data = pipeline.ingest()?;
            let entry = NewEntry { label, unit, value, date };
            let data = pipeline.append_entry(&data, &entry)?;
            println!("Added {} ({} results)", entry.label.trim(), data.grouping.cardinality(entry.label.trim()));
        }
        Command::Bounds { label, lower, upper } => {
            let data = pipeline.ingest()?;
            let update = BoundsUpdate { label, lower, upper };
            pipeline.update_bounds(&data, &update)?;
            println!("Updated reference range for {}", update.label.trim());
        }
        Command::Plots => {
            let data = pipeline.ingest()?;
            let artifacts = pipeline.render_plots(&data)?;
            if args.json {
                return print_json(&artifacts);
            }
            for artifact in &artifacts {
                println!("{}", artifact.path.display());
            }
        }
        Command::Graphs => {
            let stems = pipeline.list_plots()?;
            if args.json {
                return print_json(&stems);
            }
            for stem in &stems {
                println!("{stem}");
            }
        }
        Command::Report { select } => {
            let data = pipeline.ingest()?;
            let reports = pipeline.generate_reports(&data, &select)?;
            if args.json {
                return print_json(&reports);
            }
            println!("Workbook: {}", reports.workbook.display());
            println!("PDF:      {}", reports.pdf.display());
        }
    }
    Ok(())
}

fn main() {
    labtrend::init_tracing();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
