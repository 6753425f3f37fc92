//! merge-guard CLI
//!
//! Merges the Sales, Indicators and Stores CSV files, writes the merged table
//! and prints the validation report.
//!
//! Exit codes: 0 when the run passes, 1 when a fatal check halts it, 2 on any
//! other error.

use clap::{ArgAction, Parser, ValueEnum};
use merge_guard::core::MergeContext;
use merge_guard::formatters::{
    FormatterConfig, HumanFormatter, JsonFormatter, MarkdownFormatter, ResultFormatter,
};
use merge_guard::logging::setup::{init_logging, LoggingConfig};
use merge_guard::pipeline::{Pipeline, SourcePaths};
use merge_guard::prelude::*;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level as TraceLevel;

#[derive(Parser, Debug)]
#[command(name = "merge-guard", author, version, about, long_about = None)]
struct Args {
    /// Sales CSV (Store, Dept, Date, Weekly_Sales, IsHoliday)
    #[arg(long)]
    sales: PathBuf,
    /// Indicators CSV (Store, Date, Temperature, ..., IsHoliday)
    #[arg(long)]
    indicators: PathBuf,
    /// Stores CSV (Store, Type, Size)
    #[arg(long)]
    stores: PathBuf,
    /// JSON pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where to write the merged CSV
    #[arg(long)]
    output: Option<PathBuf>,
    /// Where to write the report (stdout if absent)
    #[arg(long)]
    report: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Human)]
    format: Format,
    /// Omit the report timestamp
    #[arg(long, default_value_t = false)]
    no_timestamp: bool,
    /// Emit logs as JSON lines on stderr
    #[arg(long, default_value_t = false)]
    json_logs: bool,
    /// Increase log verbosity
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Human,
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let crate_level = match args.verbose {
        0 => TraceLevel::WARN,
        1 => TraceLevel::INFO,
        2 => TraceLevel::DEBUG,
        _ => TraceLevel::TRACE,
    };
    if let Err(e) = init_logging(
        LoggingConfig::default()
            .with_crate_level(crate_level)
            .with_json_format(args.json_logs),
    ) {
        eprintln!("merge-guard: cannot initialize logging: {e}");
    }

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("merge-guard: {e}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether the run passed.
async fn run(args: &Args) -> Result<bool> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.no_timestamp {
        config = config.with_timestamp(false);
    }

    let log = if args.verbose > 1 {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    let pipeline = Pipeline::new(config)?.with_log_config(log);
    let mut ctx = MergeContext::new()?;
    pipeline
        .register_sources(
            &mut ctx,
            &SourcePaths {
                sales: args.sales.clone(),
                indicators: args.indicators.clone(),
                stores: args.stores.clone(),
            },
        )
        .await?;

    let outcome = pipeline.run(&mut ctx).await?;

    if let (Some(path), Some(merged)) = (&args.output, outcome.merged()) {
        let file = File::create(path)
            .with_context(|| format!("Cannot create output file {}", path.display()))?;
        merged.write_csv(BufWriter::new(file))?;
    }

    let formatter_config = FormatterConfig::default().with_timestamp(!args.no_timestamp);
    let rendered = match args.format {
        Format::Human => HumanFormatter::with_config(formatter_config).format(outcome.report())?,
        Format::Json => JsonFormatter::with_config(formatter_config).format(outcome.report())?,
        Format::Markdown => {
            MarkdownFormatter::with_config(formatter_config).format(outcome.report())?
        }
    };
    match &args.report {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Cannot write report {}", path.display()))?,
        None => print!("{rendered}"),
    }

    Ok(outcome.is_success() && outcome.report().is_pass())
}
