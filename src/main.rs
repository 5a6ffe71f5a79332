use std::path::PathBuf;

use bomflow_etl::config::{OutputFormat, PipelineConfig};
use bomflow_etl::io::excel_read;
use bomflow_etl::pipeline::{self, RunRequest};
use bomflow_etl::{EtlError, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_level)?;
    match cli.command {
        Command::Transform(args) => execute_transform(args),
        Command::Sheets(args) => execute_sheets(args),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| EtlError::Logging(err.to_string()))
}

fn execute_transform(args: TransformArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(EtlError::MissingInput(args.input));
    }

    let config = args.resolve_config()?;
    let request = RunRequest {
        input: args.input,
        master_sheet: args.master_sheet,
        status_sheet: args.status_sheet,
        output_dir: args.output_dir,
        config,
    };
    let report = pipeline::run(&request)?;

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }

    println!(
        "run {}: {} parts, {} plants, {} duplicates removed, {} warnings",
        report.run_id,
        report.summary.total_parts,
        report.summary.plants_detected,
        report.summary.duplicates_removed,
        report.warnings.len()
    );
    for outcome in &report.outputs {
        match &outcome.result {
            Ok(artifacts) => println!("  {}: {} file(s)", outcome.format, artifacts.len()),
            Err(message) => println!("  {}: failed ({message})", outcome.format),
        }
    }
    Ok(())
}

fn execute_sheets(args: SheetsArgs) -> Result<()> {
    for name in excel_read::list_sheets(&args.input)? {
        println!("{name}");
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Turn a MasterBOM and Status workbook into analysis-ready tables."
)]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ETL over one workbook.
    Transform(TransformArgs),
    /// List the worksheets of a workbook.
    Sheets(SheetsArgs),
}

#[derive(clap::Args)]
struct TransformArgs {
    /// Workbook to read.
    #[arg(long)]
    input: PathBuf,

    /// Name of the MasterBOM worksheet.
    #[arg(long)]
    master_sheet: String,

    /// Name of the Status worksheet.
    #[arg(long)]
    status_sheet: String,

    /// Directory receiving every output file.
    #[arg(long)]
    output_dir: PathBuf,

    /// Output formats; defaults to all of them.
    #[arg(long = "format", value_enum)]
    formats: Vec<FormatKind>,

    /// Identifier column of the MasterBOM sheet.
    #[arg(long)]
    id_column: Option<String>,

    /// Treat exactly these MasterBOM columns as dates.
    #[arg(long = "date-column")]
    date_columns: Vec<String>,

    /// Never treat these MasterBOM columns as dates.
    #[arg(long = "exclude-date-column")]
    excluded_date_columns: Vec<String>,

    /// JSON configuration file; flags take precedence over it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the JSON run report.
    #[arg(long)]
    report: Option<PathBuf>,
}

impl TransformArgs {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };
        if !self.formats.is_empty() {
            config.formats = self.formats.iter().copied().map(OutputFormat::from).collect();
        }
        if let Some(id_column) = &self.id_column {
            config.masterbom.id_column = id_column.clone();
        }
        if !self.date_columns.is_empty() {
            config.masterbom.date_columns = Some(self.date_columns.clone());
        }
        config
            .masterbom
            .excluded_date_columns
            .extend(self.excluded_date_columns.iter().cloned());
        config.validate()?;
        Ok(config)
    }
}

#[derive(clap::Args)]
struct SheetsArgs {
    /// Workbook to inspect.
    #[arg(long)]
    input: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatKind {
    Csv,
    Parquet,
    Sqlite,
    Xlsx,
}

impl From<FormatKind> for OutputFormat {
    fn from(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Csv => OutputFormat::Csv,
            FormatKind::Parquet => OutputFormat::Parquet,
            FormatKind::Sqlite => OutputFormat::Sqlite,
            FormatKind::Xlsx => OutputFormat::Xlsx,
        }
    }
}
