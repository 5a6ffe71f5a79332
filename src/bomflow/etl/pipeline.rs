//! End-to-end orchestration of one ETL run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::bomflow::etl::config::PipelineConfig;
use crate::bomflow::etl::dates;
use crate::bomflow::etl::error::{Result, RunWarning, Stage, Warnings};
use crate::bomflow::etl::flatten::{build_tables, dimension_tables};
use crate::bomflow::etl::io::{ArtifactInfo, excel_read};
use crate::bomflow::etl::masterbom::{self, MasterBomOutput};
use crate::bomflow::etl::model::{StatusClass, Table};
use crate::bomflow::etl::normalize::DateDetection;
use crate::bomflow::etl::status;
use crate::bomflow::etl::writer::{self, FormatOutcome};

/// Everything needed to run the pipeline once.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub master_sheet: String,
    pub status_sheet: String,
    pub output_dir: PathBuf,
    pub config: PipelineConfig,
}

/// Headline numbers of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_parts: usize,
    pub active_entries: usize,
    pub inactive_entries: usize,
    pub new_entries: usize,
    pub duplicate_entries: usize,
    pub unknown_entries: usize,
    pub plants_detected: usize,
    pub duplicates_removed: usize,
    pub date_columns_processed: usize,
    pub status_rows: usize,
    pub processing_time_seconds: f64,
    pub table_rows: BTreeMap<String, usize>,
}

/// Tables produced by a run before anything is persisted.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub tables: Vec<Table>,
    pub summary: RunSummary,
    pub warnings: Vec<RunWarning>,
}

impl TransformOutput {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Report of a completed run, serializable for callers and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outputs: Vec<FormatOutcome>,
    pub artifacts: Vec<ArtifactInfo>,
    pub summary: RunSummary,
    pub warnings: Vec<RunWarning>,
}

impl RunReport {
    /// Whether every requested format and the data dictionary were written.
    pub fn all_outputs_succeeded(&self) -> bool {
        self.outputs.iter().all(FormatOutcome::is_ok)
    }
}

fn summarize(masterbom: &MasterBomOutput, status_rows: usize, tables: &[Table]) -> RunSummary {
    let mut summary = RunSummary {
        total_parts: masterbom.fact_parts.len(),
        plants_detected: masterbom.plants.len(),
        duplicates_removed: masterbom.duplicates_removed,
        date_columns_processed: masterbom.date_roles.len(),
        status_rows,
        ..RunSummary::default()
    };
    for entry in &masterbom.plant_item_status {
        let counter = match entry.status_class {
            StatusClass::Active => &mut summary.active_entries,
            StatusClass::Inactive => &mut summary.inactive_entries,
            StatusClass::New => &mut summary.new_entries,
            StatusClass::Duplicate => &mut summary.duplicate_entries,
            StatusClass::Unknown => &mut summary.unknown_entries,
        };
        *counter += 1;
    }
    summary.table_rows = tables
        .iter()
        .map(|table| (table.name.clone(), table.row_count()))
        .collect();
    summary
}

/// Reads the workbook and applies every rule, without writing anything.
///
/// The MasterBOM and Status processors run concurrently; the date dimension
/// is built once both have finished.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %input.display(), master = master_sheet, status = status_sheet)
)]
pub fn transform(
    input: &Path,
    master_sheet: &str,
    status_sheet: &str,
    config: &PipelineConfig,
) -> Result<TransformOutput> {
    let started = Instant::now();
    config.validate()?;
    let detection = DateDetection::from_config(&config.dates)?;

    let (master_raw, status_raw) =
        excel_read::read_sheets(input, master_sheet, status_sheet, &config.reader)?;

    let (masterbom, status) = rayon::join(
        || masterbom::process(&master_raw, &config.masterbom, &detection),
        || status::process(&status_raw, &config.status),
    );
    let masterbom = masterbom?;
    let status = status?;
    debug!(
        parts = masterbom.fact_parts.len(),
        status_rows = status.records.len(),
        "processors finished"
    );

    let mut tables = build_tables(&masterbom, &status);
    let dimension = {
        let refs: Vec<&Table> = tables.iter().collect();
        dates::build(&refs, &config.dates)
    };
    tables.extend(dimension_tables(&dimension));

    let mut summary = summarize(&masterbom, status.records.len(), &tables);
    summary.processing_time_seconds = started.elapsed().as_secs_f64();

    let mut warnings = masterbom.warnings;
    warnings.extend(status.warnings);
    info!(
        tables = tables.len(),
        parts = summary.total_parts,
        warnings = warnings.len(),
        "transform complete"
    );
    Ok(TransformOutput {
        tables,
        summary,
        warnings,
    })
}

/// Runs the full pipeline and persists every requested format.
///
/// Structural problems abort the run. A format that fails to write is
/// reported in [`RunReport::outputs`] while the others are still produced.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %request.input.display(), output = %request.output_dir.display())
)]
pub fn run(request: &RunRequest) -> Result<RunReport> {
    let started = Instant::now();
    let run_id = Uuid::new_v4();
    info!(%run_id, "run started");

    let transformed = transform(
        &request.input,
        &request.master_sheet,
        &request.status_sheet,
        &request.config,
    )?;
    let written = writer::write_all(
        &request.output_dir,
        &transformed.tables,
        &request.config.formats,
    )?;

    let mut writer_warnings = Warnings::new(Stage::Writer);
    for failure in written.failures() {
        if let Err(message) = &failure.result {
            writer_warnings.push(format!("format {}", failure.format), message.clone());
        }
    }
    let mut warnings = transformed.warnings;
    warnings.extend(writer_warnings.into_vec());

    let mut summary = transformed.summary;
    summary.processing_time_seconds = started.elapsed().as_secs_f64();
    let artifacts = written.artifacts();
    info!(
        %run_id,
        artifacts = artifacts.len(),
        seconds = summary.processing_time_seconds,
        "run finished"
    );

    Ok(RunReport {
        run_id,
        outputs: written.outputs,
        artifacts,
        summary,
        warnings,
    })
}
