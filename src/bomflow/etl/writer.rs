//! Fans the final tables out to every requested format.
//!
//! Each format writes to its own paths and reports its own outcome, so one
//! failing format never prevents the others from being produced.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::bomflow::etl::config::OutputFormat;
use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::io::{
    ArtifactInfo, csv_write, dictionary, excel_write, parquet_write, sqlite_write,
};
use crate::bomflow::etl::model::Table;

/// Result of producing one output format.
#[derive(Debug, Clone, Serialize)]
pub struct FormatOutcome {
    pub format: String,
    pub result: std::result::Result<Vec<ArtifactInfo>, String>,
}

impl FormatOutcome {
    fn new(format: &str, result: Result<Vec<ArtifactInfo>>) -> Self {
        let result = result.map_err(|err| err.to_string());
        match &result {
            Ok(artifacts) => info!(format, files = artifacts.len(), "format written"),
            Err(message) => warn!(format, error = %message, "format failed"),
        }
        Self {
            format: format.to_string(),
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn artifacts(&self) -> &[ArtifactInfo] {
        match &self.result {
            Ok(artifacts) => artifacts,
            Err(_) => &[],
        }
    }
}

/// Outcome of every format plus the data dictionary.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub outputs: Vec<FormatOutcome>,
}

impl WriteReport {
    pub fn artifacts(&self) -> Vec<ArtifactInfo> {
        self.outputs
            .iter()
            .flat_map(|outcome| outcome.artifacts().iter().cloned())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FormatOutcome> {
        self.outputs.iter().filter(|outcome| !outcome.is_ok())
    }
}

fn write_format(format: OutputFormat, dir: &Path, tables: &[Table]) -> Result<Vec<ArtifactInfo>> {
    match format {
        OutputFormat::Csv => csv_write::write_tables(dir, tables),
        OutputFormat::Parquet => parquet_write::write_tables(dir, tables),
        OutputFormat::Sqlite => sqlite_write::write_tables(dir, tables),
        OutputFormat::Xlsx => excel_write::write_tables(dir, tables),
    }
}

/// Writes `tables` into `dir` in every requested format concurrently,
/// followed by the data dictionary.
///
/// Only failing to create `dir` itself is fatal.
#[instrument(
    level = "info",
    skip_all,
    fields(dir = %dir.display(), tables = tables.len(), formats = formats.len())
)]
pub fn write_all(
    dir: &Path,
    tables: &[Table],
    formats: &BTreeSet<OutputFormat>,
) -> Result<WriteReport> {
    fs::create_dir_all(dir)?;

    let requested: Vec<OutputFormat> = formats.iter().copied().collect();
    let mut outputs: Vec<FormatOutcome> = requested
        .par_iter()
        .map(|format| FormatOutcome::new(format.as_str(), write_format(*format, dir, tables)))
        .collect();
    outputs.push(FormatOutcome::new(
        "dictionary",
        dictionary::write_dictionary(dir, tables),
    ));

    Ok(WriteReport { outputs })
}
