//! File adapters: the workbook reader and one writer per output format.

pub mod csv_write;
pub mod dictionary;
pub mod excel_read;
pub mod excel_write;
pub mod parquet_write;
pub mod sqlite_write;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::bomflow::etl::error::Result;

/// Metadata about one file produced by a writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub table: String,
    pub format: String,
    pub path: PathBuf,
    pub row_count: usize,
    pub size_bytes: u64,
}

impl ArtifactInfo {
    /// Describes a file that has been written and closed.
    pub fn for_file(table: &str, format: &str, path: &Path, row_count: usize) -> Result<Self> {
        Ok(Self {
            table: table.to_string(),
            format: format.to_string(),
            path: path.to_path_buf(),
            row_count,
            size_bytes: fs::metadata(path)?.len(),
        })
    }
}
