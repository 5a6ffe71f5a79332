use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, EtlError>;

/// Error type covering the failures that abort a pipeline run.
///
/// Structural problems with the workbook are reported through dedicated
/// variants so callers can tell exactly which precondition failed. Row-level
/// data problems never surface here; they are recorded as [`RunWarning`]s.
#[derive(Debug, Error)]
pub enum EtlError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors raised while emitting delimited output.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors raised by the embedded relational store.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Errors raised while encoding columnar output.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Errors raised while assembling Arrow record batches.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The workbook does not contain a single worksheet.
    #[error("workbook {0} contains no sheets")]
    EmptyWorkbook(PathBuf),

    /// A requested sheet is absent from the workbook.
    #[error("sheet '{sheet}' not found (available: {})", available.join(", "))]
    SheetNotFound { sheet: String, available: Vec<String> },

    /// A requested sheet exists but holds no data.
    #[error("sheet '{0}' is empty")]
    EmptySheet(String),

    /// No row within the scan window looked like a header row.
    #[error(
        "no header row found in sheet '{sheet}' within the first {window} rows \
         (label threshold {threshold})"
    )]
    HeaderDetection {
        sheet: String,
        window: usize,
        threshold: f64,
    },

    /// The MasterBOM identifier column could not be located.
    #[error("identifier column '{expected}' not found in sheet '{sheet}'")]
    MissingIdColumn { expected: String, sheet: String },

    /// Raised when the configuration is internally inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl EtlError {
    /// Returns `true` for errors describing a malformed workbook rather than
    /// an environmental failure.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EtlError::EmptyWorkbook(_)
                | EtlError::SheetNotFound { .. }
                | EtlError::EmptySheet(_)
                | EtlError::HeaderDetection { .. }
                | EtlError::MissingIdColumn { .. }
        )
    }
}

/// Pipeline stage a warning was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MasterBom,
    Status,
    Writer,
}

/// A recovered, non-fatal data problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunWarning {
    pub stage: Stage,
    /// Row/column identifier locating the problem in the source.
    pub context: String,
    pub message: String,
}

/// Collects warnings for one stage and mirrors each one to the log.
#[derive(Debug)]
pub struct Warnings {
    stage: Stage,
    entries: Vec<RunWarning>,
}

impl Warnings {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, context: impl Into<String>, message: impl Into<String>) {
        let warning = RunWarning {
            stage: self.stage,
            context: context.into(),
            message: message.into(),
        };
        tracing::warn!(
            stage = ?warning.stage,
            context = %warning.context,
            "{}",
            warning.message
        );
        self.entries.push(warning);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<RunWarning> {
        self.entries
    }
}
