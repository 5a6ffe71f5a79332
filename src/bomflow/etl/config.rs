//! Run configuration.
//!
//! Every rule table the processors consult lives here as plain data. A
//! configuration value is built once per run and shared by reference, so two
//! runs with different rule sets never observe each other. All sections are
//! `#[serde(default)]`: a JSON file only needs to name what it overrides.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::bomflow::etl::error::{EtlError, Result};
use crate::bomflow::etl::model::StatusClass;

/// Identifier column of the MasterBOM sheet unless overridden.
pub const DEFAULT_ID_COLUMN: &str = "YAZAKI PN";

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub reader: ReaderConfig,
    pub dates: DateConfig,
    pub masterbom: MasterBomConfig,
    pub status: StatusConfig,
    pub formats: BTreeSet<OutputFormat>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reader: ReaderConfig::default(),
            dates: DateConfig::default(),
            masterbom: MasterBomConfig::default(),
            status: StatusConfig::default(),
            formats: OutputFormat::ALL.into_iter().collect(),
        }
    }
}

impl PipelineConfig {
    /// Loads a configuration file, filling unspecified values with defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EtlError::MissingInput(path.to_path_buf()));
        }
        let source = fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&source)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the processors cannot work with.
    pub fn validate(&self) -> Result<()> {
        check_fraction("reader.label_threshold", self.reader.label_threshold)?;
        check_fraction("dates.threshold", self.dates.threshold)?;
        if self.reader.scan_window == 0 {
            return Err(EtlError::InvalidConfig(
                "reader.scan_window must be at least 1".into(),
            ));
        }
        if self.dates.sample_size == 0 {
            return Err(EtlError::InvalidConfig(
                "dates.sample_size must be at least 1".into(),
            ));
        }
        if !(1..=12).contains(&self.dates.fiscal_year_end_month) {
            return Err(EtlError::InvalidConfig(format!(
                "dates.fiscal_year_end_month must be within 1..=12, got {}",
                self.dates.fiscal_year_end_month
            )));
        }
        for pattern in &self.dates.exclude_patterns {
            compile_pattern(pattern)?;
        }
        if let PlantColumnStrategy::Pattern { pattern, .. } = &self.masterbom.plant_columns {
            compile_pattern(pattern)?;
        }
        if self.masterbom.id_column.trim().is_empty() {
            return Err(EtlError::InvalidConfig(
                "masterbom.id_column must not be blank".into(),
            ));
        }
        if self.masterbom.tie_breakers.is_empty() {
            return Err(EtlError::InvalidConfig(
                "masterbom.tie_breakers must name at least one rule".into(),
            ));
        }
        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(EtlError::InvalidConfig(format!(
            "{name} must be within (0, 1], got {value}"
        )))
    }
}

/// Compiles a case-insensitive pattern from configuration.
pub fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?i){pattern}"))
        .map_err(|err| EtlError::InvalidConfig(format!("invalid pattern '{pattern}': {err}")))
}

/// Header detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Minimum share of label-like cells for a row to count as the header.
    pub label_threshold: f64,
    /// Number of leading rows searched for the header.
    pub scan_window: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            label_threshold: 0.6,
            scan_window: 10,
        }
    }
}

/// Date detection and dimension settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateConfig {
    /// Minimum share of parseable values for a column to be a date column.
    pub threshold: f64,
    /// Number of non-null values sampled per column.
    pub sample_size: usize,
    /// Header patterns that never denote date columns.
    pub exclude_patterns: Vec<String>,
    /// Fill every day between the first and last observed date.
    pub contiguous_calendar: bool,
    pub fiscal_year_end_month: u32,
}

impl Default for DateConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            sample_size: 200,
            exclude_patterns: vec![
                r"supplier.*pn".into(),
                r"pn$".into(),
                r"id$".into(),
                r"code$".into(),
                r"number$".into(),
            ],
            contiguous_calendar: false,
            fiscal_year_end_month: 12,
        }
    }
}

/// MasterBOM business rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterBomConfig {
    pub id_column: String,
    /// Explicit date columns; bypasses auto-detection when set.
    pub date_columns: Option<Vec<String>>,
    /// Columns removed from the auto-detected date set.
    pub excluded_date_columns: Vec<String>,
    pub status_rules: Vec<StatusRule>,
    /// Class assigned when no status rule matches.
    pub default_class: StatusClass,
    pub plant_columns: PlantColumnStrategy,
    pub supplier_column: String,
    pub description_column: String,
    pub quality_columns: QualityColumns,
    /// Ordered duplicate tie-breakers, applied until one picks a winner.
    pub tie_breakers: Vec<TieBreaker>,
    /// Date roles aggregated with the earliest rather than latest value.
    pub earliest_date_patterns: Vec<String>,
}

impl Default for MasterBomConfig {
    fn default() -> Self {
        Self {
            id_column: DEFAULT_ID_COLUMN.to_string(),
            date_columns: None,
            excluded_date_columns: Vec::new(),
            status_rules: default_status_rules(),
            default_class: StatusClass::Unknown,
            plant_columns: PlantColumnStrategy::default(),
            supplier_column: "Supplier Name".into(),
            description_column: "Item Description".into(),
            quality_columns: QualityColumns::default(),
            tie_breakers: vec![
                TieBreaker::SupplierTag {
                    tags: vec!["MA".into(), "MAROC".into(), "MOROCCO".into()],
                },
                TieBreaker::SourceOrder,
            ],
            earliest_date_patterns: vec!["promised".into()],
        }
    }
}

/// How a raw status is compared against a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Contains,
    /// Whole words of the status, so `ok` does not match `booked`.
    Word,
}

/// One entry of the status rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRule {
    pub pattern: String,
    #[serde(rename = "match")]
    pub kind: MatchKind,
    pub class: StatusClass,
}

impl StatusRule {
    pub fn exact(pattern: &str, class: StatusClass) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: MatchKind::Exact,
            class,
        }
    }

    pub fn contains(pattern: &str, class: StatusClass) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: MatchKind::Contains,
            class,
        }
    }

    pub fn word(pattern: &str, class: StatusClass) -> Self {
        Self {
            pattern: pattern.to_string(),
            kind: MatchKind::Word,
            class,
        }
    }
}

fn default_status_rules() -> Vec<StatusRule> {
    use StatusClass::*;
    vec![
        StatusRule::exact("x", Active),
        StatusRule::exact("d", Inactive),
        StatusRule::exact("0", Duplicate),
        StatusRule::exact("n", New),
        StatusRule::contains("inactive", Inactive),
        StatusRule::contains("obsolete", Inactive),
        StatusRule::contains("discontinued", Inactive),
        StatusRule::contains("deleted", Inactive),
        StatusRule::contains("nok", Inactive),
        StatusRule::contains("not ok", Inactive),
        StatusRule::contains("duplicate", Duplicate),
        StatusRule::contains("new", New),
        StatusRule::contains("active", Active),
        StatusRule::word("ok", Active),
    ]
}

/// Strategy deciding which MasterBOM columns are plant columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PlantColumnStrategy {
    /// Headers matching a plant-code pattern, minus known attribute names.
    Pattern {
        pattern: String,
        attribute_names: Vec<String>,
    },
    /// Exactly the listed headers.
    Explicit { labels: Vec<String> },
}

impl Default for PlantColumnStrategy {
    fn default() -> Self {
        PlantColumnStrategy::Pattern {
            pattern: r"^[A-Z0-9]{1,10}(?:[-_ ./][A-Z0-9]{1,10})?$".into(),
            attribute_names: vec![
                "PSW".into(),
                "PSW Type".into(),
                "PSW Sub Type".into(),
                "FAR Status".into(),
                "YPN Status".into(),
                "Supplier PN".into(),
                "Handling Manual".into(),
                "PPAP Details".into(),
            ],
        }
    }
}

/// Column names feeding the part quality flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityColumns {
    pub psw: String,
    pub far: String,
    pub imds: String,
    pub handling_manual: String,
}

impl Default for QualityColumns {
    fn default() -> Self {
        Self {
            psw: "PSW".into(),
            far: "FAR Status".into(),
            imds: "IMDS STATUS".into(),
            handling_manual: "Handling Manual".into(),
        }
    }
}

/// A duplicate resolution rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TieBreaker {
    /// Prefer entries whose supplier names one of the tags as a whole word.
    SupplierTag { tags: Vec<String> },
    /// Prefer the entry that appears first in the sheet.
    SourceOrder,
}

impl TieBreaker {
    pub fn name(&self) -> &'static str {
        match self {
            TieBreaker::SupplierTag { .. } => "supplier_tag",
            TieBreaker::SourceOrder => "source_order",
        }
    }
}

/// Status sheet rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub header_map: Vec<HeaderMapping>,
    pub thresholds: CompletionThresholds,
    /// Stop reading at the first fully blank row that follows data.
    pub truncate_at_blank_row: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            header_map: default_header_map(),
            thresholds: CompletionThresholds::default(),
            truncate_at_blank_row: true,
        }
    }
}

/// Canonical Status sheet fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusField {
    PlantId,
    Oem,
    Sqe,
    MilestoneDate,
    TotalParts,
    PswAvailable,
    PswCompletionPct,
    DrawingAvailable,
    DrawingCompletionPct,
    ImdsTotal,
    ImdsCompletionPct,
    M2Parts,
    M2PartsPswOk,
    CompletionStatus,
    BomFileDate,
}

impl StatusField {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusField::PlantId => "plant_id",
            StatusField::Oem => "oem",
            StatusField::Sqe => "sqe",
            StatusField::MilestoneDate => "milestone_date",
            StatusField::TotalParts => "total_parts",
            StatusField::PswAvailable => "psw_available",
            StatusField::PswCompletionPct => "psw_completion_pct",
            StatusField::DrawingAvailable => "drawing_available",
            StatusField::DrawingCompletionPct => "drawing_completion_pct",
            StatusField::ImdsTotal => "imds_total",
            StatusField::ImdsCompletionPct => "imds_completion_pct",
            StatusField::M2Parts => "m2_parts",
            StatusField::M2PartsPswOk => "m2_parts_psw_ok",
            StatusField::CompletionStatus => "completion_status",
            StatusField::BomFileDate => "bom_file_date",
        }
    }
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a normalized (lowercased, trimmed) header to a canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderMapping {
    pub header: String,
    pub field: StatusField,
}

fn default_header_map() -> Vec<HeaderMapping> {
    use StatusField::*;
    [
        ("project", PlantId),
        ("oem", Oem),
        ("managed by", Sqe),
        ("1st ppap milestone", MilestoneDate),
        ("total part numbers", TotalParts),
        ("psw available", PswAvailable),
        ("% psw", PswCompletionPct),
        ("drawing available", DrawingAvailable),
        ("% drawing", DrawingCompletionPct),
        ("imds", ImdsTotal),
        ("% imds", ImdsCompletionPct),
        ("m2 parts", M2Parts),
        ("m2 parts psw ok", M2PartsPswOk),
        ("project status", CompletionStatus),
        ("bom file date", BomFileDate),
    ]
    .into_iter()
    .map(|(header, field)| HeaderMapping {
        header: header.to_string(),
        field,
    })
    .collect()
}

/// One completion level; reached when the value is at least (or above) `min`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionLevel {
    pub min: f64,
    pub inclusive: bool,
    pub label: String,
}

/// Ordered completion levels used to recompute `completion_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionThresholds {
    pub levels: Vec<CompletionLevel>,
    /// Label when no level is reached.
    pub otherwise: String,
    /// Label when there is no completion data at all.
    pub unknown: String,
}

impl Default for CompletionThresholds {
    fn default() -> Self {
        Self {
            levels: vec![
                CompletionLevel {
                    min: 1.0,
                    inclusive: true,
                    label: "Complete".into(),
                },
                CompletionLevel {
                    min: 0.0,
                    inclusive: false,
                    label: "In Progress".into(),
                },
            ],
            otherwise: "Not Started".into(),
            unknown: "Unknown".into(),
        }
    }
}

impl CompletionThresholds {
    pub fn classify(&self, completion: Option<f64>) -> &str {
        let Some(value) = completion else {
            return &self.unknown;
        };
        self.levels
            .iter()
            .find(|level| {
                if level.inclusive {
                    value >= level.min
                } else {
                    value > level.min
                }
            })
            .map(|level| level.label.as_str())
            .unwrap_or(&self.otherwise)
    }
}

/// Output formats the writer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Csv,
    Parquet,
    Sqlite,
    Xlsx,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Csv,
        OutputFormat::Parquet,
        OutputFormat::Sqlite,
        OutputFormat::Xlsx,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
            OutputFormat::Sqlite => "sqlite",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
