use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Classification of a part's raw status within one plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Active,
    Inactive,
    New,
    Duplicate,
    /// The raw status matched no rule.
    Unknown,
}

impl StatusClass {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusClass::Active => "active",
            StatusClass::Inactive => "inactive",
            StatusClass::New => "new",
            StatusClass::Duplicate => "duplicate",
            StatusClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Automotive approval flags carried for every part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityFlags {
    pub psw_ok: bool,
    pub far_ok: bool,
    pub imds_ok: bool,
    pub has_handling_manual: bool,
}

impl QualityFlags {
    /// "Best observed" reduction: a flag holds if it holds in either input.
    pub fn merge(self, other: QualityFlags) -> QualityFlags {
        QualityFlags {
            psw_ok: self.psw_ok || other.psw_ok,
            far_ok: self.far_ok || other.far_ok,
            imds_ok: self.imds_ok || other.imds_ok,
            has_handling_manual: self.has_handling_manual || other.has_handling_manual,
        }
    }
}

/// One MasterBOM row after identifier cleaning.
#[derive(Debug, Clone, PartialEq)]
pub struct PartRecord {
    /// Worksheet row the record was read from.
    pub source_row: usize,
    pub part_id_raw: String,
    pub part_id_std: String,
    pub description: Option<String>,
    pub supplier: Option<String>,
    pub flags: QualityFlags,
    /// Parsed date attributes, aligned with the processor's date roles.
    pub dates: Vec<Option<NaiveDate>>,
    /// The row repeats an earlier row cell for cell.
    pub is_duplicate_entry: bool,
}

/// Long-format status of one part in one plant column.
#[derive(Debug, Clone, PartialEq)]
pub struct PlantItemStatus {
    pub part_id_std: String,
    pub part_id_raw: String,
    pub source_row: usize,
    pub project_plant: String,
    pub raw_status: String,
    pub status_class: StatusClass,
    pub is_duplicate_entry: bool,
    pub is_new: bool,
    pub notes: Option<String>,
}

/// Per-part aggregate over all plants.
#[derive(Debug, Clone, PartialEq)]
pub struct FactPart {
    pub part_id_std: String,
    pub part_id_raw: String,
    pub description: Option<String>,
    pub supplier: Option<String>,
    pub n_active: usize,
    pub n_inactive: usize,
    pub n_new: usize,
    pub n_duplicate: usize,
    pub n_unknown: usize,
    pub total_plants: usize,
    pub flags: QualityFlags,
    /// Aggregated dates, aligned with the processor's fact date columns.
    pub dates: Vec<Option<NaiveDate>>,
}

/// One Status sheet entry mapped onto the canonical schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusRecord {
    pub source_row: usize,
    pub plant_id: Option<String>,
    pub oem: Option<String>,
    pub sqe: Option<String>,
    pub milestone_date: Option<NaiveDate>,
    pub total_parts: Option<i64>,
    pub psw_available: Option<i64>,
    pub psw_completion_pct: Option<f64>,
    pub drawing_available: Option<i64>,
    pub drawing_completion_pct: Option<f64>,
    pub imds_total: Option<i64>,
    pub imds_completion_pct: Option<f64>,
    pub m2_parts: Option<i64>,
    pub m2_parts_psw_ok: Option<i64>,
    pub ppap_completion_pct: Option<f64>,
    pub overall_completion_pct: Option<f64>,
    /// Status text as written in the source sheet.
    pub completion_status: Option<String>,
    pub bom_file_date: Option<NaiveDate>,
}

/// Status records grouped by plant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectCompletion {
    pub plant_id: String,
    pub oem: Option<String>,
    pub entry_count: usize,
    pub total_parts: Option<i64>,
    pub psw_completion_pct: Option<f64>,
    pub drawing_completion_pct: Option<f64>,
    pub imds_completion_pct: Option<f64>,
    pub ppap_completion_pct: Option<f64>,
    pub overall_completion_pct: Option<f64>,
    pub milestone_date: Option<NaiveDate>,
    /// Recomputed from `overall_completion_pct`.
    pub completion_status: String,
}

/// Calendar attributes of one date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateDimensionRow {
    pub date: NaiveDate,
    pub date_key: i64,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub month_year: String,
    pub month_year_sort: i64,
    pub day: u32,
    pub quarter: u32,
    pub iso_week: u32,
    pub weekday: String,
    pub is_weekend: bool,
    pub is_month_end: bool,
    pub is_quarter_end: bool,
    pub is_year_end: bool,
    pub fiscal_year: i32,
}

/// Links a date-valued column of a table to the date dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRoleBridgeRow {
    pub table_name: String,
    pub role: String,
    pub distinct_dates: usize,
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
}
