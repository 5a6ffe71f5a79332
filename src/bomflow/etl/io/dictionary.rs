//! Data dictionary describing every table a run produced.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::io::ArtifactInfo;
use crate::bomflow::etl::model::{CellValue, ColumnType, Table};

/// Number of distinct sample values listed per column.
pub const SAMPLE_LIMIT: usize = 5;

pub const MARKDOWN_FILE: &str = "data_dictionary.md";
pub const JSON_FILE: &str = "data_dictionary.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataDictionary {
    pub tables: Vec<TableProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableProfile {
    pub name: String,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnType,
    pub null_count: usize,
    pub distinct_count: usize,
    pub samples: Vec<String>,
    pub description: String,
}

fn describe(column: &str, kind: ColumnType) -> String {
    let known = match column {
        "part_id_std" => Some("Standardized part identifier"),
        "part_id_raw" => Some("Part identifier as entered in the MasterBOM"),
        "plant_id" | "project_plant" => Some("Plant or project code"),
        "raw_status" => Some("Status text as entered in the MasterBOM"),
        "status_class" => Some("Classified status: active, inactive, new, duplicate or unknown"),
        "is_duplicate_entry" => Some("Row was superseded by another entry for the same part and plant"),
        "is_new" => Some("Part is newly introduced at this plant"),
        "source_row" => Some("Worksheet row the value was read from"),
        "notes" => Some("Processing notes"),
        "supplier" | "supplier_name" => Some("Supplier name"),
        "description" | "item_description" => Some("Part description"),
        "n_active" => Some("Plants where the part is active"),
        "n_inactive" => Some("Plants where the part is inactive"),
        "n_new" => Some("Plants where the part is new"),
        "n_duplicate" => Some("Superseded duplicate entries"),
        "n_unknown" => Some("Plants with an unrecognized status"),
        "total_plants" => Some("Plants referencing the part"),
        "psw_ok" => Some("A PSW status is recorded and not negative"),
        "far_ok" => Some("FAR status is OK"),
        "imds_ok" => Some("IMDS submission confirmed"),
        "has_handling_manual" => Some("A handling manual is recorded"),
        "completion_status" => Some("Completion bucket derived from overall completion"),
        "overall_completion_pct" => Some("Mean of the available completion ratios"),
        "date" => Some("Calendar date"),
        "date_key" => Some("Date as YYYYMMDD integer"),
        "fiscal_year" => Some("Fiscal year the date falls in"),
        "table_name" => Some("Table holding the date column"),
        "role" => Some("Date column acting as a role"),
        "distinct_dates" => Some("Distinct dates observed in the role"),
        _ => None,
    };
    if let Some(text) = known {
        return text.to_string();
    }
    if column.ends_with("_pct") {
        return "Completion ratio between 0 and 1".to_string();
    }
    if let Some(role) = column.strip_prefix("earliest_") {
        return format!("Earliest {} across plants", role.replace('_', " "));
    }
    if let Some(role) = column.strip_prefix("latest_") {
        return format!("Latest {} across plants", role.replace('_', " "));
    }
    match kind {
        ColumnType::Date => "Date value".to_string(),
        _ => "Source column".to_string(),
    }
}

fn profile_column(table: &Table, index: usize) -> ColumnProfile {
    let column = &table.columns[index];
    let mut null_count = 0;
    let mut distinct = BTreeSet::new();
    let mut samples = Vec::new();
    for cell in table.column_values(index) {
        if matches!(cell, CellValue::Null) {
            null_count += 1;
            continue;
        }
        let rendered = cell.to_string();
        if distinct.insert(rendered.clone()) && samples.len() < SAMPLE_LIMIT {
            samples.push(rendered);
        }
    }
    ColumnProfile {
        name: column.name.clone(),
        kind: column.kind,
        null_count,
        distinct_count: distinct.len(),
        samples,
        description: describe(&column.name, column.kind),
    }
}

/// Profiles every column of every table.
pub fn build(tables: &[Table]) -> DataDictionary {
    DataDictionary {
        tables: tables
            .iter()
            .map(|table| TableProfile {
                name: table.name.clone(),
                row_count: table.row_count(),
                columns: (0..table.columns.len())
                    .map(|index| profile_column(table, index))
                    .collect(),
            })
            .collect(),
    }
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

/// Renders the dictionary as Markdown, one section per table.
pub fn to_markdown(dictionary: &DataDictionary) -> String {
    let mut out = String::from("# Data Dictionary\n");
    for table in &dictionary.tables {
        let _ = write!(out, "\n## {}\n\nRows: {}\n\n", table.name, table.row_count);
        out.push_str("| Column | Type | Nulls | Distinct | Samples | Description |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for column in &table.columns {
            let samples: Vec<String> = column.samples.iter().map(|s| escape_cell(s)).collect();
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} | {} |",
                escape_cell(&column.name),
                column.kind,
                column.null_count,
                column.distinct_count,
                samples.join(", "),
                escape_cell(&column.description),
            );
        }
    }
    out
}

/// Writes `data_dictionary.md` and `data_dictionary.json` into `dir`.
pub fn write_dictionary(dir: &Path, tables: &[Table]) -> Result<Vec<ArtifactInfo>> {
    let dictionary = build(tables);
    let markdown_path = dir.join(MARKDOWN_FILE);
    fs::write(&markdown_path, to_markdown(&dictionary))?;
    let json_path = dir.join(JSON_FILE);
    fs::write(&json_path, serde_json::to_string_pretty(&dictionary)?)?;
    debug!(tables = dictionary.tables.len(), "data dictionary written");

    let rows = tables.len();
    Ok(vec![
        ArtifactInfo::for_file("data_dictionary", "markdown", &markdown_path, rows)?,
        ArtifactInfo::for_file("data_dictionary", "json", &json_path, rows)?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bomflow::etl::model::Column;

    fn table() -> Table {
        let mut table = Table::new(
            "fact_parts",
            vec![
                Column::new("part_id_std", ColumnType::Text),
                Column::new("earliest_promised_date", ColumnType::Date),
            ],
        );
        for id in ["A", "B", "C", "D", "E", "F", "A"] {
            table.push_row(vec![CellValue::Text(id.into()), CellValue::Null]);
        }
        table
    }

    #[test]
    fn profiles_nulls_distinct_values_and_samples() {
        let dictionary = build(&[table()]);
        let profile = &dictionary.tables[0];
        assert_eq!(profile.row_count, 7);
        let id = &profile.columns[0];
        assert_eq!(id.null_count, 0);
        assert_eq!(id.distinct_count, 6);
        assert_eq!(id.samples, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(id.description, "Standardized part identifier");
        let date = &profile.columns[1];
        assert_eq!(date.null_count, 7);
        assert!(date.samples.is_empty());
        assert_eq!(date.description, "Earliest promised date across plants");
    }

    #[test]
    fn markdown_has_a_section_per_table() {
        let markdown = to_markdown(&build(&[table()]));
        assert!(markdown.contains("## fact_parts"));
        assert!(markdown.contains("Rows: 7"));
        assert!(markdown.contains("| part_id_std | text | 0 | 6 | A, B, C, D, E |"));
    }
}
