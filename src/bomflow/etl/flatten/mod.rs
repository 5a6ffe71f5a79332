use std::collections::HashSet;

use crate::bomflow::etl::dates::DateDimension;
use crate::bomflow::etl::masterbom::{DateRole, MasterBomOutput};
use crate::bomflow::etl::model::{
    CellValue, Column, ColumnType, DateDimensionRow, DateRoleBridgeRow, FactPart, PlantItemStatus,
    ProjectCompletion, StatusRecord, Table,
};
use crate::bomflow::etl::status::StatusOutput;

pub use crate::bomflow::etl::masterbom::MASTERBOM_CLEAN_TABLE;
/// Long-format part status per plant.
pub const PLANT_ITEM_STATUS_TABLE: &str = "plant_item_status";
/// One row per standardized part.
pub const FACT_PARTS_TABLE: &str = "fact_parts";
/// Status sheet on the canonical schema.
pub const STATUS_CLEAN_TABLE: &str = "status_clean";
/// Status rolled up per plant.
pub const PROJECT_COMPLETION_TABLE: &str = "project_completion_by_plant";
/// Calendar dimension.
pub const DIM_DATES_TABLE: &str = "dim_dates";
/// Date column roles per table.
pub const DATE_ROLE_BRIDGE_TABLE: &str = "date_role_bridge";

fn columns(spec: &[(&str, ColumnType)]) -> Vec<Column> {
    spec.iter()
        .map(|(name, kind)| Column::new(*name, *kind))
        .collect()
}

fn count(value: usize) -> CellValue {
    CellValue::Int(value as i64)
}

/// Flattens the processor outputs into the tables handed to the writer,
/// excluding the date dimension.
pub fn build_tables(masterbom: &MasterBomOutput, status: &StatusOutput) -> Vec<Table> {
    vec![
        masterbom.clean.clone(),
        plant_item_status_table(&masterbom.plant_item_status),
        fact_parts_table(&masterbom.fact_parts, &masterbom.date_roles),
        status_clean_table(&status.records),
        project_completion_table(&status.completion),
    ]
}

/// Flattens the date dimension and its role bridge.
pub fn dimension_tables(dimension: &DateDimension) -> Vec<Table> {
    vec![
        dim_dates_table(&dimension.rows),
        date_role_bridge_table(&dimension.bridge),
    ]
}

pub fn plant_item_status_table(entries: &[PlantItemStatus]) -> Table {
    use ColumnType::*;
    let mut table = Table::new(
        PLANT_ITEM_STATUS_TABLE,
        columns(&[
            ("part_id_std", Text),
            ("part_id_raw", Text),
            ("source_row", Integer),
            ("project_plant", Text),
            ("raw_status", Text),
            ("status_class", Text),
            ("is_duplicate_entry", Boolean),
            ("is_new", Boolean),
            ("notes", Text),
        ]),
    );
    for entry in entries {
        table.push_row(vec![
            CellValue::Text(entry.part_id_std.clone()),
            CellValue::text(entry.part_id_raw.clone()),
            count(entry.source_row),
            CellValue::text(entry.project_plant.clone()),
            CellValue::text(entry.raw_status.clone()),
            CellValue::Text(entry.status_class.to_string()),
            CellValue::Bool(entry.is_duplicate_entry),
            CellValue::Bool(entry.is_new),
            CellValue::from(entry.notes.clone()),
        ]);
    }
    table
}

pub fn fact_parts_table(parts: &[FactPart], date_roles: &[DateRole]) -> Table {
    use ColumnType::*;
    let mut spec = columns(&[
        ("part_id_std", Text),
        ("part_id_raw", Text),
        ("description", Text),
        ("supplier", Text),
        ("n_active", Integer),
        ("n_inactive", Integer),
        ("n_new", Integer),
        ("n_duplicate", Integer),
        ("n_unknown", Integer),
        ("total_plants", Integer),
        ("psw_ok", Boolean),
        ("far_ok", Boolean),
        ("imds_ok", Boolean),
        ("has_handling_manual", Boolean),
    ]);
    let mut used: HashSet<String> = spec.iter().map(|column| column.name.clone()).collect();
    for role in date_roles {
        let mut name = role.fact_column();
        let mut suffix = 1;
        while used.contains(&name) {
            name = format!("{}_{suffix}", role.fact_column());
            suffix += 1;
        }
        used.insert(name.clone());
        spec.push(Column::new(name, Date));
    }

    let mut table = Table::new(FACT_PARTS_TABLE, spec);
    for part in parts {
        let mut row = vec![
            CellValue::Text(part.part_id_std.clone()),
            CellValue::text(part.part_id_raw.clone()),
            CellValue::from(part.description.clone()),
            CellValue::from(part.supplier.clone()),
            count(part.n_active),
            count(part.n_inactive),
            count(part.n_new),
            count(part.n_duplicate),
            count(part.n_unknown),
            count(part.total_plants),
            CellValue::Bool(part.flags.psw_ok),
            CellValue::Bool(part.flags.far_ok),
            CellValue::Bool(part.flags.imds_ok),
            CellValue::Bool(part.flags.has_handling_manual),
        ];
        row.extend(part.dates.iter().map(|date| CellValue::from(*date)));
        table.push_row(row);
    }
    table
}

pub fn status_clean_table(records: &[StatusRecord]) -> Table {
    use ColumnType::*;
    let mut table = Table::new(
        STATUS_CLEAN_TABLE,
        columns(&[
            ("source_row", Integer),
            ("plant_id", Text),
            ("oem", Text),
            ("sqe", Text),
            ("milestone_date", Date),
            ("total_parts", Integer),
            ("psw_available", Integer),
            ("psw_completion_pct", Float),
            ("drawing_available", Integer),
            ("drawing_completion_pct", Float),
            ("imds_total", Integer),
            ("imds_completion_pct", Float),
            ("m2_parts", Integer),
            ("m2_parts_psw_ok", Integer),
            ("ppap_completion_pct", Float),
            ("overall_completion_pct", Float),
            ("completion_status", Text),
            ("bom_file_date", Date),
        ]),
    );
    for record in records {
        table.push_row(vec![
            count(record.source_row),
            CellValue::from(record.plant_id.clone()),
            CellValue::from(record.oem.clone()),
            CellValue::from(record.sqe.clone()),
            CellValue::from(record.milestone_date),
            CellValue::from(record.total_parts),
            CellValue::from(record.psw_available),
            CellValue::from(record.psw_completion_pct),
            CellValue::from(record.drawing_available),
            CellValue::from(record.drawing_completion_pct),
            CellValue::from(record.imds_total),
            CellValue::from(record.imds_completion_pct),
            CellValue::from(record.m2_parts),
            CellValue::from(record.m2_parts_psw_ok),
            CellValue::from(record.ppap_completion_pct),
            CellValue::from(record.overall_completion_pct),
            CellValue::from(record.completion_status.clone()),
            CellValue::from(record.bom_file_date),
        ]);
    }
    table
}

pub fn project_completion_table(rows: &[ProjectCompletion]) -> Table {
    use ColumnType::*;
    let mut table = Table::new(
        PROJECT_COMPLETION_TABLE,
        columns(&[
            ("plant_id", Text),
            ("oem", Text),
            ("entry_count", Integer),
            ("total_parts", Integer),
            ("psw_completion_pct", Float),
            ("drawing_completion_pct", Float),
            ("imds_completion_pct", Float),
            ("ppap_completion_pct", Float),
            ("overall_completion_pct", Float),
            ("milestone_date", Date),
            ("completion_status", Text),
        ]),
    );
    for row in rows {
        table.push_row(vec![
            CellValue::Text(row.plant_id.clone()),
            CellValue::from(row.oem.clone()),
            count(row.entry_count),
            CellValue::from(row.total_parts),
            CellValue::from(row.psw_completion_pct),
            CellValue::from(row.drawing_completion_pct),
            CellValue::from(row.imds_completion_pct),
            CellValue::from(row.ppap_completion_pct),
            CellValue::from(row.overall_completion_pct),
            CellValue::from(row.milestone_date),
            CellValue::Text(row.completion_status.clone()),
        ]);
    }
    table
}

pub fn dim_dates_table(rows: &[DateDimensionRow]) -> Table {
    use ColumnType::*;
    let mut table = Table::new(
        DIM_DATES_TABLE,
        columns(&[
            ("date", Date),
            ("date_key", Integer),
            ("year", Integer),
            ("month", Integer),
            ("month_name", Text),
            ("month_year", Text),
            ("month_year_sort", Integer),
            ("day", Integer),
            ("quarter", Integer),
            ("iso_week", Integer),
            ("weekday", Text),
            ("is_weekend", Boolean),
            ("is_month_end", Boolean),
            ("is_quarter_end", Boolean),
            ("is_year_end", Boolean),
            ("fiscal_year", Integer),
        ]),
    );
    for row in rows {
        table.push_row(vec![
            CellValue::Date(row.date),
            CellValue::Int(row.date_key),
            CellValue::Int(i64::from(row.year)),
            CellValue::Int(i64::from(row.month)),
            CellValue::Text(row.month_name.clone()),
            CellValue::Text(row.month_year.clone()),
            CellValue::Int(row.month_year_sort),
            CellValue::Int(i64::from(row.day)),
            CellValue::Int(i64::from(row.quarter)),
            CellValue::Int(i64::from(row.iso_week)),
            CellValue::Text(row.weekday.clone()),
            CellValue::Bool(row.is_weekend),
            CellValue::Bool(row.is_month_end),
            CellValue::Bool(row.is_quarter_end),
            CellValue::Bool(row.is_year_end),
            CellValue::Int(i64::from(row.fiscal_year)),
        ]);
    }
    table
}

pub fn date_role_bridge_table(rows: &[DateRoleBridgeRow]) -> Table {
    use ColumnType::*;
    let mut table = Table::new(
        DATE_ROLE_BRIDGE_TABLE,
        columns(&[
            ("table_name", Text),
            ("role", Text),
            ("distinct_dates", Integer),
            ("min_date", Date),
            ("max_date", Date),
        ]),
    );
    for row in rows {
        table.push_row(vec![
            CellValue::Text(row.table_name.clone()),
            CellValue::Text(row.role.clone()),
            count(row.distinct_dates),
            CellValue::Date(row.min_date),
            CellValue::Date(row.max_date),
        ]);
    }
    table
}

/// Hands out unique, Excel-safe worksheet names.
#[derive(Debug, Default)]
pub struct SheetNameRegistry {
    used: HashSet<String>,
}

impl SheetNameRegistry {
    pub fn assign(&mut self, raw: &str) -> String {
        let base = sanitize_sheet_name(raw);
        if self.used.insert(base.to_lowercase()) {
            return base;
        }

        let mut counter = 1;
        loop {
            let suffix = format!("_{counter}");
            let max_len = 31 - suffix.len();
            let prefix: String = base.chars().take(max_len).collect();
            let candidate = format!("{prefix}{suffix}");
            if self.used.insert(candidate.to_lowercase()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Replaces characters Excel rejects in sheet names and enforces the
/// 31 character limit.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']', '\'', '"'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() {
        return "Sheet".to_string();
    }
    sanitized.chars().take(31).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bomflow::etl::masterbom::DatePolicy;
    use crate::bomflow::etl::model::QualityFlags;

    #[test]
    fn long_table_names_are_truncated_uniquely() {
        let mut registry = SheetNameRegistry::default();
        let first = registry.assign("project_completion_by_plant_and_more");
        let second = registry.assign("project_completion_by_plant_and_more");
        assert_eq!(first.chars().count(), 31);
        assert_eq!(second.chars().count(), 31);
        assert!(second.ends_with("_1"));
        assert_ne!(first, second);
    }

    #[test]
    fn sanitizes_invalid_characters() {
        assert_eq!(sanitize_sheet_name("a/b:c"), "a_b_c");
        assert_eq!(sanitize_sheet_name("   "), "Sheet");
    }

    #[test]
    fn fact_table_appends_one_column_per_date_role() {
        let part = FactPart {
            part_id_std: "AB-1".into(),
            part_id_raw: "ab-1".into(),
            description: None,
            supplier: None,
            n_active: 1,
            n_inactive: 0,
            n_new: 0,
            n_duplicate: 0,
            n_unknown: 0,
            total_plants: 1,
            flags: QualityFlags::default(),
            dates: vec![None],
        };
        let role = DateRole {
            label: "Promised Date".into(),
            role: "promised_date".into(),
            policy: DatePolicy::Earliest,
        };
        let table = fact_parts_table(&[part], &[role]);
        let last = table.columns.last().unwrap();
        assert_eq!(last.name, "earliest_promised_date");
        assert_eq!(last.kind, ColumnType::Date);
        assert_eq!(table.rows[0].len(), table.columns.len());
    }
}
