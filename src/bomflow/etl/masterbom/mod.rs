//! MasterBOM business rules.
//!
//! A record moves through identifier cleaning, column classification,
//! unpivoting into plant statuses, status classification, duplicate
//! resolution and finally per-part aggregation.

pub mod classify;
pub mod columns;
pub mod dedupe;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::bomflow::etl::config::{MasterBomConfig, QualityColumns};
use crate::bomflow::etl::error::{Result, RunWarning, Stage, Warnings};
use crate::bomflow::etl::model::{
    CellValue, Column, ColumnType, FactPart, PartRecord, PlantItemStatus, QualityFlags, RawSheet,
    StatusClass, Table,
};
use crate::bomflow::etl::normalize::{DateDetection, clean_id_cell, normalize_header, standardize_text};

use self::classify::{Classification, StatusRules};
use self::columns::{ColumnLayout, classifier_from_config, identify_columns};
use self::dedupe::resolve_duplicates;

pub use self::columns::{ColumnClassifier, ColumnRole, ExplicitClassifier, PatternClassifier};

/// Name of the cleaned MasterBOM table.
pub const MASTERBOM_CLEAN_TABLE: &str = "masterbom_clean";

/// How a date role is reduced across a part's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePolicy {
    Earliest,
    Latest,
}

/// A MasterBOM date column and its aggregation policy.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRole {
    pub label: String,
    /// Snake-cased label, e.g. `approved_date`.
    pub role: String,
    pub policy: DatePolicy,
}

impl DateRole {
    /// Name of the aggregated column in the fact table.
    pub fn fact_column(&self) -> String {
        match self.policy {
            DatePolicy::Earliest => format!("earliest_{}", self.role),
            DatePolicy::Latest => format!("latest_{}", self.role),
        }
    }
}

/// Everything the MasterBOM processor produces.
#[derive(Debug, Clone)]
pub struct MasterBomOutput {
    pub clean: Table,
    pub records: Vec<PartRecord>,
    pub plant_item_status: Vec<PlantItemStatus>,
    pub fact_parts: Vec<FactPart>,
    pub date_roles: Vec<DateRole>,
    pub plants: Vec<String>,
    pub duplicates_removed: usize,
    pub warnings: Vec<RunWarning>,
}

/// Converts a header label into a snake-case role name.
pub fn role_name(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Applies the MasterBOM rules to a raw sheet.
#[instrument(level = "info", skip_all, fields(sheet = %sheet.name, rows = sheet.rows.len()))]
pub fn process(
    sheet: &RawSheet,
    config: &MasterBomConfig,
    detection: &DateDetection,
) -> Result<MasterBomOutput> {
    let mut warnings = Warnings::new(Stage::MasterBom);
    let classifier = classifier_from_config(&config.plant_columns)?;
    let layout = identify_columns(sheet, config, detection, classifier.as_ref(), &mut warnings)?;
    info!(
        id_column = %sheet.headers[layout.id],
        plant_columns = layout.plants.len(),
        date_columns = layout.dates.len(),
        attribute_columns = layout.attributes.len(),
        "columns identified"
    );

    let date_roles: Vec<DateRole> = layout
        .dates
        .iter()
        .map(|column| {
            let role = role_name(&column.name);
            let earliest = config
                .earliest_date_patterns
                .iter()
                .any(|pattern| role.contains(&role_name(pattern)));
            DateRole {
                label: column.name.clone(),
                role,
                policy: if earliest {
                    DatePolicy::Earliest
                } else {
                    DatePolicy::Latest
                },
            }
        })
        .collect();

    let quality = QualityLayout::resolve(sheet, &config.quality_columns);
    let supplier_column = find_column(sheet, &config.supplier_column);
    let description_column = find_column(sheet, &config.description_column);

    let mut records = Vec::new();
    let mut record_rows = Vec::new();
    let mut seen_rows: HashSet<Vec<String>> = HashSet::new();
    for (row_index, row) in sheet.rows.iter().enumerate() {
        let source_row = sheet.source_row_number(row_index);
        let id_cell = sheet.cell(row_index, layout.id);
        let part_id_std = clean_id_cell(id_cell);
        if part_id_std.is_empty() {
            warnings.push(
                format!("row {source_row}"),
                "blank part identifier; row skipped",
            );
            continue;
        }

        let fingerprint: Vec<String> = row.iter().map(CellValue::to_string).collect();
        let is_duplicate_entry = !seen_rows.insert(fingerprint);

        let dates = layout
            .dates
            .iter()
            .map(|column| {
                let cell = sheet.cell(row_index, column.index);
                let parsed = column.parse(cell);
                if parsed.is_none() && !cell.is_blank() {
                    warnings.push(
                        format!("row {source_row}, column '{}'", column.name),
                        format!("unparseable date '{cell}' set to null"),
                    );
                }
                parsed
            })
            .collect();

        records.push(PartRecord {
            source_row,
            part_id_raw: id_cell.to_text().unwrap_or_default(),
            part_id_std,
            description: description_column.and_then(|index| text_of(sheet.cell(row_index, index))),
            supplier: supplier_column.and_then(|index| text_of(sheet.cell(row_index, index))),
            flags: quality.flags(sheet, row_index),
            dates,
            is_duplicate_entry,
        });
        record_rows.push(row_index);
    }

    let rules = StatusRules::new(&config.status_rules, config.default_class);
    let mut unmatched: HashMap<String, usize> = HashMap::new();
    let mut plant_item_status = Vec::new();
    for (record, &row_index) in records.iter().zip(&record_rows) {
        for (column, plant) in &layout.plants {
            let Some(raw_status) = sheet.cell(row_index, *column).to_text() else {
                continue;
            };
            let status_class = match rules.classify(&raw_status) {
                Classification::Matched(class) => class,
                Classification::Fallback(class) => {
                    *unmatched.entry(raw_status.clone()).or_insert(0) += 1;
                    class
                }
            };
            plant_item_status.push(PlantItemStatus {
                part_id_std: record.part_id_std.clone(),
                part_id_raw: record.part_id_raw.clone(),
                source_row: record.source_row,
                project_plant: plant.clone(),
                raw_status,
                status_class,
                is_duplicate_entry: false,
                is_new: status_class == StatusClass::New,
                notes: None,
            });
        }
    }
    let mut unmatched: Vec<(String, usize)> = unmatched.into_iter().collect();
    unmatched.sort();
    for (raw, count) in unmatched {
        warnings.push(
            format!("status '{raw}'"),
            format!(
                "matched no status rule in {count} cell(s); classified as {}",
                config.default_class
            ),
        );
    }

    let suppliers: HashMap<usize, Option<String>> = records
        .iter()
        .map(|record| (record.source_row, record.supplier.clone()))
        .collect();
    let duplicates_removed = resolve_duplicates(
        &mut plant_item_status,
        &config.tie_breakers,
        &|entry: &PlantItemStatus| suppliers.get(&entry.source_row).cloned().flatten(),
    );
    debug!(
        entries = plant_item_status.len(),
        duplicates_removed, "plant statuses classified"
    );

    let fact_parts = aggregate(&records, &plant_item_status, &date_roles);
    let clean = build_clean_table(sheet, &layout, &records, &record_rows);

    info!(
        parts = fact_parts.len(),
        plant_status_rows = plant_item_status.len(),
        clean_rows = clean.row_count(),
        warnings = warnings.len(),
        "MasterBOM processed"
    );

    Ok(MasterBomOutput {
        clean,
        records,
        plant_item_status,
        fact_parts,
        date_roles,
        plants: layout.plants.iter().map(|(_, plant)| plant.clone()).collect(),
        duplicates_removed,
        warnings: warnings.into_vec(),
    })
}

fn text_of(cell: &CellValue) -> Option<String> {
    cell.to_text().map(|text| standardize_text(&text))
}

/// Finds a column by normalized label, then by label prefix.
fn find_column(sheet: &RawSheet, label: &str) -> Option<usize> {
    let wanted = normalize_header(label);
    if wanted.is_empty() {
        return None;
    }
    let headers: Vec<String> = sheet.headers.iter().map(|h| normalize_header(h)).collect();
    headers
        .iter()
        .position(|header| *header == wanted)
        .or_else(|| headers.iter().position(|header| header.starts_with(&wanted)))
}

const NEGATIVE_TOKENS: &[&str] = &["no", "nok", "n/a", "na", "0", "-", "false", "none"];

fn affirmative(cell: &CellValue) -> bool {
    match cell {
        CellValue::Bool(value) => *value,
        other => other
            .to_text()
            .map(|text| !NEGATIVE_TOKENS.contains(&text.to_lowercase().as_str()))
            .unwrap_or(false),
    }
}

struct QualityLayout {
    psw: Option<usize>,
    far: Option<usize>,
    imds: Option<usize>,
    handling_manual: Option<usize>,
}

impl QualityLayout {
    fn resolve(sheet: &RawSheet, columns: &QualityColumns) -> Self {
        Self {
            psw: find_column(sheet, &columns.psw),
            far: find_column(sheet, &columns.far),
            imds: find_column(sheet, &columns.imds),
            handling_manual: find_column(sheet, &columns.handling_manual),
        }
    }

    fn flags(&self, sheet: &RawSheet, row: usize) -> QualityFlags {
        let cell = |column: Option<usize>| column.map(|index| sheet.cell(row, index));
        let lower = |column: Option<usize>| {
            cell(column)
                .and_then(CellValue::to_text)
                .map(|text| text.to_lowercase())
                .unwrap_or_default()
        };
        let far = lower(self.far);
        QualityFlags {
            psw_ok: cell(self.psw).map(affirmative).unwrap_or(false),
            far_ok: far.contains("ok") && !far.contains("nok"),
            imds_ok: lower(self.imds).contains("yes"),
            has_handling_manual: cell(self.handling_manual).map(affirmative).unwrap_or(false),
        }
    }
}

fn aggregate(
    records: &[PartRecord],
    entries: &[PlantItemStatus],
    date_roles: &[DateRole],
) -> Vec<FactPart> {
    // A row is wholly superseded when it has plant entries and all of them lost.
    let mut standing: HashMap<usize, bool> = HashMap::new();
    for entry in entries {
        let survives = standing.entry(entry.source_row).or_insert(false);
        *survives |= !entry.is_duplicate_entry;
    }

    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut parts: Vec<FactPart> = Vec::new();
    for record in records {
        let slot = *index.entry(record.part_id_std.as_str()).or_insert_with(|| {
            parts.push(FactPart {
                part_id_std: record.part_id_std.clone(),
                part_id_raw: record.part_id_raw.clone(),
                description: None,
                supplier: None,
                n_active: 0,
                n_inactive: 0,
                n_new: 0,
                n_duplicate: 0,
                n_unknown: 0,
                total_plants: 0,
                flags: QualityFlags::default(),
                dates: vec![None; date_roles.len()],
            });
            parts.len() - 1
        });
        let part = &mut parts[slot];
        if part.description.is_none() {
            part.description = record.description.clone();
        }
        if part.supplier.is_none() {
            part.supplier = record.supplier.clone();
        }
        if !standing.get(&record.source_row).copied().unwrap_or(true) {
            continue;
        }
        part.flags = part.flags.merge(record.flags);
        for ((current, value), role) in part.dates.iter_mut().zip(&record.dates).zip(date_roles) {
            *current = reduce_date(*current, *value, role.policy);
        }
    }

    for entry in entries {
        let Some(&slot) = index.get(entry.part_id_std.as_str()) else {
            continue;
        };
        let part = &mut parts[slot];
        match entry.status_class {
            StatusClass::Active => part.n_active += 1,
            StatusClass::Inactive => part.n_inactive += 1,
            StatusClass::New => part.n_new += 1,
            StatusClass::Duplicate => part.n_duplicate += 1,
            StatusClass::Unknown => part.n_unknown += 1,
        }
        part.total_plants += 1;
    }
    parts
}

fn reduce_date(
    current: Option<NaiveDate>,
    value: Option<NaiveDate>,
    policy: DatePolicy,
) -> Option<NaiveDate> {
    match (current, value) {
        (Some(current), Some(value)) => Some(match policy {
            DatePolicy::Earliest => current.min(value),
            DatePolicy::Latest => current.max(value),
        }),
        (current, value) => current.or(value),
    }
}

fn build_clean_table(
    sheet: &RawSheet,
    layout: &ColumnLayout,
    records: &[PartRecord],
    record_rows: &[usize],
) -> Table {
    let source_kinds: Vec<ColumnType> = (0..sheet.headers.len())
        .map(|index| {
            if layout.is_date(index) {
                ColumnType::Date
            } else {
                let mut values = record_rows
                    .iter()
                    .map(|row| sheet.cell(*row, index))
                    .filter(|cell| !cell.is_blank())
                    .peekable();
                if values.peek().is_some() && values.all(|cell| cell.as_f64().is_some()) {
                    ColumnType::Float
                } else {
                    ColumnType::Text
                }
            }
        })
        .collect();

    let mut columns = vec![
        Column::new("part_id_std", ColumnType::Text),
        Column::new("part_id_raw", ColumnType::Text),
        Column::new("is_duplicate_entry", ColumnType::Boolean),
    ];
    let mut used: HashSet<String> = sheet
        .headers
        .iter()
        .map(|header| header.to_lowercase())
        .chain(columns.iter().map(|column| column.name.to_lowercase()))
        .collect();
    for (header, kind) in sheet.headers.iter().zip(&source_kinds) {
        let mut name = header.clone();
        if columns[..3]
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(header))
        {
            let mut suffix = 1;
            loop {
                name = format!("{header}.{suffix}");
                if used.insert(name.to_lowercase()) {
                    break;
                }
                suffix += 1;
            }
        }
        columns.push(Column::new(name, *kind));
    }

    let mut table = Table::new(MASTERBOM_CLEAN_TABLE, columns);
    for (record, &row) in records.iter().zip(record_rows) {
        let mut cells = vec![
            CellValue::Text(record.part_id_std.clone()),
            CellValue::text(record.part_id_raw.clone()),
            CellValue::Bool(record.is_duplicate_entry),
        ];
        for (index, kind) in source_kinds.iter().enumerate() {
            let cell = sheet.cell(row, index);
            cells.push(match kind {
                ColumnType::Date => CellValue::from(
                    layout
                        .dates
                        .iter()
                        .position(|column| column.index == index)
                        .and_then(|position| record.dates.get(position).copied().flatten()),
                ),
                ColumnType::Float => cell.as_f64().map(CellValue::Float).unwrap_or(CellValue::Null),
                _ => CellValue::from(text_of(cell)),
            });
        }
        table.push_row(cells);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bomflow::etl::config::DateConfig;

    fn text(value: &str) -> CellValue {
        CellValue::text(value)
    }

    fn sheet(headers: &[&str], rows: Vec<Vec<CellValue>>) -> RawSheet {
        RawSheet {
            name: "MasterBOM".into(),
            header_row: 0,
            headers: headers.iter().map(|h| h.to_string()).collect(),
            row_numbers: (0..rows.len()).map(|i| i + 2).collect(),
            rows,
        }
    }

    fn run(raw: &RawSheet) -> MasterBomOutput {
        let detection = DateDetection::from_config(&DateConfig::default()).unwrap();
        process(raw, &MasterBomConfig::default(), &detection).unwrap()
    }

    #[test]
    fn role_names_are_snake_case() {
        assert_eq!(role_name("Approved Date"), "approved_date");
        assert_eq!(role_name("FAR Promised date"), "far_promised_date");
    }

    #[test]
    fn blank_plant_cells_produce_no_rows() {
        let raw = sheet(
            &["YAZAKI PN", "PLANT-01", "PLANT-02"],
            vec![vec![text(" ab-123 "), text("Active"), CellValue::Null]],
        );
        let output = run(&raw);
        assert_eq!(output.plant_item_status.len(), 1);
        assert_eq!(output.plant_item_status[0].project_plant, "PLANT-01");
        assert_eq!(output.plant_item_status[0].status_class, StatusClass::Active);
        assert_eq!(output.fact_parts[0].part_id_std, "AB-123");
        assert_eq!(output.fact_parts[0].total_plants, 1);
    }

    #[test]
    fn blank_identifiers_are_skipped_with_warning() {
        let raw = sheet(
            &["YAZAKI PN", "K1"],
            vec![vec![text("***"), text("X")], vec![text("7283-1"), text("X")]],
        );
        let output = run(&raw);
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.clean.row_count(), 1);
        assert!(output.warnings.iter().any(|w| w.context == "row 2"));
    }

    #[test]
    fn unknown_statuses_are_not_counted_as_active() {
        let raw = sheet(
            &["YAZAKI PN", "K1", "K2"],
            vec![vec![text("7283-1"), text("on hold"), text("X")]],
        );
        let output = run(&raw);
        let part = &output.fact_parts[0];
        assert_eq!(part.n_unknown, 1);
        assert_eq!(part.n_active, 1);
        assert!(output.warnings.iter().any(|w| w.context == "status 'on hold'"));
    }

    #[test]
    fn dates_and_flags_aggregate_per_policy() {
        let raw = sheet(
            &[
                "YAZAKI PN",
                "Supplier Name",
                "PSW",
                "FAR Status",
                "IMDS STATUS (Yes, No, N/A)",
                "Approved Date",
                "Promised Date",
                "K1",
                "K2",
            ],
            vec![
                vec![
                    text("7283-1"),
                    text("Acme"),
                    text("Yes"),
                    text("NOK"),
                    text("Yes"),
                    text("2024-01-10"),
                    text("2024-03-01"),
                    text("X"),
                    CellValue::Null,
                ],
                vec![
                    text("7283-1"),
                    text("Acme"),
                    CellValue::Null,
                    text("OK"),
                    text("No"),
                    text("2024-02-10"),
                    text("2024-02-01"),
                    CellValue::Null,
                    text("X"),
                ],
            ],
        );
        let output = run(&raw);
        assert_eq!(output.date_roles.len(), 2);
        assert_eq!(output.date_roles[0].fact_column(), "latest_approved_date");
        assert_eq!(output.date_roles[1].fact_column(), "earliest_promised_date");

        let part = &output.fact_parts[0];
        assert_eq!(part.total_plants, 2);
        assert_eq!(part.n_active, 2);
        assert_eq!(part.dates[0], NaiveDate::from_ymd_opt(2024, 2, 10));
        assert_eq!(part.dates[1], NaiveDate::from_ymd_opt(2024, 2, 1));
        assert!(part.flags.psw_ok);
        assert!(part.flags.far_ok);
        assert!(part.flags.imds_ok);
        assert!(!part.flags.has_handling_manual);
    }

    #[test]
    fn source_headers_never_shadow_derived_columns() {
        let raw = sheet(
            &["YAZAKI PN", "Part_ID_Std", "K1"],
            vec![vec![text("7283-1"), text("legacy"), text("X")]],
        );
        let output = run(&raw);
        let names: Vec<&str> = output.clean.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["part_id_std", "part_id_raw", "is_duplicate_entry", "YAZAKI PN", "Part_ID_Std.1", "K1"]
        );
        assert_eq!(output.clean.rows[0][4], CellValue::text("legacy"));
    }

    #[test]
    fn clean_table_flags_repeated_rows() {
        let row = vec![text("7283-1"), text("X"), CellValue::Float(2.0)];
        let raw = sheet(&["YAZAKI PN", "K1", "Qty"], vec![row.clone(), row]);
        let output = run(&raw);
        let flag = output.clean.column_index("is_duplicate_entry").unwrap();
        assert_eq!(output.clean.rows[0][flag], CellValue::Bool(false));
        assert_eq!(output.clean.rows[1][flag], CellValue::Bool(true));
        let qty = output.clean.column_index("Qty").unwrap();
        assert_eq!(output.clean.columns[qty].kind, ColumnType::Float);
        assert_eq!(output.duplicates_removed, 1);
    }
}
