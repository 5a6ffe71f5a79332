use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use bomflow_etl::config::{OutputFormat, PipelineConfig};
use bomflow_etl::flatten::{
    DATE_ROLE_BRIDGE_TABLE, DIM_DATES_TABLE, FACT_PARTS_TABLE, MASTERBOM_CLEAN_TABLE,
    PLANT_ITEM_STATUS_TABLE, PROJECT_COMPLETION_TABLE, STATUS_CLEAN_TABLE,
};
use bomflow_etl::io::excel_read;
use bomflow_etl::io::sqlite_write::DATABASE_FILE;
use bomflow_etl::model::{CellValue, ColumnType, Table};
use bomflow_etl::pipeline::{self, RunRequest};
use bomflow_etl::EtlError;
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use tempfile::tempdir;

const MASTER: &str = "MasterBOM";
const STATUS: &str = "Status";

enum Fixture {
    S(&'static str),
    N(f64),
    D(i32, u32, u32),
    Blank,
}

use Fixture::{Blank, D, N, S};

fn write_row(worksheet: &mut Worksheet, row: u32, cells: &[Fixture], date_format: &Format) {
    for (col, cell) in cells.iter().enumerate() {
        let col = col as u16;
        match cell {
            S(text) => {
                worksheet.write_string(row, col, *text).expect("string cell");
            }
            N(number) => {
                worksheet.write_number(row, col, *number).expect("number cell");
            }
            D(y, m, d) => {
                let date = NaiveDate::from_ymd_opt(*y, *m, *d).expect("valid date");
                let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).expect("epoch");
                let serial = date.signed_duration_since(epoch).num_days() as f64;
                worksheet
                    .write_number_with_format(row, col, serial, date_format)
                    .expect("date cell");
            }
            Blank => {}
        }
    }
}

fn master_rows() -> Vec<Vec<Fixture>> {
    vec![
        vec![S("MasterBOM export")],
        vec![],
        vec![
            S("YAZAKI PN"),
            S("Item Description"),
            S("Supplier Name"),
            S("Qty"),
            S("PLANT-01"),
            S("PLANT-02"),
            S("Promised Date"),
            S("Comments"),
        ],
        vec![
            S(" ab-123 "),
            S("Bracket"),
            S("ACME"),
            N(2.0),
            S("Active"),
            Blank,
            D(2024, 3, 1),
            S("2024-01-05"),
        ],
        vec![
            S("7283-1234"),
            S("Harness"),
            S("ACME"),
            N(1.0),
            S("Active"),
            S("Inactive"),
            D(2024, 2, 1),
            S("2024-02-10"),
        ],
        vec![
            S("7283-1234"),
            S("Harness"),
            S("ACME MAROC"),
            N(1.0),
            S("Inactive"),
            Blank,
            D(2024, 1, 15),
            S("pending"),
        ],
        vec![
            S("X-9"),
            S("Clip"),
            S("Beta"),
            N(4.0),
            S("New"),
            S("Active"),
            Blank,
            S("see note"),
        ],
        vec![
            S("Y-1"),
            S("Screw"),
            S("Beta"),
            N(10.0),
            S("Mystery"),
            Blank,
            D(2024, 4, 1),
            S("tbd"),
        ],
    ]
}

fn status_rows() -> Vec<Vec<Fixture>> {
    vec![
        vec![
            S("Project"),
            S("OEM"),
            S("Total Part Numbers"),
            S("PSW Available"),
            S("% PSW"),
            S("1st PPAP Milestone"),
        ],
        vec![S("K1"), S("Ford"), N(20.0), N(17.0), S("85%"), D(2024, 6, 30)],
        vec![S("K2"), S("Stellantis"), N(10.0), N(10.0), Blank, D(2024, 9, 30)],
    ]
}

fn write_workbook(path: &Path, sheets: &[(&str, Vec<Vec<Fixture>>)]) {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet name");
        for (row, cells) in rows.iter().enumerate() {
            write_row(worksheet, row as u32, cells, &date_format);
        }
    }
    workbook.save(path).expect("fixture workbook saved");
}

fn fixture(dir: &Path) -> PathBuf {
    let path = dir.join("input.xlsx");
    write_workbook(&path, &[(MASTER, master_rows()), (STATUS, status_rows())]);
    path
}

fn request(input: PathBuf, output_dir: PathBuf, formats: &[OutputFormat]) -> RunRequest {
    let mut config = PipelineConfig::default();
    config.formats = formats.iter().copied().collect::<BTreeSet<_>>();
    RunRequest {
        input,
        master_sheet: MASTER.to_string(),
        status_sheet: STATUS.to_string(),
        output_dir,
        config,
    }
}

fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a CellValue> {
    let index = table
        .column_index(name)
        .unwrap_or_else(|| panic!("column {name} in {}", table.name));
    table.column_values(index).collect()
}

fn rows_where<'a>(table: &'a Table, name: &str, value: &str) -> Vec<&'a Vec<CellValue>> {
    let index = table.column_index(name).expect("filter column");
    table
        .rows
        .iter()
        .filter(|row| row[index] == CellValue::Text(value.to_string()))
        .collect()
}

fn transform(dir: &Path) -> pipeline::TransformOutput {
    let input = fixture(dir);
    pipeline::transform(&input, MASTER, STATUS, &PipelineConfig::default()).expect("transform")
}

#[test]
fn reader_skips_title_rows_above_the_header() {
    let dir = tempdir().expect("temporary directory");
    let input = fixture(dir.path());
    let config = PipelineConfig::default();
    let (master, status) =
        excel_read::read_sheets(&input, MASTER, STATUS, &config.reader).expect("sheets read");
    assert_eq!(master.header_row, 2);
    assert_eq!(master.headers[0], "YAZAKI PN");
    assert_eq!(master.rows.len(), 5);
    assert_eq!(master.row_numbers[0], 4);
    assert_eq!(status.header_row, 0);
    assert_eq!(status.rows.len(), 2);
    assert_eq!(
        excel_read::list_sheets(&input).expect("sheet names"),
        vec![MASTER.to_string(), STATUS.to_string()]
    );
}

#[test]
fn single_plant_part_yields_one_status_row() {
    let dir = tempdir().expect("temporary directory");
    let output = transform(dir.path());
    let statuses = output.table(PLANT_ITEM_STATUS_TABLE).expect("status table");

    let rows = rows_where(statuses, "part_id_std", "AB-123");
    assert_eq!(rows.len(), 1);
    let plant = statuses.column_index("project_plant").expect("plant column");
    let class = statuses.column_index("status_class").expect("class column");
    assert_eq!(rows[0][plant], CellValue::Text("PLANT-01".into()));
    assert_eq!(rows[0][class], CellValue::Text("active".into()));

    let facts = output.table(FACT_PARTS_TABLE).expect("fact table");
    let fact = rows_where(facts, "part_id_std", "AB-123");
    let total = facts.column_index("total_plants").expect("total column");
    assert_eq!(fact[0][total], CellValue::Int(1));
}

#[test]
fn duplicate_part_and_plant_keeps_both_rows_with_one_authoritative() {
    let dir = tempdir().expect("temporary directory");
    let output = transform(dir.path());
    let statuses = output.table(PLANT_ITEM_STATUS_TABLE).expect("status table");
    let plant = statuses.column_index("project_plant").expect("plant column");
    let duplicate = statuses.column_index("is_duplicate_entry").expect("flag column");
    let raw = statuses.column_index("raw_status").expect("raw column");

    let entries: Vec<_> = rows_where(statuses, "part_id_std", "7283-1234")
        .into_iter()
        .filter(|row| row[plant] == CellValue::Text("PLANT-01".into()))
        .collect();
    assert_eq!(entries.len(), 2);
    let survivors: Vec<_> = entries
        .iter()
        .filter(|row| row[duplicate] == CellValue::Bool(false))
        .collect();
    assert_eq!(survivors.len(), 1);
    // The supplier tagged as a Moroccan source wins the tie.
    assert_eq!(survivors[0][raw], CellValue::Text("Inactive".into()));
    assert_eq!(output.summary.duplicates_removed, 1);
}

#[test]
fn explicit_percent_in_status_sheet_becomes_a_fraction() {
    let dir = tempdir().expect("temporary directory");
    let output = transform(dir.path());
    let status = output.table(STATUS_CLEAN_TABLE).expect("status_clean");
    let pct = column(status, "psw_completion_pct");
    match pct[0] {
        CellValue::Float(value) => assert!((value - 0.85).abs() < 1e-9),
        other => panic!("unexpected percentage {other:?}"),
    }
    // Blank percentage derived from the counts.
    assert_eq!(pct[1], &CellValue::Float(1.0));

    let completion = output.table(PROJECT_COMPLETION_TABLE).expect("completion");
    assert_eq!(completion.row_count(), 2);
    let labels = column(completion, "completion_status");
    assert_eq!(labels[1], &CellValue::Text("Complete".into()));
}

#[test]
fn mostly_text_column_is_not_a_date_column() {
    let dir = tempdir().expect("temporary directory");
    let output = transform(dir.path());
    let clean = output.table(MASTERBOM_CLEAN_TABLE).expect("clean table");
    let comments = clean.column_index("Comments").expect("comments column");
    assert_eq!(clean.columns[comments].kind, ColumnType::Text);
    let promised = clean.column_index("Promised Date").expect("promised column");
    assert_eq!(clean.columns[promised].kind, ColumnType::Date);

    let facts = output.table(FACT_PARTS_TABLE).expect("fact table");
    assert!(facts.column_index("earliest_promised_date").is_some());
    assert_eq!(output.summary.date_columns_processed, 1);

    let bridge = output.table(DATE_ROLE_BRIDGE_TABLE).expect("bridge table");
    let roles = column(bridge, "role");
    assert!(!roles.contains(&&CellValue::Text("Comments".into())));
}

#[test]
fn aggregation_and_date_dimension_invariants() {
    let dir = tempdir().expect("temporary directory");
    let output = transform(dir.path());
    let statuses = output.table(PLANT_ITEM_STATUS_TABLE).expect("status table");
    let facts = output.table(FACT_PARTS_TABLE).expect("fact table");
    let clean = output.table(MASTERBOM_CLEAN_TABLE).expect("clean table");

    let known: BTreeSet<String> = column(clean, "part_id_std")
        .into_iter()
        .map(ToString::to_string)
        .collect();
    for part in column(statuses, "part_id_std") {
        assert!(known.contains(&part.to_string()), "orphan status row {part}");
    }

    let total = facts.column_index("total_plants").expect("total column");
    let part = facts.column_index("part_id_std").expect("part column");
    for row in &facts.rows {
        let id = row[part].to_string();
        let entries = rows_where(statuses, "part_id_std", &id).len() as i64;
        assert_eq!(row[total], CellValue::Int(entries), "total_plants for {id}");
    }

    let dates = output.table(DIM_DATES_TABLE).expect("date dimension");
    let days: Vec<String> = column(dates, "date").into_iter().map(ToString::to_string).collect();
    let distinct: BTreeSet<&String> = days.iter().collect();
    assert_eq!(distinct.len(), days.len());
    for table in &output.tables {
        for (index, col) in table.columns.iter().enumerate() {
            if col.kind != ColumnType::Date {
                continue;
            }
            for value in table.column_values(index) {
                if let CellValue::Date(_) = value {
                    assert!(days.contains(&value.to_string()), "{value} missing from dim_dates");
                }
            }
        }
    }

    assert_eq!(output.summary.total_parts, 4);
    assert_eq!(output.summary.unknown_entries, 1);
    assert!(output
        .warnings
        .iter()
        .any(|warning| warning.context == "status 'Mystery'"));
}

#[test]
fn failing_format_does_not_block_the_others() {
    let dir = tempdir().expect("temporary directory");
    let input = fixture(dir.path());
    let output_dir = dir.path().join("out");
    fs::create_dir_all(output_dir.join(DATABASE_FILE)).expect("blocking directory");

    let report = pipeline::run(&request(
        input,
        output_dir.clone(),
        &[OutputFormat::Csv, OutputFormat::Sqlite, OutputFormat::Parquet],
    ))
    .expect("run completes");

    assert!(!report.all_outputs_succeeded());
    let failed: Vec<&str> = report
        .outputs
        .iter()
        .filter(|outcome| outcome.result.is_err())
        .map(|outcome| outcome.format.as_str())
        .collect();
    assert_eq!(failed, vec!["sqlite"]);
    assert!(output_dir.join("fact_parts.csv").exists());
    assert!(output_dir.join("fact_parts.parquet").exists());
    assert!(output_dir.join("data_dictionary.md").exists());
    assert!(report
        .warnings
        .iter()
        .any(|warning| warning.context == "format sqlite"));
}

#[test]
fn full_run_writes_every_format_and_a_report() {
    let dir = tempdir().expect("temporary directory");
    let input = fixture(dir.path());
    let output_dir = dir.path().join("out");

    let report = pipeline::run(&request(input, output_dir.clone(), &OutputFormat::ALL))
        .expect("run completes");
    assert!(report.all_outputs_succeeded());
    assert!(output_dir.join(DATABASE_FILE).exists());
    assert!(output_dir.join("etl.xlsx").exists());
    assert!(output_dir.join("data_dictionary.json").exists());
    assert_eq!(report.summary.table_rows.get(DIM_DATES_TABLE).copied(), Some(6));

    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["summary"]["total_parts"], 4);
    assert!(json["artifacts"].as_array().is_some_and(|a| !a.is_empty()));
}

#[test]
fn missing_sheet_is_a_structural_error() {
    let dir = tempdir().expect("temporary directory");
    let input = fixture(dir.path());
    let error = pipeline::transform(&input, MASTER, "Nope", &PipelineConfig::default())
        .expect_err("missing sheet");
    assert!(error.is_structural());
    assert!(matches!(error, EtlError::SheetNotFound { ref sheet, .. } if sheet == "Nope"));
}

#[test]
fn missing_id_column_is_reported() {
    let dir = tempdir().expect("temporary directory");
    let input = fixture(dir.path());
    let mut config = PipelineConfig::default();
    config.masterbom.id_column = "Part Number".into();
    let error = pipeline::transform(&input, MASTER, STATUS, &config).expect_err("no id column");
    assert!(matches!(error, EtlError::MissingIdColumn { .. }));
}

#[test]
fn empty_named_sheet_is_a_structural_error() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("empty.xlsx");
    write_workbook(&path, &[(MASTER, master_rows()), (STATUS, Vec::new())]);
    let error = pipeline::transform(&path, MASTER, STATUS, &PipelineConfig::default())
        .expect_err("empty sheet");
    assert!(error.is_structural());
    assert!(matches!(error, EtlError::EmptySheet(ref sheet) if sheet == STATUS));
}

#[test]
fn headers_differing_only_in_case_still_load_into_sqlite() {
    let dir = tempdir().expect("temporary directory");
    let input = dir.path().join("cased.xlsx");
    write_workbook(
        &input,
        &[
            (
                MASTER,
                vec![
                    vec![S("YAZAKI PN"), S("PSW"), S("Psw"), S("part_id_std"), S("K1")],
                    vec![S("7283-1234"), S("Yes"), S("no"), S("legacy"), S("X")],
                ],
            ),
            (STATUS, status_rows()),
        ],
    );
    let output_dir = dir.path().join("out");
    let report = pipeline::run(&request(
        input,
        output_dir.clone(),
        &[OutputFormat::Sqlite, OutputFormat::Xlsx],
    ))
    .expect("run completes");
    assert!(report.all_outputs_succeeded());

    let clean = report
        .artifacts
        .iter()
        .find(|artifact| artifact.table == MASTERBOM_CLEAN_TABLE && artifact.format == "sqlite")
        .expect("clean table in sqlite");
    assert_eq!(clean.row_count, 1);

    let connection = rusqlite::Connection::open(output_dir.join(DATABASE_FILE)).expect("open");
    let columns: Vec<String> = connection
        .prepare("SELECT name FROM pragma_table_info('masterbom_clean')")
        .expect("prepare")
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("column names");
    assert_eq!(
        columns,
        vec![
            "part_id_std",
            "part_id_raw",
            "is_duplicate_entry",
            "YAZAKI PN",
            "PSW",
            "Psw.1",
            "part_id_std.1",
            "K1",
        ]
    );
}

#[test]
fn sheet_without_labels_fails_header_detection() {
    let dir = tempdir().expect("temporary directory");
    let path = dir.path().join("numbers.xlsx");
    write_workbook(
        &path,
        &[
            (MASTER, vec![vec![N(1.0), N(2.0)], vec![N(3.0), N(4.0)]]),
            (STATUS, status_rows()),
        ],
    );
    let error = pipeline::transform(&path, MASTER, STATUS, &PipelineConfig::default())
        .expect_err("no header");
    assert!(matches!(error, EtlError::HeaderDetection { .. }));
}
