use std::path::Path;

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, TableColumn, Workbook, Worksheet};

use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::flatten::SheetNameRegistry;
use crate::bomflow::etl::io::ArtifactInfo;
use crate::bomflow::etl::model::{CellValue, Table};

/// File name of the workbook produced in the output directory.
pub const WORKBOOK_FILE: &str = "etl.xlsx";

fn excel_serial(date: &NaiveDate) -> Option<f64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    Some(date.signed_duration_since(epoch).num_days() as f64)
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    cell: &CellValue,
    date_format: &Format,
) -> Result<()> {
    match cell {
        CellValue::Null => {}
        CellValue::Text(value) => {
            worksheet.write_string(row, col, value)?;
        }
        CellValue::Int(value) => {
            worksheet.write_number(row, col, *value as f64)?;
        }
        CellValue::Float(value) => {
            worksheet.write_number(row, col, *value)?;
        }
        CellValue::Bool(value) => {
            worksheet.write_boolean(row, col, *value)?;
        }
        CellValue::Date(value) => {
            if let Some(serial) = excel_serial(value) {
                worksheet.write_number_with_format(row, col, serial, date_format)?;
            }
        }
    }
    Ok(())
}

/// Writes every table to its own worksheet of `<dir>/etl.xlsx`.
///
/// Sheet names are sanitized and made unique; non-empty sheets are wrapped
/// in an autofilter table.
pub fn write_tables(dir: &Path, tables: &[Table]) -> Result<Vec<ArtifactInfo>> {
    let path = dir.join(WORKBOOK_FILE);
    let mut workbook = Workbook::new();
    let mut names = SheetNameRegistry::default();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");

    for table in tables {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(names.assign(&table.name))?;

        for (col_idx, column) in table.columns.iter().enumerate() {
            worksheet.write_string(0, col_idx as u16, &column.name)?;
        }

        for (row_idx, row) in table.rows.iter().enumerate() {
            for (col_idx, cell) in row.iter().enumerate() {
                write_cell(
                    worksheet,
                    (row_idx + 1) as u32,
                    col_idx as u16,
                    cell,
                    &date_format,
                )?;
            }
        }

        if !table.rows.is_empty() && !table.columns.is_empty() {
            let headers: Vec<TableColumn> = table
                .columns
                .iter()
                .map(|column| TableColumn::new().set_header(&column.name))
                .collect();
            let mut excel_table = rust_xlsxwriter::Table::new();
            excel_table
                .set_autofilter(true)
                .set_columns(&headers);
            let col_end = (table.columns.len() as u16).saturating_sub(1);
            worksheet.add_table(0, 0, table.rows.len() as u32, col_end, &excel_table)?;
        }
    }

    workbook.save(&path)?;
    tables
        .iter()
        .map(|table| ArtifactInfo::for_file(&table.name, "xlsx", &path, table.row_count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bomflow::etl::model::{Column, ColumnType};
    use calamine::{DataType, Reader, Xlsx, open_workbook};
    use tempfile::tempdir;

    #[test]
    fn writes_one_sheet_per_table() {
        let mut completion = Table::new(
            "project_completion_by_plant",
            vec![
                Column::new("plant_id", ColumnType::Text),
                Column::new("overall_completion_pct", ColumnType::Float),
            ],
        );
        completion.push_row(vec![CellValue::Text("K1".into()), CellValue::Float(0.25)]);
        let empty = Table::new("dim_dates", vec![Column::new("date", ColumnType::Date)]);

        let dir = tempdir().expect("temporary directory");
        let artifacts = write_tables(dir.path(), &[completion, empty]).expect("workbook written");
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].size_bytes > 0);

        let mut workbook: Xlsx<_> = open_workbook(dir.path().join(WORKBOOK_FILE)).expect("open");
        assert_eq!(
            workbook.sheet_names().to_vec(),
            vec!["project_completion_by_plant".to_string(), "dim_dates".to_string()]
        );
        let range = workbook
            .worksheet_range("project_completion_by_plant")
            .expect("sheet present")
            .expect("range");
        assert_eq!(range.get_value((1, 0)), Some(&DataType::String("K1".into())));
        assert_eq!(range.get_value((1, 1)), Some(&DataType::Float(0.25)));
    }

    #[test]
    fn dates_become_excel_serials() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(excel_serial(&date), Some(45292.0));
    }
}
