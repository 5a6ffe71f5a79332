use std::collections::HashSet;
use std::path::Path;

use calamine::{DataType, Reader, Xlsx, open_workbook};
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::bomflow::etl::config::ReaderConfig;
use crate::bomflow::etl::error::{EtlError, Result};
use crate::bomflow::etl::model::{CellValue, RawSheet};
use crate::bomflow::etl::normalize::{
    excel_serial_to_date, looks_numeric, parse_date, standardize_text,
};

/// Words marking a row as the second line of a wrapped or merged header.
const HEADER_INDICATORS: &[&str] = &[
    "(",
    ")",
    "remarks",
    "status",
    "date",
    "details",
    "deviation",
    "under",
    "available",
    "promised",
    "ok/nok",
    "yes/no",
];

/// Share of cells that must carry an indicator for a continuation row.
const CONTINUATION_INDICATOR_SHARE: f64 = 0.3;
/// A row with at least this share of part-number-like cells is data.
const PART_NUMBER_SHARE: f64 = 0.2;
/// Header continuations never span more rows than this.
const MAX_CONTINUATION_ROWS: usize = 3;

/// Lists the worksheet names of a workbook in workbook order.
pub fn list_sheets(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(EtlError::MissingInput(path.to_path_buf()));
    }
    let workbook: Xlsx<_> = open_workbook(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Loads the MasterBOM and Status sheets, detecting each sheet's header row.
///
/// The workbook is opened read-only. Structural problems (no sheets, a
/// missing or empty sheet, no recognisable header) abort with a dedicated
/// [`EtlError`] variant.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %path.display(), master = master_sheet, status = status_sheet)
)]
pub fn read_sheets(
    path: &Path,
    master_sheet: &str,
    status_sheet: &str,
    config: &ReaderConfig,
) -> Result<(RawSheet, RawSheet)> {
    if !path.exists() {
        return Err(EtlError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let available = workbook.sheet_names().to_vec();
    if available.is_empty() {
        return Err(EtlError::EmptyWorkbook(path.to_path_buf()));
    }

    let master = read_sheet(&mut workbook, master_sheet, &available, config)?;
    let status = read_sheet(&mut workbook, status_sheet, &available, config)?;
    info!(
        master_rows = master.rows.len(),
        master_columns = master.headers.len(),
        status_rows = status.rows.len(),
        status_columns = status.headers.len(),
        "sheets loaded"
    );
    Ok((master, status))
}

fn read_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
    available: &[String],
    config: &ReaderConfig,
) -> Result<RawSheet> {
    let range = workbook
        .worksheet_range(name)
        .ok_or_else(|| EtlError::SheetNotFound {
            sheet: name.to_string(),
            available: available.to_vec(),
        })?
        .map_err(EtlError::from)?;

    let (first_row, first_column) = range.start().unwrap_or((0, 0));
    // Leading blank columns are kept so column positions match the sheet.
    let lead = first_column as usize;
    let grid: Vec<Vec<CellValue>> = range
        .rows()
        .map(|row| {
            std::iter::repeat_n(CellValue::Null, lead)
                .chain(row.iter().map(convert_cell))
                .collect()
        })
        .collect();

    if grid.iter().all(|row| row.iter().all(CellValue::is_blank)) {
        return Err(EtlError::EmptySheet(name.to_string()));
    }

    build_raw_sheet(name, grid, first_row as usize, config)
}

/// Turns a grid of cells into a [`RawSheet`].
///
/// `row_offset` is the worksheet index of the grid's first row.
pub fn build_raw_sheet(
    name: &str,
    grid: Vec<Vec<CellValue>>,
    row_offset: usize,
    config: &ReaderConfig,
) -> Result<RawSheet> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let header_index = detect_header(&grid, width, config).ok_or_else(|| {
        EtlError::HeaderDetection {
            sheet: name.to_string(),
            window: config.scan_window,
            threshold: config.label_threshold,
        }
    })?;

    let mut labels: Vec<Option<String>> = (0..width)
        .map(|column| label_text(grid[header_index].get(column)))
        .collect();

    let mut data_start = header_index + 1;
    while data_start < grid.len()
        && data_start - header_index <= MAX_CONTINUATION_ROWS
        && is_continuation_row(&grid[data_start], &labels)
    {
        for (column, label) in labels.iter_mut().enumerate() {
            if label.is_none() {
                *label = label_text(grid[data_start].get(column));
            }
        }
        debug!(sheet = name, row = row_offset + data_start, "merged header continuation row");
        data_start += 1;
    }

    let headers = unique_headers(labels);

    let mut rows = Vec::new();
    let mut row_numbers = Vec::new();
    for (index, mut row) in grid.into_iter().enumerate().skip(data_start) {
        if row.iter().all(CellValue::is_blank) {
            continue;
        }
        row.resize(width, CellValue::Null);
        rows.push(row);
        row_numbers.push(row_offset + index + 1);
    }

    debug!(
        sheet = name,
        header_row = row_offset + header_index,
        data_rows = rows.len(),
        "header detected"
    );

    Ok(RawSheet {
        name: name.to_string(),
        header_row: row_offset + header_index,
        headers,
        rows,
        row_numbers,
    })
}

fn detect_header(grid: &[Vec<CellValue>], width: usize, config: &ReaderConfig) -> Option<usize> {
    if width == 0 {
        return None;
    }
    grid.iter().take(config.scan_window).position(|row| {
        let labels = row.iter().filter(|cell| is_label(cell)).count();
        labels as f64 / width as f64 >= config.label_threshold
    })
}

fn is_label(cell: &CellValue) -> bool {
    match cell {
        CellValue::Text(text) => {
            let text = text.trim();
            !text.is_empty() && !looks_numeric(text) && parse_date(cell).is_none()
        }
        _ => false,
    }
}

/// Digits with optional `-`/`.` separators, longer than three characters.
fn looks_like_part_number(text: &str) -> bool {
    let digits: String = text.trim().chars().filter(|c| *c != '-' && *c != '.').collect();
    digits.len() > 3 && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_continuation_row(row: &[CellValue], labels: &[Option<String>]) -> bool {
    let fills_blank_label = labels
        .iter()
        .enumerate()
        .any(|(column, label)| label.is_none() && label_text(row.get(column)).is_some());
    if !fills_blank_label {
        return false;
    }

    let filled: Vec<&CellValue> = row.iter().filter(|cell| !cell.is_blank()).collect();
    if !filled.iter().all(|cell| is_label(cell)) {
        return false;
    }
    let share = |predicate: &dyn Fn(&str) -> bool| {
        let hits = filled
            .iter()
            .filter(|cell| predicate(&cell.to_string()))
            .count();
        hits as f64 / filled.len() as f64
    };
    let marked = share(&|text: &str| {
        let text = text.to_lowercase();
        HEADER_INDICATORS.iter().any(|word| text.contains(word))
    });
    marked > CONTINUATION_INDICATOR_SHARE && share(&looks_like_part_number) < PART_NUMBER_SHARE
}

fn label_text(cell: Option<&CellValue>) -> Option<String> {
    cell.and_then(CellValue::to_text)
        .map(|text| standardize_text(&text))
        .filter(|text| !text.is_empty())
}

/// Fills blank labels and suffixes repeats with `.1`, `.2`, ...
///
/// Labels are compared case-insensitively, as SQLite compares column names.
fn unique_headers(labels: Vec<Option<String>>) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    labels
        .into_iter()
        .enumerate()
        .map(|(column, label)| {
            let base = label.unwrap_or_else(|| format!("unnamed_{column}"));
            let mut header = base.clone();
            let mut suffix = 1;
            while !used.insert(header.to_lowercase()) {
                header = format!("{base}.{suffix}");
                suffix += 1;
            }
            header
        })
        .collect()
}

fn convert_cell(cell: &DataType) -> CellValue {
    match cell {
        DataType::Empty | DataType::Error(_) => CellValue::Null,
        DataType::String(value) => CellValue::text(value.clone()),
        DataType::Float(value) => CellValue::Float(*value),
        DataType::Int(value) => CellValue::Int(*value),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => excel_serial_to_date(*serial)
            .map(CellValue::Date)
            .unwrap_or(CellValue::Float(*serial)),
        DataType::DateTimeIso(value) => value
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::text(value.clone())),
        other => CellValue::text(other.to_string()),
    }
}
