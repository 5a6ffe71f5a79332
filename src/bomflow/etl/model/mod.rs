use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

mod records;

pub use records::{
    DateDimensionRow, DateRoleBridgeRow, FactPart, PartRecord, PlantItemStatus,
    ProjectCompletion, QualityFlags, StatusClass, StatusRecord,
};

/// Format used whenever a date is rendered as text.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Absent value.
    Null,
    /// Free-form text.
    Text(String),
    /// Integral number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean flag.
    Bool(bool),
    /// Calendar date without a time component.
    Date(NaiveDate),
}

impl CellValue {
    /// Builds a text cell, mapping blank strings to [`CellValue::Null`].
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            CellValue::Null
        } else {
            CellValue::Text(value)
        }
    }

    /// Returns `true` for nulls and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    /// Returns the trimmed textual rendering of a non-blank cell.
    pub fn to_text(&self) -> Option<String> {
        if self.is_blank() {
            None
        } else {
            Some(self.to_string().trim().to_string())
        }
    }

    /// Returns the numeric value of number cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(value) => Some(*value as f64),
            CellValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the column type a non-null value naturally belongs to.
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            CellValue::Null => None,
            CellValue::Text(_) => Some(ColumnType::Text),
            CellValue::Int(_) => Some(ColumnType::Integer),
            CellValue::Float(_) => Some(ColumnType::Float),
            CellValue::Bool(_) => Some(ColumnType::Boolean),
            CellValue::Date(_) => Some(ColumnType::Date),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Int(value) => write!(f, "{value}"),
            CellValue::Float(value) => {
                if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Date(value) => write!(f, "{}", value.format(DATE_FORMAT)),
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(value: Option<String>) -> Self {
        value.map(CellValue::text).unwrap_or(CellValue::Null)
    }
}

impl From<Option<NaiveDate>> for CellValue {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map(CellValue::Date).unwrap_or(CellValue::Null)
    }
}

impl From<Option<f64>> for CellValue {
    fn from(value: Option<f64>) -> Self {
        value.map(CellValue::Float).unwrap_or(CellValue::Null)
    }
}

impl From<Option<i64>> for CellValue {
    fn from(value: Option<i64>) -> Self {
        value.map(CellValue::Int).unwrap_or(CellValue::Null)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Bool(value)
    }
}

/// Logical type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    Date,
}

impl ColumnType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name and type of a table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A named, typed table handed to the writers.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row. Rows are padded or truncated to the column count.
    pub fn push_row(&mut self, mut row: Vec<CellValue>) {
        row.resize(self.columns.len(), CellValue::Null);
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Iterates the values of one column.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &CellValue> {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&CellValue::Null))
    }

    /// Coerces every cell to its column type, nulling values that cannot be
    /// represented. Numbers in text columns are rendered as strings.
    pub fn conform(&mut self) {
        let kinds: Vec<ColumnType> = self.columns.iter().map(|column| column.kind).collect();
        for row in &mut self.rows {
            for (cell, kind) in row.iter_mut().zip(&kinds) {
                let conformed = match (kind, &*cell) {
                    (_, CellValue::Null) => continue,
                    (ColumnType::Text, CellValue::Text(_)) => continue,
                    (ColumnType::Text, other) => CellValue::text(other.to_string()),
                    (ColumnType::Float, CellValue::Int(value)) => CellValue::Float(*value as f64),
                    (kind, other) if other.kind() == Some(*kind) => continue,
                    _ => CellValue::Null,
                };
                *cell = conformed;
            }
        }
    }
}

/// A worksheet as read from the workbook, before any business rules apply.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    /// Zero-based index of the detected header row within the worksheet.
    pub header_row: usize,
    /// Unique, trimmed header labels.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// One-based worksheet row number of each data row.
    pub row_numbers: Vec<usize>,
}

impl RawSheet {
    pub fn cell(&self, row: usize, column: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .unwrap_or(&CellValue::Null)
    }

    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &CellValue> {
        self.rows
            .iter()
            .map(move |row| row.get(column).unwrap_or(&CellValue::Null))
    }

    /// Worksheet row number of a data row, as a user would see it in Excel.
    pub fn source_row_number(&self, row: usize) -> usize {
        self.row_numbers
            .get(row)
            .copied()
            .unwrap_or(self.header_row + row + 2)
    }
}
