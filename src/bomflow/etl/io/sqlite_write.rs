use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::io::ArtifactInfo;
use crate::bomflow::etl::model::{CellValue, ColumnType, DATE_FORMAT, Table};

/// File name of the relational database produced in the output directory.
pub const DATABASE_FILE: &str = "etl.sqlite";

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(kind: ColumnType) -> &'static str {
    match kind {
        ColumnType::Text | ColumnType::Date => "TEXT",
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Float => "REAL",
    }
}

fn sql_value(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Text(value) => Value::Text(value.clone()),
        CellValue::Int(value) => Value::Integer(*value),
        CellValue::Float(value) => Value::Real(*value),
        CellValue::Bool(value) => Value::Integer(i64::from(*value)),
        CellValue::Date(value) => Value::Text(value.format(DATE_FORMAT).to_string()),
    }
}

fn create_statement(table: &Table) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|column| format!("{} {}", quote_identifier(&column.name), sql_type(column.kind)))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(&table.name),
        columns.join(", ")
    )
}

fn insert_statement(table: &Table) -> String {
    let placeholders: Vec<String> = (1..=table.columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} VALUES ({})",
        quote_identifier(&table.name),
        placeholders.join(", ")
    )
}

/// Writes every table into a fresh `<dir>/etl.sqlite`.
///
/// An existing database is replaced. All tables are loaded inside one
/// transaction so a failure leaves no partially populated database behind.
pub fn write_tables(dir: &Path, tables: &[Table]) -> Result<Vec<ArtifactInfo>> {
    let path = dir.join(DATABASE_FILE);
    match fs::remove_file(&path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let mut connection = Connection::open(&path)?;
    let transaction = connection.transaction()?;
    for table in tables {
        let mut conformed = table.clone();
        conformed.conform();
        transaction.execute_batch(&create_statement(&conformed))?;
        {
            let mut insert = transaction.prepare(&insert_statement(&conformed))?;
            for row in &conformed.rows {
                insert.execute(params_from_iter(row.iter().map(sql_value)))?;
            }
        }
        debug!(table = %table.name, rows = table.row_count(), "SQLite table loaded");
    }
    transaction.commit()?;
    drop(connection);

    tables
        .iter()
        .map(|table| ArtifactInfo::for_file(&table.name, "sqlite", &path, table.row_count()))
        .collect()
}
