use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::io::ArtifactInfo;
use crate::bomflow::etl::model::{CellValue, ColumnType, Table};

fn arrow_type(kind: ColumnType) -> DataType {
    match kind {
        ColumnType::Text => DataType::Utf8,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Date => DataType::Date32,
    }
}

/// Arrow schema mirroring a table's typed columns. Every field is nullable.
pub fn table_schema(table: &Table) -> Arc<Schema> {
    Arc::new(Schema::new(
        table
            .columns
            .iter()
            .map(|column| Field::new(column.name.as_str(), arrow_type(column.kind), true))
            .collect::<Vec<_>>(),
    ))
}

fn days_since_epoch(date: &NaiveDate) -> Option<i32> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    i32::try_from(date.signed_duration_since(epoch).num_days()).ok()
}

fn column_array(table: &Table, index: usize, kind: ColumnType) -> ArrayRef {
    let values = table.column_values(index);
    match kind {
        ColumnType::Text => Arc::new(StringArray::from(
            values.map(CellValue::to_text).collect::<Vec<Option<String>>>(),
        )),
        ColumnType::Integer => Arc::new(Int64Array::from(
            values
                .map(|cell| match cell {
                    CellValue::Int(value) => Some(*value),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            values.map(CellValue::as_f64).collect::<Vec<_>>(),
        )),
        ColumnType::Boolean => Arc::new(BooleanArray::from(
            values
                .map(|cell| match cell {
                    CellValue::Bool(value) => Some(*value),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Date => Arc::new(Date32Array::from(
            values
                .map(|cell| match cell {
                    CellValue::Date(date) => days_since_epoch(date),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Builds a single record batch holding the whole table.
pub fn record_batch(table: &Table) -> Result<RecordBatch> {
    let mut conformed = table.clone();
    conformed.conform();
    let arrays: Vec<ArrayRef> = conformed
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| column_array(&conformed, index, column.kind))
        .collect();
    Ok(RecordBatch::try_new(table_schema(&conformed), arrays)?)
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build()
}

/// Writes each table to `<dir>/<table>.parquet`, snappy compressed.
pub fn write_tables(dir: &Path, tables: &[Table]) -> Result<Vec<ArtifactInfo>> {
    tables
        .iter()
        .map(|table| {
            let path = dir.join(format!("{}.parquet", table.name));
            let batch = record_batch(table)?;
            let file = File::create(&path)?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()))?;
            writer.write(&batch)?;
            writer.close()?;
            debug!(table = %table.name, rows = batch.num_rows(), "Parquet written");
            ArtifactInfo::for_file(&table.name, "parquet", &path, table.row_count())
        })
        .collect()
}
