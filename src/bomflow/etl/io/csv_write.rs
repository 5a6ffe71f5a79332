use std::path::Path;

use tracing::debug;

use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::io::ArtifactInfo;
use crate::bomflow::etl::model::Table;

/// Writes each table to `<dir>/<table>.csv` with a header row.
///
/// Dates are rendered as `YYYY-MM-DD` and nulls as empty fields.
pub fn write_tables(dir: &Path, tables: &[Table]) -> Result<Vec<ArtifactInfo>> {
    tables
        .iter()
        .map(|table| {
            let path = dir.join(format!("{}.csv", table.name));
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(table.columns.iter().map(|column| column.name.as_str()))?;
            for row in &table.rows {
                writer.write_record(row.iter().map(|cell| cell.to_string()))?;
            }
            writer.flush()?;
            drop(writer);
            debug!(table = %table.name, rows = table.row_count(), "CSV written");
            ArtifactInfo::for_file(&table.name, "csv", &path, table.row_count())
        })
        .collect()
}
