//! Shared calendar dimension built from every date-typed column.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};
use tracing::{info, instrument};

use crate::bomflow::etl::config::DateConfig;
use crate::bomflow::etl::model::{
    CellValue, ColumnType, DateDimensionRow, DateRoleBridgeRow, Table,
};

/// Calendar rows plus the table/column roles that reference them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateDimension {
    pub rows: Vec<DateDimensionRow>,
    pub bridge: Vec<DateRoleBridgeRow>,
}

/// Builds the date dimension over the date columns of `tables`.
///
/// Dates are emitted once each, in ascending order. With a contiguous
/// calendar every day between the first and last observed date is present.
#[instrument(level = "info", skip_all, fields(tables = tables.len()))]
pub fn build(tables: &[&Table], config: &DateConfig) -> DateDimension {
    let mut all_dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut bridge = Vec::new();

    for table in tables {
        for (index, column) in table.columns.iter().enumerate() {
            if column.kind != ColumnType::Date {
                continue;
            }
            let dates: BTreeSet<NaiveDate> = table
                .column_values(index)
                .filter_map(|cell| match cell {
                    CellValue::Date(date) => Some(*date),
                    _ => None,
                })
                .collect();
            let (Some(min_date), Some(max_date)) = (dates.first(), dates.last()) else {
                continue;
            };
            bridge.push(DateRoleBridgeRow {
                table_name: table.name.clone(),
                role: column.name.clone(),
                distinct_dates: dates.len(),
                min_date: *min_date,
                max_date: *max_date,
            });
            all_dates.extend(dates);
        }
    }

    if config.contiguous_calendar {
        if let (Some(first), Some(last)) = (all_dates.first().copied(), all_dates.last().copied()) {
            all_dates.extend(first.iter_days().take_while(|day| *day <= last));
        }
    }

    let rows: Vec<DateDimensionRow> = all_dates
        .into_iter()
        .map(|date| calendar_row(date, config.fiscal_year_end_month))
        .collect();
    info!(dates = rows.len(), roles = bridge.len(), "date dimension built");
    DateDimension { rows, bridge }
}

/// Calendar attributes for one date.
pub fn calendar_row(date: NaiveDate, fiscal_year_end_month: u32) -> DateDimensionRow {
    let year = date.year();
    let month = date.month();
    let day = date.day();
    let is_month_end = date.succ_opt().is_none_or(|next| next.month() != month);
    let fiscal_year = if fiscal_year_end_month >= 12 || month <= fiscal_year_end_month {
        year
    } else {
        year + 1
    };
    DateDimensionRow {
        date,
        date_key: i64::from(year) * 10_000 + i64::from(month) * 100 + i64::from(day),
        year,
        month,
        month_name: date.format("%B").to_string(),
        month_year: date.format("%b %Y").to_string(),
        month_year_sort: i64::from(year) * 100 + i64::from(month),
        day,
        quarter: (month - 1) / 3 + 1,
        iso_week: date.iso_week().week(),
        weekday: date.format("%A").to_string(),
        is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        is_month_end,
        is_quarter_end: is_month_end && month % 3 == 0,
        is_year_end: month == 12 && day == 31,
        fiscal_year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bomflow::etl::model::Column;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn table(name: &str, column: &str, dates: &[Option<NaiveDate>]) -> Table {
        let mut table = Table::new(
            name,
            vec![Column::new("id", ColumnType::Text), Column::new(column, ColumnType::Date)],
        );
        for (index, value) in dates.iter().enumerate() {
            table.push_row(vec![CellValue::Text(index.to_string()), CellValue::from(*value)]);
        }
        table
    }

    #[test]
    fn collects_distinct_dates_across_tables() {
        let parts = table(
            "fact_parts",
            "latest_approved_date",
            &[Some(date(2024, 3, 31)), Some(date(2024, 1, 5)), None],
        );
        let status = table(
            "status_clean",
            "milestone_date",
            &[Some(date(2024, 3, 31)), Some(date(2024, 12, 31))],
        );
        let dimension = build(&[&parts, &status], &DateConfig::default());
        let dates: Vec<NaiveDate> = dimension.rows.iter().map(|row| row.date).collect();
        assert_eq!(dates, vec![date(2024, 1, 5), date(2024, 3, 31), date(2024, 12, 31)]);
        assert_eq!(dimension.bridge.len(), 2);
        assert_eq!(dimension.bridge[0].distinct_dates, 2);
        assert_eq!(dimension.bridge[0].min_date, date(2024, 1, 5));
        assert_eq!(dimension.bridge[1].role, "milestone_date");
    }

    #[test]
    fn columns_without_dates_have_no_bridge_row() {
        let empty = table("fact_parts", "latest_approved_date", &[None]);
        let dimension = build(&[&empty], &DateConfig::default());
        assert!(dimension.rows.is_empty());
        assert!(dimension.bridge.is_empty());
    }

    #[test]
    fn contiguous_calendar_fills_gaps() {
        let sparse = table("t", "d", &[Some(date(2024, 2, 27)), Some(date(2024, 3, 2))]);
        let config = DateConfig {
            contiguous_calendar: true,
            ..DateConfig::default()
        };
        let dimension = build(&[&sparse], &config);
        assert_eq!(dimension.rows.len(), 5);
    }

    #[test]
    fn calendar_attributes() {
        let row = calendar_row(date(2024, 3, 31), 12);
        assert_eq!(row.date_key, 20240331);
        assert_eq!(row.month_name, "March");
        assert_eq!(row.month_year, "Mar 2024");
        assert_eq!(row.month_year_sort, 202403);
        assert_eq!(row.quarter, 1);
        assert_eq!(row.weekday, "Sunday");
        assert!(row.is_weekend);
        assert!(row.is_month_end);
        assert!(row.is_quarter_end);
        assert!(!row.is_year_end);
        assert_eq!(row.fiscal_year, 2024);
        assert_eq!(calendar_row(date(2024, 7, 1), 3).fiscal_year, 2025);
        assert_eq!(calendar_row(date(2024, 3, 1), 3).fiscal_year, 2024);
    }
}
