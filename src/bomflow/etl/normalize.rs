//! Value normalizers shared by both rule processors.

use chrono::{Days, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::bomflow::etl::config::{DateConfig, compile_pattern};
use crate::bomflow::etl::error::Result;
use crate::bomflow::etl::model::{CellValue, RawSheet};

/// Standardizes a part identifier into its join key.
///
/// Only ASCII alphanumerics, hyphens, underscores and whitespace survive.
/// Runs of whitespace and underscores collapse to one space and the result
/// is uppercased. Blank input yields an empty string.
pub fn clean_id(raw: &str) -> String {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || c.is_whitespace())
        .collect();
    kept.split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// [`clean_id`] applied to a cell's textual rendering.
pub fn clean_id_cell(cell: &CellValue) -> String {
    cell.to_text().map(|text| clean_id(&text)).unwrap_or_default()
}

/// Trims and collapses internal whitespace.
pub fn standardize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased [`standardize_text`], used for header comparisons.
pub fn normalize_header(value: &str) -> String {
    standardize_text(value).to_lowercase()
}

/// Whether text reads as a plain number, allowing a decimal comma and a
/// trailing percent sign.
pub fn looks_numeric(value: &str) -> bool {
    let trimmed = value.trim().trim_end_matches('%').trim();
    !trimmed.is_empty() && trimmed.replace(',', ".").parse::<f64>().is_ok()
}

/// First serial accepted as a date (1950-01-01).
const EXCEL_SERIAL_MIN: f64 = 18_264.0;
/// Last serial accepted as a date (2099-12-31).
const EXCEL_SERIAL_MAX: f64 = 73_050.0;

fn excel_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Converts a spreadsheet serial day number into a date.
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.floor();
    if !(EXCEL_SERIAL_MIN..=EXCEL_SERIAL_MAX).contains(&days) {
        return None;
    }
    excel_epoch()?.checked_add_days(Days::new(days as u64))
}

/// A single supported date representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateFormat {
    Iso,
    IsoDateTime,
    YearSlash,
    Us,
    Eu,
    Dotted,
    DayMonthNameDash,
    DayMonthNameSpace,
    MonthNameDayYear,
    ExcelSerial,
}

impl DateFormat {
    /// Formats in the order they are tried.
    pub const CANDIDATES: [DateFormat; 10] = [
        DateFormat::Iso,
        DateFormat::IsoDateTime,
        DateFormat::YearSlash,
        DateFormat::Us,
        DateFormat::Eu,
        DateFormat::Dotted,
        DateFormat::DayMonthNameDash,
        DateFormat::DayMonthNameSpace,
        DateFormat::MonthNameDayYear,
        DateFormat::ExcelSerial,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DateFormat::Iso => "%Y-%m-%d",
            DateFormat::IsoDateTime => "%Y-%m-%d %H:%M:%S",
            DateFormat::YearSlash => "%Y/%m/%d",
            DateFormat::Us => "%m/%d/%Y",
            DateFormat::Eu => "%d/%m/%Y",
            DateFormat::Dotted => "%d.%m.%Y",
            DateFormat::DayMonthNameDash => "%d-%b-%Y",
            DateFormat::DayMonthNameSpace => "%d %b %Y",
            DateFormat::MonthNameDayYear => "%b %d, %Y",
            DateFormat::ExcelSerial => "excel_serial",
        }
    }

    fn parse_text(self, text: &str) -> Option<NaiveDate> {
        match self {
            DateFormat::IsoDateTime => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
                .map(|value| value.date()),
            DateFormat::ExcelSerial => text
                .parse::<f64>()
                .ok()
                .and_then(excel_serial_to_date),
            other => NaiveDate::parse_from_str(text, other.name()).ok(),
        }
    }
}

/// Parses a cell with one specific format. Date cells pass through.
pub fn parse_date_with(cell: &CellValue, format: DateFormat) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(date) => Some(*date),
        CellValue::Int(value) if format == DateFormat::ExcelSerial => {
            excel_serial_to_date(*value as f64)
        }
        CellValue::Float(value) if format == DateFormat::ExcelSerial => {
            excel_serial_to_date(*value)
        }
        CellValue::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                format.parse_text(text)
            }
        }
        _ => None,
    }
}

/// Parses a cell by trying every candidate format once.
pub fn parse_date(cell: &CellValue) -> Option<NaiveDate> {
    DateFormat::CANDIDATES
        .iter()
        .find_map(|format| parse_date_with(cell, *format))
}

/// Parses a percentage into a fraction within `[0, 1]`.
///
/// Text with an explicit `%` is divided by 100. Bare values within `[0, 1]`
/// are taken as fractions and values within `(1, 100]` as percents. Anything
/// else, including blanks, yields `None`.
pub fn parse_percentage(cell: &CellValue) -> Option<f64> {
    let (value, explicit) = match cell {
        CellValue::Int(value) => (*value as f64, false),
        CellValue::Float(value) => (*value, false),
        CellValue::Text(text) => {
            let text = text.trim();
            let explicit = text.contains('%');
            let number = text.replace('%', "").replace(',', ".");
            (number.trim().parse::<f64>().ok()?, explicit)
        }
        _ => return None,
    };
    if !value.is_finite() {
        return None;
    }
    let fraction = if explicit {
        value / 100.0
    } else if (0.0..=1.0).contains(&value) {
        value
    } else if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        return None;
    };
    (0.0..=1.0).contains(&fraction).then_some(fraction)
}

/// Parses a non-negative whole count.
pub fn parse_count(cell: &CellValue) -> Option<i64> {
    let value = match cell {
        CellValue::Int(value) => return (*value >= 0).then_some(*value),
        CellValue::Float(value) => *value,
        CellValue::Text(text) => {
            let text = text.trim().replace(' ', "");
            if let Ok(value) = text.parse::<i64>() {
                return (value >= 0).then_some(value);
            }
            text.replace(',', ".").parse::<f64>().ok()?
        }
        _ => return None,
    };
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < i64::MAX as f64)
        .then_some(value as i64)
}

/// Compiled date detection settings.
#[derive(Debug, Clone)]
pub struct DateDetection {
    pub threshold: f64,
    pub sample_size: usize,
    exclude: Vec<Regex>,
}

impl DateDetection {
    pub fn from_config(config: &DateConfig) -> Result<Self> {
        let exclude = config
            .exclude_patterns
            .iter()
            .map(|pattern| compile_pattern(pattern))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            threshold: config.threshold,
            sample_size: config.sample_size,
            exclude,
        })
    }

    /// Whether a header is barred from being a date column.
    pub fn is_excluded(&self, header: &str) -> bool {
        let header = standardize_text(header);
        self.exclude.iter().any(|pattern| pattern.is_match(&header))
    }
}

/// A column recognised as holding dates.
#[derive(Debug, Clone, PartialEq)]
pub struct DateColumn {
    pub index: usize,
    pub name: String,
    /// Format parsing the whole sample, when one exists.
    pub format: Option<DateFormat>,
}

impl DateColumn {
    pub fn parse(&self, cell: &CellValue) -> Option<NaiveDate> {
        match self.format {
            Some(format) => parse_date_with(cell, format),
            None => parse_date(cell),
        }
    }
}

fn sample(sheet: &RawSheet, index: usize, size: usize) -> Vec<&CellValue> {
    sheet
        .column_values(index)
        .filter(|cell| !cell.is_blank())
        .take(size)
        .collect()
}

/// Treats a column as a date column without applying the detection threshold.
pub fn date_column(sheet: &RawSheet, index: usize, detection: &DateDetection) -> DateColumn {
    DateColumn {
        index,
        name: sheet.headers.get(index).cloned().unwrap_or_default(),
        format: column_format(&sample(sheet, index, detection.sample_size)),
    }
}

/// Finds date columns among `candidates` (column indexes of `sheet`).
pub fn detect_date_columns(
    sheet: &RawSheet,
    candidates: &[usize],
    detection: &DateDetection,
) -> Vec<DateColumn> {
    candidates
        .iter()
        .filter_map(|&index| {
            let name = sheet.headers.get(index)?;
            if detection.is_excluded(name) {
                return None;
            }
            let sample = sample(sheet, index, detection.sample_size);
            if sample.is_empty() {
                return None;
            }
            let parsed = sample.iter().filter(|cell| parse_date(cell).is_some()).count();
            if (parsed as f64) / (sample.len() as f64) < detection.threshold {
                return None;
            }
            Some(DateColumn {
                index,
                name: name.clone(),
                format: column_format(&sample),
            })
        })
        .collect()
}

fn column_format(sample: &[&CellValue]) -> Option<DateFormat> {
    let raw: Vec<&&CellValue> = sample
        .iter()
        .filter(|cell| !matches!(cell, CellValue::Date(_)))
        .collect();
    if raw.is_empty() {
        return None;
    }
    DateFormat::CANDIDATES
        .into_iter()
        .find(|format| raw.iter().all(|cell| parse_date_with(cell, *format).is_some()))
}
