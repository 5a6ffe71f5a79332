//! MasterBOM column identification.
//!
//! The identifier column is located first, then date columns, and whatever
//! remains is split into plant and attribute columns by a [`ColumnClassifier`].

use regex::Regex;

use crate::bomflow::etl::config::{MasterBomConfig, PlantColumnStrategy, compile_pattern};
use crate::bomflow::etl::error::{EtlError, Result, Warnings};
use crate::bomflow::etl::model::RawSheet;
use crate::bomflow::etl::normalize::{
    DateColumn, DateDetection, date_column, detect_date_columns, normalize_header,
};

/// Role of a non-identifier, non-date column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRole {
    /// A plant/project column carrying per-plant status codes.
    Plant(String),
    Attribute,
}

/// Decides whether a header label names a plant column.
pub trait ColumnClassifier: Send + Sync {
    fn classify(&self, label: &str) -> ColumnRole;
}

/// Plant columns are headers shaped like plant codes, such as `K1` or `PLANT-01`.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    pattern: Regex,
    attribute_names: Vec<String>,
}

impl PatternClassifier {
    pub fn new(pattern: &str, attribute_names: &[String]) -> Result<Self> {
        Ok(Self {
            pattern: compile_pattern(pattern)?,
            attribute_names: attribute_names.iter().map(|name| normalize_header(name)).collect(),
        })
    }
}

impl ColumnClassifier for PatternClassifier {
    fn classify(&self, label: &str) -> ColumnRole {
        let label = label.trim();
        let known_attribute = self.attribute_names.contains(&normalize_header(label));
        if !known_attribute
            && label.chars().any(|c| c.is_ascii_digit())
            && self.pattern.is_match(label)
        {
            ColumnRole::Plant(label.to_string())
        } else {
            ColumnRole::Attribute
        }
    }
}

/// Plant columns are exactly the configured labels.
#[derive(Debug, Clone)]
pub struct ExplicitClassifier {
    labels: Vec<String>,
}

impl ExplicitClassifier {
    pub fn new(labels: &[String]) -> Self {
        Self {
            labels: labels.iter().map(|label| normalize_header(label)).collect(),
        }
    }
}

impl ColumnClassifier for ExplicitClassifier {
    fn classify(&self, label: &str) -> ColumnRole {
        if self.labels.contains(&normalize_header(label)) {
            ColumnRole::Plant(label.trim().to_string())
        } else {
            ColumnRole::Attribute
        }
    }
}

/// Builds the classifier selected by configuration.
pub fn classifier_from_config(strategy: &PlantColumnStrategy) -> Result<Box<dyn ColumnClassifier>> {
    Ok(match strategy {
        PlantColumnStrategy::Pattern {
            pattern,
            attribute_names,
        } => Box::new(PatternClassifier::new(pattern, attribute_names)?),
        PlantColumnStrategy::Explicit { labels } => Box::new(ExplicitClassifier::new(labels)),
    })
}

/// Resolved MasterBOM column layout.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    pub id: usize,
    pub dates: Vec<DateColumn>,
    /// Plant column indexes and their plant codes, in sheet order.
    pub plants: Vec<(usize, String)>,
    pub attributes: Vec<usize>,
}

impl ColumnLayout {
    pub fn is_date(&self, index: usize) -> bool {
        self.dates.iter().any(|column| column.index == index)
    }
}

fn alphanumeric_key(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Finds the identifier column: exact (case and whitespace insensitive)
/// match first, then a match on alphanumerics only.
pub fn find_id_column(sheet: &RawSheet, expected: &str) -> Result<usize> {
    let wanted = normalize_header(expected);
    if let Some(index) = sheet
        .headers
        .iter()
        .position(|header| normalize_header(header) == wanted)
    {
        return Ok(index);
    }
    let wanted = alphanumeric_key(expected);
    sheet
        .headers
        .iter()
        .position(|header| !wanted.is_empty() && alphanumeric_key(header) == wanted)
        .ok_or_else(|| EtlError::MissingIdColumn {
            expected: expected.to_string(),
            sheet: sheet.name.clone(),
        })
}

/// Resolves the identifier, date, plant and attribute columns of a sheet.
pub fn identify_columns(
    sheet: &RawSheet,
    config: &MasterBomConfig,
    detection: &DateDetection,
    classifier: &dyn ColumnClassifier,
    warnings: &mut Warnings,
) -> Result<ColumnLayout> {
    let id = find_id_column(sheet, &config.id_column)?;

    let excluded: Vec<String> = config
        .excluded_date_columns
        .iter()
        .map(|name| normalize_header(name))
        .collect();

    let dates = match &config.date_columns {
        Some(names) => names
            .iter()
            .filter_map(|name| {
                let wanted = normalize_header(name);
                let index = sheet
                    .headers
                    .iter()
                    .position(|header| normalize_header(header) == wanted);
                if index.is_none() {
                    warnings.push(
                        format!("column '{name}'"),
                        "configured date column not present in sheet",
                    );
                }
                index
            })
            .filter(|index| *index != id)
            .map(|index| date_column(sheet, index, detection))
            .collect(),
        None => {
            let candidates: Vec<usize> = (0..sheet.headers.len())
                .filter(|index| *index != id)
                .filter(|index| !excluded.contains(&normalize_header(&sheet.headers[*index])))
                .collect();
            detect_date_columns(sheet, &candidates, detection)
        }
    };

    let mut plants = Vec::new();
    let mut attributes = Vec::new();
    for (index, header) in sheet.headers.iter().enumerate() {
        if index == id || dates.iter().any(|column| column.index == index) {
            continue;
        }
        if header.starts_with("unnamed_") {
            attributes.push(index);
            continue;
        }
        match classifier.classify(header) {
            ColumnRole::Plant(code) => plants.push((index, code)),
            ColumnRole::Attribute => attributes.push(index),
        }
    }

    if plants.is_empty() {
        warnings.push(format!("sheet '{}'", sheet.name), "no plant columns identified");
    }

    Ok(ColumnLayout {
        id,
        dates,
        plants,
        attributes,
    })
}
