//! Status sheet rules: header mapping, typed coercion, derived completion
//! metrics and the per-plant completion rollup.

use std::collections::HashMap;

use tracing::{debug, info, instrument};

use crate::bomflow::etl::config::{CompletionThresholds, HeaderMapping, StatusConfig, StatusField};
use crate::bomflow::etl::error::{Result, RunWarning, Stage, Warnings};
use crate::bomflow::etl::model::{CellValue, ProjectCompletion, RawSheet, StatusRecord};
use crate::bomflow::etl::normalize::{
    normalize_header, parse_count, parse_date, parse_percentage, standardize_text,
};

/// Output of the Status processor.
#[derive(Debug, Clone)]
pub struct StatusOutput {
    pub records: Vec<StatusRecord>,
    pub completion: Vec<ProjectCompletion>,
    /// Canonical fields and the source headers they were read from.
    pub mapped: Vec<(StatusField, String)>,
    pub warnings: Vec<RunWarning>,
}

fn tokens(value: &str) -> Vec<&str> {
    value
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_percent_label(value: &str) -> bool {
    value.contains('%') || tokens(value).iter().any(|token| *token == "percent" || *token == "pct")
}

/// Whether a normalized header satisfies a mapping key on the fallback path.
fn loosely_matches(header: &str, key: &str) -> bool {
    let header_tokens = tokens(header);
    let key_tokens = tokens(key);
    if key_tokens.is_empty() || is_percent_label(key) != is_percent_label(header) {
        return false;
    }
    key_tokens
        .iter()
        .filter(|token| **token != "percent" && **token != "pct")
        .all(|token| header_tokens.contains(token))
}

/// Maps source columns onto canonical fields.
///
/// Exact matches on the normalized header are resolved first, then a looser
/// pass requiring every word of the key. Each field and each column is used
/// at most once. Returns `(column index, field)` pairs in column order.
pub fn map_headers(headers: &[String], mappings: &[HeaderMapping]) -> Vec<(usize, StatusField)> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut assigned: Vec<Option<StatusField>> = vec![None; headers.len()];
    let mut claimed: Vec<StatusField> = Vec::new();

    for mapping in mappings {
        let key = normalize_header(&mapping.header);
        if claimed.contains(&mapping.field) {
            continue;
        }
        if let Some(index) =
            (0..headers.len()).find(|index| assigned[*index].is_none() && normalized[*index] == key)
        {
            assigned[index] = Some(mapping.field);
            claimed.push(mapping.field);
        }
    }

    for mapping in mappings {
        let key = normalize_header(&mapping.header);
        if claimed.contains(&mapping.field) {
            continue;
        }
        if let Some(index) = (0..headers.len())
            .find(|index| assigned[*index].is_none() && loosely_matches(&normalized[*index], &key))
        {
            assigned[index] = Some(mapping.field);
            claimed.push(mapping.field);
        }
    }

    assigned
        .into_iter()
        .enumerate()
        .filter_map(|(index, field)| field.map(|field| (index, field)))
        .collect()
}

/// Applies the Status rules to a raw sheet.
#[instrument(level = "info", skip_all, fields(sheet = %sheet.name, rows = sheet.rows.len()))]
pub fn process(sheet: &RawSheet, config: &StatusConfig) -> Result<StatusOutput> {
    let mut warnings = Warnings::new(Stage::Status);

    let mut row_limit = sheet.rows.len();
    if config.truncate_at_blank_row {
        if let Some(gap) = sheet
            .row_numbers
            .windows(2)
            .position(|pair| pair[1] > pair[0] + 1)
        {
            row_limit = gap + 1;
            debug!(
                kept_rows = row_limit,
                dropped_rows = sheet.rows.len() - row_limit,
                "truncated at first blank row"
            );
        }
    }

    let populated: Vec<usize> = (0..sheet.headers.len())
        .filter(|column| (0..row_limit).any(|row| !sheet.cell(row, *column).is_blank()))
        .collect();
    let populated_headers: Vec<String> = populated
        .iter()
        .map(|column| sheet.headers[*column].clone())
        .collect();

    let mapping = map_headers(&populated_headers, &config.header_map);
    for (position, header) in populated_headers.iter().enumerate() {
        if !mapping.iter().any(|(index, _)| *index == position) {
            warnings.push(format!("column '{header}'"), "unmapped Status column dropped");
        }
    }
    let columns: Vec<(usize, StatusField)> = mapping
        .iter()
        .map(|(position, field)| (populated[*position], *field))
        .collect();
    info!(
        mapped = columns.len(),
        dropped = populated.len() - columns.len(),
        "Status headers mapped"
    );

    let mut records = Vec::with_capacity(row_limit);
    for row in 0..row_limit {
        let source_row = sheet.source_row_number(row);
        let mut record = StatusRecord {
            source_row,
            ..StatusRecord::default()
        };
        for (column, field) in &columns {
            let cell = sheet.cell(row, *column);
            if cell.is_blank() {
                continue;
            }
            let context = || format!("row {source_row}, field {field}");
            apply_field(&mut record, *field, cell, &mut warnings, context);
        }
        derive_metrics(&mut record, &mut warnings);
        records.push(record);
    }

    let completion = completion_by_plant(&records, &config.thresholds, &mut warnings);
    info!(
        records = records.len(),
        plants = completion.len(),
        warnings = warnings.len(),
        "Status processed"
    );

    Ok(StatusOutput {
        records,
        completion,
        mapped: columns
            .iter()
            .map(|(column, field)| (*field, sheet.headers[*column].clone()))
            .collect(),
        warnings: warnings.into_vec(),
    })
}

fn apply_field(
    record: &mut StatusRecord,
    field: StatusField,
    cell: &CellValue,
    warnings: &mut Warnings,
    context: impl Fn() -> String,
) {
    let text = || cell.to_text().map(|value| standardize_text(&value));
    let date = |warnings: &mut Warnings| {
        let parsed = parse_date(cell);
        if parsed.is_none() {
            warnings.push(context(), format!("unparseable date '{cell}' set to null"));
        }
        parsed
    };
    let count = |warnings: &mut Warnings| {
        let parsed = parse_count(cell);
        if parsed.is_none() {
            warnings.push(context(), format!("invalid count '{cell}' set to null"));
        }
        parsed
    };
    let percentage = |warnings: &mut Warnings| {
        let parsed = parse_percentage(cell);
        if parsed.is_none() {
            warnings.push(context(), format!("percentage '{cell}' outside [0, 1] set to null"));
        }
        parsed
    };

    match field {
        StatusField::PlantId => record.plant_id = text(),
        StatusField::Oem => record.oem = text(),
        StatusField::Sqe => record.sqe = text(),
        StatusField::CompletionStatus => record.completion_status = text(),
        StatusField::MilestoneDate => record.milestone_date = date(warnings),
        StatusField::BomFileDate => record.bom_file_date = date(warnings),
        StatusField::TotalParts => record.total_parts = count(warnings),
        StatusField::PswAvailable => record.psw_available = count(warnings),
        StatusField::DrawingAvailable => record.drawing_available = count(warnings),
        StatusField::ImdsTotal => record.imds_total = count(warnings),
        StatusField::M2Parts => record.m2_parts = count(warnings),
        StatusField::M2PartsPswOk => record.m2_parts_psw_ok = count(warnings),
        StatusField::PswCompletionPct => record.psw_completion_pct = percentage(warnings),
        StatusField::DrawingCompletionPct => record.drawing_completion_pct = percentage(warnings),
        StatusField::ImdsCompletionPct => record.imds_completion_pct = percentage(warnings),
    }
}

fn ratio(
    numerator: Option<i64>,
    denominator: Option<i64>,
    name: &str,
    source_row: usize,
    warnings: &mut Warnings,
) -> Option<f64> {
    let (numerator, denominator) = (numerator?, denominator?);
    if denominator <= 0 {
        return None;
    }
    let value = numerator as f64 / denominator as f64;
    if (0.0..=1.0).contains(&value) {
        Some(value)
    } else {
        warnings.push(
            format!("row {source_row}, field {name}"),
            format!("derived ratio {numerator}/{denominator} outside [0, 1] set to null"),
        );
        None
    }
}

/// Fills percentages the sheet left blank from the raw counts, then computes
/// the PPAP and overall completion.
pub fn derive_metrics(record: &mut StatusRecord, warnings: &mut Warnings) {
    let row = record.source_row;
    if record.psw_completion_pct.is_none() {
        record.psw_completion_pct = ratio(
            record.psw_available,
            record.total_parts,
            StatusField::PswCompletionPct.as_str(),
            row,
            warnings,
        );
    }
    if record.drawing_completion_pct.is_none() {
        record.drawing_completion_pct = ratio(
            record.drawing_available,
            record.total_parts,
            StatusField::DrawingCompletionPct.as_str(),
            row,
            warnings,
        );
    }
    if record.imds_completion_pct.is_none() {
        record.imds_completion_pct = ratio(
            record.imds_total,
            record.total_parts,
            StatusField::ImdsCompletionPct.as_str(),
            row,
            warnings,
        );
    }
    record.ppap_completion_pct = ratio(
        record.m2_parts_psw_ok,
        record.m2_parts,
        "ppap_completion_pct",
        row,
        warnings,
    );
    record.overall_completion_pct = mean([
        record.psw_completion_pct,
        record.drawing_completion_pct,
        record.imds_completion_pct,
        record.ppap_completion_pct,
    ]);
}

fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.into_iter().flatten().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Groups Status records by plant and recomputes their completion status.
pub fn completion_by_plant(
    records: &[StatusRecord],
    thresholds: &CompletionThresholds,
    warnings: &mut Warnings,
) -> Vec<ProjectCompletion> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&StatusRecord>> = HashMap::new();
    for record in records {
        let Some(plant) = record.plant_id.as_deref() else {
            warnings.push(
                format!("row {}", record.source_row),
                "Status row without plant id left out of plant completion",
            );
            continue;
        };
        let group = groups.entry(plant).or_default();
        if group.is_empty() {
            order.push(plant);
        }
        group.push(record);
    }

    order
        .into_iter()
        .map(|plant| {
            let members = &groups[plant];
            let average = |pick: fn(&StatusRecord) -> Option<f64>| {
                mean(members.iter().map(|record| pick(record)))
            };
            let totals: Vec<i64> = members.iter().filter_map(|record| record.total_parts).collect();
            let overall = average(|record| record.overall_completion_pct);
            ProjectCompletion {
                plant_id: plant.to_string(),
                oem: members.iter().find_map(|record| record.oem.clone()),
                entry_count: members.len(),
                total_parts: (!totals.is_empty()).then(|| totals.iter().sum()),
                psw_completion_pct: average(|record| record.psw_completion_pct),
                drawing_completion_pct: average(|record| record.drawing_completion_pct),
                imds_completion_pct: average(|record| record.imds_completion_pct),
                ppap_completion_pct: average(|record| record.ppap_completion_pct),
                overall_completion_pct: overall,
                milestone_date: members
                    .iter()
                    .filter_map(|record| record.milestone_date)
                    .min(),
                completion_status: thresholds.classify(overall).to_string(),
            }
        })
        .collect()
}
