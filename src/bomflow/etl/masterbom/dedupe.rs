use std::collections::HashMap;

use crate::bomflow::etl::config::TieBreaker;
use crate::bomflow::etl::model::{PlantItemStatus, StatusClass};

/// Whether `supplier` names one of `tags` as a whole word, ignoring case.
pub fn has_supplier_tag(supplier: &str, tags: &[String]) -> bool {
    supplier
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| tags.iter().any(|tag| token.eq_ignore_ascii_case(tag.trim())))
}

/// Narrows `candidates` with one tie-breaker. Returns the survivors.
fn apply(
    breaker: &TieBreaker,
    candidates: Vec<usize>,
    entries: &[PlantItemStatus],
    supplier_of: &dyn Fn(&PlantItemStatus) -> Option<String>,
) -> Vec<usize> {
    match breaker {
        TieBreaker::SupplierTag { tags } => {
            let preferred: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|index| {
                    supplier_of(&entries[*index])
                        .map(|supplier| has_supplier_tag(&supplier, tags))
                        .unwrap_or(false)
                })
                .collect();
            if preferred.is_empty() {
                candidates
            } else {
                preferred
            }
        }
        TieBreaker::SourceOrder => candidates
            .iter()
            .copied()
            .min_by_key(|index| entries[*index].source_row)
            .into_iter()
            .collect(),
    }
}

/// Resolves entries sharing a (part, plant) key so exactly one stays
/// authoritative.
///
/// Tie-breakers run in order until one leaves a single candidate. Losers keep
/// their raw status but are reclassified as duplicates and annotated with the
/// winning row. Returns the number of superseded entries.
pub fn resolve_duplicates(
    entries: &mut [PlantItemStatus],
    tie_breakers: &[TieBreaker],
    supplier_of: &dyn Fn(&PlantItemStatus) -> Option<String>,
) -> usize {
    let mut groups: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
    let mut order: Vec<(&str, &str)> = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let key = (entry.part_id_std.as_str(), entry.project_plant.as_str());
        let group = groups.entry(key).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push(index);
    }

    let mut superseded: Vec<(usize, usize, &'static str)> = Vec::new();
    for key in order {
        let members = &groups[&key];
        if members.len() < 2 {
            continue;
        }
        let mut candidates = members.clone();
        let mut rule = TieBreaker::SourceOrder.name();
        for breaker in tie_breakers {
            candidates = apply(breaker, candidates, entries, supplier_of);
            if candidates.len() == 1 {
                rule = breaker.name();
                break;
            }
        }
        // Fall back to sheet order when the configured rules leave a tie.
        let winner = candidates
            .iter()
            .copied()
            .min_by_key(|index| entries[*index].source_row)
            .unwrap_or(members[0]);
        for &loser in members.iter().filter(|index| **index != winner) {
            superseded.push((loser, winner, rule));
        }
    }

    for (loser, winner, rule) in &superseded {
        let winner_row = entries[*winner].source_row;
        let entry = &mut entries[*loser];
        entry.status_class = StatusClass::Duplicate;
        entry.is_duplicate_entry = true;
        entry.is_new = false;
        entry.notes = Some(format!("superseded by row {winner_row} ({rule})"));
    }
    superseded.len()
}
