use bomflow_etl::model::CellValue;
use bomflow_etl::normalize::{clean_id, parse_count, parse_percentage};
use proptest::prelude::*;

proptest! {
    #[test]
    fn clean_id_is_idempotent(raw in "\\PC{0,24}") {
        let once = clean_id(&raw);
        prop_assert_eq!(clean_id(&once), once.clone());
        prop_assert!(!once.starts_with(' ') && !once.ends_with(' '));
    }

    #[test]
    fn clean_id_keeps_only_identifier_characters(raw in "[ -~]{0,24}") {
        let cleaned = clean_id(&raw);
        prop_assert!(cleaned
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == ' '));
    }

    #[test]
    fn numeric_percentages_are_fractions_or_null(value in -1_000.0f64..1_000.0) {
        if let Some(fraction) = parse_percentage(&CellValue::Float(value)) {
            prop_assert!((0.0..=1.0).contains(&fraction));
        }
    }

    #[test]
    fn text_percentages_are_fractions_or_null(text in "[0-9 .,%-]{0,8}") {
        if let Some(fraction) = parse_percentage(&CellValue::Text(text)) {
            prop_assert!((0.0..=1.0).contains(&fraction));
        }
    }

    #[test]
    fn counts_are_never_negative(value in any::<i64>()) {
        if let Some(count) = parse_count(&CellValue::Int(value)) {
            prop_assert!(count >= 0);
        }
    }
}
