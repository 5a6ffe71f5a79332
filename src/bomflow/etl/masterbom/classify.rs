use crate::bomflow::etl::config::{MatchKind, StatusRule};
use crate::bomflow::etl::model::StatusClass;

/// Ordered, case-insensitive status rule table. The first matching rule wins.
#[derive(Debug, Clone)]
pub struct StatusRules {
    rules: Vec<(String, MatchKind, StatusClass)>,
    default_class: StatusClass,
}

/// Outcome of classifying one raw status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Matched(StatusClass),
    /// No rule matched; carries the configured default class.
    Fallback(StatusClass),
}

impl Classification {
    pub fn class(self) -> StatusClass {
        match self {
            Classification::Matched(class) | Classification::Fallback(class) => class,
        }
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect()
}

fn contains_words(raw: &str, pattern: &str) -> bool {
    let wanted = words(pattern);
    !wanted.is_empty()
        && words(raw)
            .windows(wanted.len())
            .any(|window| window == wanted.as_slice())
}

impl StatusRules {
    pub fn new(rules: &[StatusRule], default_class: StatusClass) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|rule| (rule.pattern.trim().to_lowercase(), rule.kind, rule.class))
                .collect(),
            default_class,
        }
    }

    pub fn classify(&self, raw: &str) -> Classification {
        let raw = raw.trim().to_lowercase();
        self.rules
            .iter()
            .find(|(pattern, kind, _)| match kind {
                MatchKind::Exact => raw == *pattern,
                MatchKind::Contains => raw.contains(pattern.as_str()),
                MatchKind::Word => contains_words(&raw, pattern),
            })
            .map(|(_, _, class)| Classification::Matched(*class))
            .unwrap_or(Classification::Fallback(self.default_class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bomflow::etl::config::MasterBomConfig;

    fn default_rules() -> StatusRules {
        let config = MasterBomConfig::default();
        StatusRules::new(&config.status_rules, config.default_class)
    }

    #[test]
    fn single_letter_codes() {
        let rules = default_rules();
        assert_eq!(rules.classify("X").class(), StatusClass::Active);
        assert_eq!(rules.classify(" d ").class(), StatusClass::Inactive);
        assert_eq!(rules.classify("0").class(), StatusClass::Duplicate);
        assert_eq!(rules.classify("N").class(), StatusClass::New);
    }

    #[test]
    fn inactive_is_checked_before_active() {
        let rules = default_rules();
        assert_eq!(rules.classify("Inactive").class(), StatusClass::Inactive);
        assert_eq!(rules.classify("Active").class(), StatusClass::Active);
        assert_eq!(rules.classify("NOK").class(), StatusClass::Inactive);
        assert_eq!(rules.classify("OK").class(), StatusClass::Active);
    }

    #[test]
    fn negated_ok_is_inactive_and_ok_needs_a_whole_word() {
        let rules = default_rules();
        assert_eq!(rules.classify("Not OK").class(), StatusClass::Inactive);
        assert_eq!(rules.classify("PPAP ok").class(), StatusClass::Active);
        assert_eq!(
            rules.classify("booked"),
            Classification::Fallback(StatusClass::Unknown)
        );
    }

    #[test]
    fn unmatched_strings_fall_back_to_unknown() {
        let rules = default_rules();
        assert_eq!(
            rules.classify("pending review"),
            Classification::Fallback(StatusClass::Unknown)
        );
    }

    #[test]
    fn injected_tables_do_not_interfere() {
        let strict = StatusRules::new(
            &[StatusRule::exact("y", StatusClass::Active)],
            StatusClass::Inactive,
        );
        assert_eq!(strict.classify("X").class(), StatusClass::Inactive);
        assert_eq!(default_rules().classify("X").class(), StatusClass::Active);
    }
}
