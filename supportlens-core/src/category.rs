//! Category registry — the closed, ordered set of support topic labels.
//!
//! Every other component validates category data against this module, so the
//! label strings written to storage always match the label strings the
//! classifier is allowed to emit. `Error` is synthetic: it marks degraded
//! outcomes and is never assignable by a successful classification.

use serde::{Deserialize, Serialize};

/// Maximum number of categories a single trace may carry.
pub const MAX_CATEGORIES_PER_TRACE: usize = 2;

/// A support topic label from the closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Billing,
    Refund,
    #[serde(rename = "Account Access")]
    AccountAccess,
    Cancellation,
    #[serde(rename = "General Inquiry")]
    GeneralInquiry,
    Error,
}

/// The full registry, in display order. Includes the synthetic `Error` label.
pub const REGISTRY: [Category; 6] = [
    Category::Billing,
    Category::Refund,
    Category::AccountAccess,
    Category::Cancellation,
    Category::GeneralInquiry,
    Category::Error,
];

/// The labels the external classifier may assign (registry minus `Error`).
pub const ASSIGNABLE: [Category; 5] = [
    Category::Billing,
    Category::Refund,
    Category::AccountAccess,
    Category::Cancellation,
    Category::GeneralInquiry,
];

impl Category {
    /// The canonical label string, as stored and as sent over the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Billing => "Billing",
            Category::Refund => "Refund",
            Category::AccountAccess => "Account Access",
            Category::Cancellation => "Cancellation",
            Category::GeneralInquiry => "General Inquiry",
            Category::Error => "Error",
        }
    }

    /// Parse a label string. Exact match only; no fuzzy matching.
    pub fn parse(label: &str) -> Option<Category> {
        REGISTRY.iter().copied().find(|c| c.as_str() == label)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a label string names a registry category.
pub fn is_valid(label: &str) -> bool {
    Category::parse(label).is_some()
}

/// Normalize a raw label list into a stored category set.
///
/// Filters to assignable registry labels (unknown labels and the reserved
/// `Error` label are dropped), deduplicates keeping first-seen order, and
/// truncates to [`MAX_CATEGORIES_PER_TRACE`]. An empty result collapses to
/// `[General Inquiry]`, so the returned set is never empty.
pub fn normalize<I, S>(labels: I) -> Vec<Category>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::with_capacity(MAX_CATEGORIES_PER_TRACE);
    for label in labels {
        if let Some(category) = Category::parse(label.as_ref().trim()) {
            if category != Category::Error && !out.contains(&category) {
                out.push(category);
            }
        }
        if out.len() == MAX_CATEGORIES_PER_TRACE {
            break;
        }
    }
    if out.is_empty() {
        out.push(Category::GeneralInquiry);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_every_registry_label() {
        for category in REGISTRY {
            assert_eq!(Category::parse(category.as_str()), Some(category));
        }
    }

    #[test]
    fn test_is_valid_rejects_unknown_and_case_variants() {
        assert!(is_valid("Billing"));
        assert!(is_valid("Account Access"));
        assert!(!is_valid("billing"));
        assert!(!is_valid("Shipping"));
        assert!(!is_valid(""));
    }

    #[test]
    fn test_serde_uses_display_labels() {
        let json = serde_json::to_string(&Category::AccountAccess).unwrap();
        assert_eq!(json, "\"Account Access\"");
        let back: Category = serde_json::from_str("\"General Inquiry\"").unwrap();
        assert_eq!(back, Category::GeneralInquiry);
    }

    #[test]
    fn test_normalize_dedups_preserving_first_seen_order() {
        let result = normalize(["Refund", "Refund", "Billing"]);
        assert_eq!(result, vec![Category::Refund, Category::Billing]);
    }

    #[test]
    fn test_normalize_truncates_to_two() {
        let result = normalize(["Billing", "Refund", "Cancellation"]);
        assert_eq!(result, vec![Category::Billing, Category::Refund]);
    }

    #[test]
    fn test_normalize_drops_unknown_labels() {
        let result = normalize(["Shipping", "Refund", "nonsense"]);
        assert_eq!(result, vec![Category::Refund]);
    }

    #[test]
    fn test_normalize_empty_input_defaults_to_general_inquiry() {
        let result = normalize(Vec::<String>::new());
        assert_eq!(result, vec![Category::GeneralInquiry]);
    }

    #[test]
    fn test_normalize_all_invalid_defaults_to_general_inquiry() {
        let result = normalize(["Shipping", "Returns"]);
        assert_eq!(result, vec![Category::GeneralInquiry]);
    }

    #[test]
    fn test_normalize_drops_reserved_error_label() {
        // `Error` is only ever produced by the degraded path, never accepted
        // from external input.
        let result = normalize(["Error", "Billing"]);
        assert_eq!(result, vec![Category::Billing]);
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        let result = normalize(["  Billing ", "Refund"]);
        assert_eq!(result, vec![Category::Billing, Category::Refund]);
    }
}
