//! Suburb and reference-area label matching.
//!
//! Both the suburb filter and the reference-area test compare normalized
//! labels (trimmed, uppercased, whitespace collapsed). A label matches the
//! reference area when the whole label, or any comma-separated part of it,
//! equals the reference name, so `"Spring Hill, Brisbane City"` is inside
//! `BRISBANE CITY`.

use trip_flows_trip_models::{Classification, normalize_suburb_name};

/// The fixed zone that trips are classified against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceArea {
    name: String,
    normalized: String,
}

impl ReferenceArea {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            normalized: normalize_suburb_name(name),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a suburb label lies in the reference area. Unmatched
    /// (`None`) labels never do.
    #[must_use]
    pub fn contains(&self, label: Option<&str>) -> bool {
        let Some(label) = label else {
            return false;
        };
        if self.normalized.is_empty() {
            return false;
        }
        normalize_suburb_name(label) == self.normalized
            || label
                .split(',')
                .any(|part| normalize_suburb_name(part) == self.normalized)
    }

    /// Classifies a single trip by its two suburb labels.
    ///
    /// A trip can be both inbound and outbound when both ends lie in the
    /// reference area; neither end gives [`Classification::Other`].
    #[must_use]
    pub fn classify_pair(
        &self,
        origin_suburb: Option<&str>,
        destination_suburb: Option<&str>,
    ) -> &'static [Classification] {
        match (self.contains(destination_suburb), self.contains(origin_suburb)) {
            (true, true) => &[Classification::Inbound, Classification::Outbound],
            (true, false) => &[Classification::Inbound],
            (false, true) => &[Classification::Outbound],
            (false, false) => &[Classification::Other],
        }
    }
}

/// Whether `label` names the same suburb as `target` after normalization.
#[must_use]
pub fn same_suburb(label: Option<&str>, target: &str) -> bool {
    label.is_some_and(|label| normalize_suburb_name(label) == normalize_suburb_name(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_whole_label_or_component() {
        let area = ReferenceArea::new("Brisbane City");
        assert!(area.contains(Some("BRISBANE CITY")));
        assert!(area.contains(Some("  brisbane   city ")));
        assert!(area.contains(Some("Spring Hill, Brisbane City")));
        assert!(!area.contains(Some("Brisbane City Council Depot")));
        assert!(!area.contains(Some("Logan City")));
        assert!(!area.contains(None));
    }

    #[test]
    fn empty_reference_matches_nothing() {
        let area = ReferenceArea::new("   ");
        assert!(!area.contains(Some("")));
        assert!(!area.contains(Some("Spring Hill")));
    }

    #[test]
    fn classifies_pairs() {
        let area = ReferenceArea::new("BRISBANE CITY");
        assert_eq!(
            area.classify_pair(Some("LOGAN CITY"), Some("BRISBANE CITY")),
            &[Classification::Inbound]
        );
        assert_eq!(
            area.classify_pair(Some("BRISBANE CITY"), Some("LOGAN CITY")),
            &[Classification::Outbound]
        );
        assert_eq!(
            area.classify_pair(Some("BRISBANE CITY"), Some("BRISBANE CITY")),
            &[Classification::Inbound, Classification::Outbound]
        );
        assert_eq!(
            area.classify_pair(Some("LOGAN CITY"), None),
            &[Classification::Other]
        );
    }

    #[test]
    fn compares_suburbs_after_normalization() {
        assert!(same_suburb(Some(" spring  hill"), "SPRING HILL"));
        assert!(!same_suburb(Some("SPRING HILL, BRISBANE CITY"), "SPRING HILL"));
        assert!(!same_suburb(None, "SPRING HILL"));
    }
}
