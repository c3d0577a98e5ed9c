//! Pre-generation validation gate.
//!
//! Pure checks over the SSOT run at the top of the GENERATING stage. Any
//! issue whose code does not contain `WARNING` blocks artifact generation
//! and reverts the job to PRICED.

use serde::{Deserialize, Serialize};

use crate::ssot::{ItemCategory, Ssot, FLAG_TO_BE_VERIFIED_IN_FIELD};

pub const MATH_ERROR: &str = "MATH_ERROR";
pub const RANGE_ERROR: &str = "RANGE_ERROR";
pub const CONSISTENCY_ERROR: &str = "CONSISTENCY_ERROR";
pub const COMPLETENESS_ERROR: &str = "COMPLETENESS_ERROR";
pub const TEMPLATE_ERROR: &str = "TEMPLATE_ERROR";
pub const DUPLICATE_WARNING: &str = "DUPLICATE_WARNING";

/// Subtotal must match the line-item sum to within a cent.
const MATH_TOLERANCE: f64 = 0.01;

/// Plausible dimension ranges in inches, inclusive.
const SHOWER_RANGE: (f64, f64) = (6.0, 240.0);
const MIRROR_RANGE: (f64, f64) = (6.0, 120.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl ValidationIssue {
    fn new(code: &str, message: String, item_id: Option<&str>) -> Self {
        ValidationIssue {
            code: code.to_string(),
            message,
            item_id: item_id.map(|s| s.to_string()),
        }
    }

    pub fn is_blocking(&self) -> bool {
        !self.code.contains("WARNING")
    }
}

/// Run all checks. An empty result means the SSOT may be rendered.
pub fn validate_for_generation(ssot: &Ssot) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let line_items: &[crate::ssot::LineItem] = ssot
        .pricing
        .as_ref()
        .map(|p| p.line_items.as_slice())
        .unwrap_or(&[]);

    // Math: line-item totals vs declared subtotal.
    let computed: f64 = line_items.iter().map(|li| li.total_price).sum();
    let declared = ssot.pricing.as_ref().map(|p| p.subtotal).unwrap_or(0.0);
    if (computed - declared).abs() > MATH_TOLERANCE {
        issues.push(ValidationIssue::new(
            MATH_ERROR,
            format!(
                "Sum of line item totals ({:.2}) != declared subtotal ({:.2})",
                computed, declared
            ),
            None,
        ));
    }

    // Range: known width/height values within plausible bounds.
    for item in &ssot.items {
        let (lo, hi) = match item.category {
            ItemCategory::ShowerEnclosure => SHOWER_RANGE,
            ItemCategory::VanityMirror => MIRROR_RANGE,
        };
        for (key, dim) in [
            ("width", &item.dimensions.width),
            ("height", &item.dimensions.height),
        ] {
            if let Some(v) = dim.value {
                if v < lo || v > hi {
                    issues.push(ValidationIssue::new(
                        RANGE_ERROR,
                        format!(
                            "{} {} ({}\") out of range [{}, {}]",
                            item.category.title(),
                            key,
                            v,
                            lo,
                            hi
                        ),
                        Some(&item.item_id),
                    ));
                }
            }
        }
    }

    // Consistency: items and pricing lines must cover each other.
    for item in &ssot.items {
        if !line_items.iter().any(|li| li.item_id == item.item_id) {
            issues.push(ValidationIssue::new(
                CONSISTENCY_ERROR,
                format!("Item {} has no corresponding pricing line item", item.item_id),
                Some(&item.item_id),
            ));
        }
    }
    for li in line_items {
        if !ssot.items.iter().any(|item| item.item_id == li.item_id) {
            issues.push(ValidationIssue::new(
                CONSISTENCY_ERROR,
                format!("Pricing line item {} has no corresponding item", li.item_id),
                Some(&li.item_id),
            ));
        }
    }

    // Completeness: null width/height requires the field-verify flag.
    for item in &ssot.items {
        if item.has_flag(FLAG_TO_BE_VERIFIED_IN_FIELD) {
            continue;
        }
        for (key, dim) in [
            ("width", &item.dimensions.width),
            ("height", &item.dimensions.height),
        ] {
            if dim.value.is_none() {
                issues.push(ValidationIssue::new(
                    COMPLETENESS_ERROR,
                    format!("Item {} has null {} without TBV flag", item.item_id, key),
                    Some(&item.item_id),
                ));
            }
        }
    }

    // Template mapping: every item needs a usable configuration.
    for item in &ssot.items {
        if item.configuration.is_empty() || item.configuration == "unknown" {
            issues.push(ValidationIssue::new(
                TEMPLATE_ERROR,
                format!("Item {} has no configuration mapping", item.item_id),
                Some(&item.item_id),
            ));
        }
    }

    // Duplicates: same (unitId, location, category) seen again with a
    // quantity that cannot explain it. Only the later occurrence is
    // flagged, and only as a warning.
    let mut seen: Vec<(&str, &str, ItemCategory)> = Vec::new();
    for item in &ssot.items {
        let key = (item.unit_id.as_str(), item.location.as_str(), item.category);
        if seen.contains(&key) && item.quantity_per_unit <= 1 {
            issues.push(ValidationIssue::new(
                DUPLICATE_WARNING,
                format!(
                    "Possible duplicate: unit '{}' location '{}' category {}",
                    key.0, key.1, key.2
                ),
                Some(&item.item_id),
            ));
        }
        seen.push(key);
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssot::{
        Breakdown, DimValue, LineItem, Pricing, ScopeItem, FLAG_NEEDS_REVIEW,
    };

    fn item(id: &str, category: ItemCategory, w: Option<f64>, h: Option<f64>) -> ScopeItem {
        let mut item: ScopeItem = serde_json::from_str(&format!(
            r#"{{"itemId":"{}","category":"{}","configuration":"inline-panel"}}"#,
            id,
            category.as_str()
        ))
        .unwrap();
        if let Some(w) = w {
            item.dimensions.width = DimValue::from_callout(w);
        }
        if let Some(h) = h {
            item.dimensions.height = DimValue::from_callout(h);
        }
        item
    }

    fn line(id: &str, total: f64) -> LineItem {
        LineItem {
            item_id: id.to_string(),
            description: String::new(),
            unit_price: total,
            quantity: 1,
            total_price: total,
            breakdown: Breakdown::default(),
            manual_override: false,
            override_reason: None,
        }
    }

    fn priced_ssot(items: Vec<ScopeItem>, lines: Vec<LineItem>, subtotal: f64) -> Ssot {
        let mut ssot = Ssot::default();
        ssot.items = items;
        ssot.pricing = Some(Pricing {
            line_items: lines,
            subtotal,
            total: subtotal,
            ..Pricing::default()
        });
        ssot
    }

    #[test]
    fn clean_ssot_passes() {
        let ssot = priced_ssot(
            vec![item("i1", ItemCategory::ShowerEnclosure, Some(36.0), Some(72.0))],
            vec![line("i1", 810.0)],
            810.0,
        );
        assert!(validate_for_generation(&ssot).is_empty());
    }

    #[test]
    fn subtotal_mismatch_is_math_error() {
        let ssot = priced_ssot(
            vec![item("i1", ItemCategory::ShowerEnclosure, Some(36.0), Some(72.0))],
            vec![line("i1", 104_800.0)],
            99_999.99,
        );
        let issues = validate_for_generation(&ssot);
        assert!(issues.iter().any(|i| i.code == MATH_ERROR));
        assert!(issues.iter().find(|i| i.code == MATH_ERROR).unwrap().is_blocking());
    }

    #[test]
    fn subtotal_within_a_cent_passes() {
        let ssot = priced_ssot(
            vec![item("i1", ItemCategory::ShowerEnclosure, Some(36.0), Some(72.0))],
            vec![line("i1", 100.005)],
            100.0,
        );
        assert!(!validate_for_generation(&ssot)
            .iter()
            .any(|i| i.code == MATH_ERROR));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let ok = priced_ssot(
            vec![item("i1", ItemCategory::ShowerEnclosure, Some(6.0), Some(240.0))],
            vec![line("i1", 10.0)],
            10.0,
        );
        assert!(!validate_for_generation(&ok).iter().any(|i| i.code == RANGE_ERROR));

        let bad = priced_ssot(
            vec![item("i1", ItemCategory::VanityMirror, Some(30.0), Some(121.0))],
            vec![line("i1", 10.0)],
            10.0,
        );
        assert!(validate_for_generation(&bad).iter().any(|i| i.code == RANGE_ERROR));
    }

    #[test]
    fn unpriced_item_is_consistency_error() {
        let ssot = priced_ssot(
            vec![item("i1", ItemCategory::ShowerEnclosure, Some(36.0), Some(72.0))],
            vec![],
            0.0,
        );
        assert!(validate_for_generation(&ssot)
            .iter()
            .any(|i| i.code == CONSISTENCY_ERROR));
    }

    #[test]
    fn orphan_line_item_is_consistency_error() {
        let ssot = priced_ssot(vec![], vec![line("ghost", 5.0)], 5.0);
        let issues = validate_for_generation(&ssot);
        assert!(issues
            .iter()
            .any(|i| i.code == CONSISTENCY_ERROR && i.item_id.as_deref() == Some("ghost")));
    }

    #[test]
    fn null_dimension_needs_tbv_flag() {
        let mut bad = item("i1", ItemCategory::ShowerEnclosure, None, Some(72.0));
        bad.add_flag(FLAG_NEEDS_REVIEW);
        let ssot = priced_ssot(vec![bad], vec![line("i1", 10.0)], 10.0);
        assert!(validate_for_generation(&ssot)
            .iter()
            .any(|i| i.code == COMPLETENESS_ERROR));

        let mut ok = item("i2", ItemCategory::ShowerEnclosure, None, Some(72.0));
        ok.add_flag(FLAG_TO_BE_VERIFIED_IN_FIELD);
        let ssot = priced_ssot(vec![ok], vec![line("i2", 10.0)], 10.0);
        assert!(!validate_for_generation(&ssot)
            .iter()
            .any(|i| i.code == COMPLETENESS_ERROR));
    }

    #[test]
    fn unknown_configuration_is_template_error() {
        let mut it = item("i1", ItemCategory::ShowerEnclosure, Some(36.0), Some(72.0));
        it.configuration = "unknown".to_string();
        let ssot = priced_ssot(vec![it], vec![line("i1", 10.0)], 10.0);
        assert!(validate_for_generation(&ssot)
            .iter()
            .any(|i| i.code == TEMPLATE_ERROR));
    }

    #[test]
    fn duplicate_flags_later_occurrence_only_and_is_non_blocking() {
        let mut a = item("i1", ItemCategory::VanityMirror, Some(30.0), Some(36.0));
        a.unit_id = "A".to_string();
        a.location = "Bath 1".to_string();
        let mut b = a.clone();
        b.item_id = "i2".to_string();

        let ssot = priced_ssot(
            vec![a, b],
            vec![line("i1", 10.0), line("i2", 10.0)],
            20.0,
        );
        let dups: Vec<_> = validate_for_generation(&ssot)
            .into_iter()
            .filter(|i| i.code == DUPLICATE_WARNING)
            .collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].item_id.as_deref(), Some("i2"));
        assert!(!dups[0].is_blocking());
    }

    #[test]
    fn quantity_above_one_suppresses_duplicate_warning() {
        let mut a = item("i1", ItemCategory::VanityMirror, Some(30.0), Some(36.0));
        a.unit_id = "A".to_string();
        let mut b = a.clone();
        b.item_id = "i2".to_string();
        b.quantity_per_unit = 4;

        let ssot = priced_ssot(
            vec![a, b],
            vec![line("i1", 10.0), line("i2", 40.0)],
            50.0,
        );
        assert!(!validate_for_generation(&ssot)
            .iter()
            .any(|i| i.code == DUPLICATE_WARNING));
    }
}
