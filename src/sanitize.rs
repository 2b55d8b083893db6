//! Normalization applied once per record after enrichment.
//!
//! Placeholder text becomes `None`, coordinate text is coerced to numbers,
//! and descriptive text that landed in `region` is moved to `project_type`.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::{Field, ProjectRecord};

static DESCRIPTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(construction|installation|rehab|mitigation|flood|drainage|slope|bank|protection|line canal|pump|booster)\b",
    )
    .unwrap()
});
static REGION_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(region|ncr|caraga|car|iv-a|iv-b|iv|v|vi|vii|viii|ix|x|xi|xii|xiii|i|ii|iii|national capital)\b",
    )
    .unwrap()
});

const PLACEHOLDERS: &[&str] = &["none", "null", "n/a", "-", "\u{2014}"];

pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || PLACEHOLDERS.contains(&v.to_lowercase().as_str())
}

/// Trimmed value, or `None` for placeholders.
pub fn clean_text(value: &str) -> Option<String> {
    if is_placeholder(value) {
        None
    } else {
        Some(value.trim().to_string())
    }
}

/// Coordinate text to number; anything unparseable or non-finite is `None`.
pub fn coerce_coord(value: &str) -> Option<f64> {
    if is_placeholder(value) {
        return None;
    }
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Same as [`coerce_coord`] for JSON payload values (number or string).
pub fn coord_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        serde_json::Value::String(s) => coerce_coord(s),
        _ => None,
    }
}

/// Text of a JSON attribute. Numbers keep their JSON rendering (`2022`, not
/// `2022.0`); placeholders and non-scalars are `None`.
pub fn text_from_json(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => clean_text(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A region that reads like a work description rather than an administrative area.
pub fn is_descriptive_region(region: &str) -> bool {
    DESCRIPTIVE_RE.is_match(region) && !REGION_KEYWORD_RE.is_match(region)
}

/// Move a descriptive `region` into `project_type` (when that is empty) and
/// clear `region`. Returns true when the record changed.
pub fn reclassify_region(record: &mut ProjectRecord) -> bool {
    let Some(region) = record.region.as_deref().map(str::trim) else {
        return false;
    };
    if region.is_empty() || !is_descriptive_region(region) {
        return false;
    }
    let region = region.to_string();
    record.fill(Field::ProjectType, region);
    record.region = None;
    true
}

pub fn normalize(record: &mut ProjectRecord) {
    for field in Field::ALL {
        if let Some(slot) = record.text_mut(field) {
            if slot.as_deref().is_some_and(is_placeholder) {
                *slot = None;
            }
        }
    }
    if record.lat.is_some_and(|v| !v.is_finite()) {
        record.lat = None;
    }
    if record.lng.is_some_and(|v| !v.is_finite()) {
        record.lng = None;
    }
    reclassify_region(record);
}

/// Final pass over an accumulated set. Returns how many records were reclassified.
pub fn sweep(records: &mut [ProjectRecord]) -> usize {
    records.iter_mut().map(reclassify_region).filter(|changed| *changed).count()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_become_none() {
        let mut r = ProjectRecord {
            start_date: Some(" N/A ".into()),
            project_type: Some("null".into()),
            funding_year: Some("-".into()),
            report_year: Some("\u{2014}".into()),
            contractor: Some("".into()),
            description: Some("None".into()),
            cost: Some("1,000,000.00".into()),
            ..Default::default()
        };
        normalize(&mut r);
        assert_eq!(r.start_date, None);
        assert_eq!(r.project_type, None);
        assert_eq!(r.funding_year, None);
        assert_eq!(r.report_year, None);
        assert_eq!(r.contractor, None);
        assert_eq!(r.description, None);
        assert_eq!(r.cost.as_deref(), Some("1,000,000.00"));
    }

    #[test]
    fn descriptive_region_moves_to_type() {
        let mut r = ProjectRecord {
            region: Some("Construction of riprap revetment".into()),
            ..Default::default()
        };
        normalize(&mut r);
        assert_eq!(r.project_type.as_deref(), Some("Construction of riprap revetment"));
        assert_eq!(r.region, None);
    }

    #[test]
    fn descriptive_region_does_not_clobber_type() {
        let mut r = ProjectRecord {
            region: Some("Slope protection works".into()),
            project_type: Some("Revetment".into()),
            ..Default::default()
        };
        assert!(reclassify_region(&mut r));
        assert_eq!(r.project_type.as_deref(), Some("Revetment"));
        assert_eq!(r.region, None);
    }

    #[test]
    fn administrative_region_is_kept() {
        for region in ["Region III", "NCR", "National Capital Region", "CARAGA", "Region IV-A"] {
            let mut r = ProjectRecord {
                region: Some(region.into()),
                ..Default::default()
            };
            assert!(!reclassify_region(&mut r), "{region}");
            assert_eq!(r.region.as_deref(), Some(region));
        }
        // Descriptive text that also names a region stays put.
        let mut r = ProjectRecord {
            region: Some("Flood mitigation Region V".into()),
            ..Default::default()
        };
        assert!(!reclassify_region(&mut r));
    }

    #[test]
    fn coordinates_coerce_or_null() {
        assert_eq!(coerce_coord(" 14.59 "), Some(14.59));
        assert_eq!(coerce_coord("n/a"), None);
        assert_eq!(coerce_coord("abc"), None);
        assert_eq!(coerce_coord("NaN"), None);
        assert_eq!(coord_from_json(&serde_json::json!(121.0)), Some(121.0));
        assert_eq!(coord_from_json(&serde_json::json!("121.5")), Some(121.5));
        assert_eq!(coord_from_json(&serde_json::json!(null)), None);
    }

    #[test]
    fn json_attribute_text() {
        assert_eq!(text_from_json(&serde_json::json!(2022)).as_deref(), Some("2022"));
        assert_eq!(text_from_json(&serde_json::json!(" Pampanga ")).as_deref(), Some("Pampanga"));
        assert_eq!(text_from_json(&serde_json::json!("N/A")), None);
        assert_eq!(text_from_json(&serde_json::json!(null)), None);
        assert_eq!(text_from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn sweep_counts_changes() {
        let mut rows = vec![
            ProjectRecord {
                region: Some("Installation of pump".into()),
                ..Default::default()
            },
            ProjectRecord {
                region: Some("Region VII".into()),
                ..Default::default()
            },
        ];
        assert_eq!(sweep(&mut rows), 1);
        assert_eq!(rows[0].region, None);
        assert_eq!(rows[0].project_type.as_deref(), Some("Installation of pump"));
        assert_eq!(rows[1].region.as_deref(), Some("Region VII"));
        assert_eq!(sweep(&mut rows), 0);
    }
}
