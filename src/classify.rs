use std::sync::LazyLock;

use regex::Regex;

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:Project Type|Type)[:\s]+([A-Za-z0-9 \-/&]+)").unwrap());

/// Lowercase substring → category. Order is the priority; the first hit wins.
const KEYWORDS: &[(&str, &str)] = &[
    ("riverbank", "Riverbank Protection"),
    ("riprap", "Riverbank Protection"),
    ("drainage", "Drainage System"),
    ("drain", "Drainage System"),
    ("dredg", "Dredging"),
    ("retaining wall", "Retaining Wall"),
    ("slope protection", "Slope Protection"),
    ("reforestation", "Reforestation"),
    ("spillway", "Spillway"),
    ("flood control", "Flood Control Structure"),
    ("gabion", "Gabion/Stone Protection"),
    ("revetment", "Revetment"),
    ("river restoration", "River Restoration"),
];

/// Guess a project type from free text: an explicit "Type: ..." label first,
/// then the keyword table.
pub fn infer_project_type(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = LABEL_RE.captures(text) {
        let label = caps[1].trim();
        if !label.is_empty() {
            return Some(label.to_string());
        }
    }
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, label)| label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_label_wins() {
        assert_eq!(
            infer_project_type("Project Type: Drainage Canal\nRiprap works").as_deref(),
            Some("Drainage Canal")
        );
        assert_eq!(infer_project_type("TYPE   Spillway").as_deref(), Some("Spillway"));
    }

    #[test]
    fn keyword_order_not_specificity() {
        // "riprap" precedes "revetment" in the table.
        assert_eq!(
            infer_project_type("Construction of riprap revetment").as_deref(),
            Some("Riverbank Protection")
        );
        // "drainage" precedes "flood control".
        assert_eq!(
            infer_project_type("Flood control and drainage improvement").as_deref(),
            Some("Drainage System")
        );
        assert_eq!(infer_project_type("DREDGING of Pasig River").as_deref(), Some("Dredging"));
    }

    #[test]
    fn nothing_matches() {
        assert_eq!(infer_project_type("Concrete road widening"), None);
        assert_eq!(infer_project_type("   "), None);
    }
}
