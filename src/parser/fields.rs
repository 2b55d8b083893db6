//! Field extraction from detail fragments.
//!
//! Each field has an ordered list of strategies; the first one that yields a
//! value wins and later strategies are not consulted.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use super::fragment::Fragment;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}[/-]\d{1,2}[/-]\d{4}|\d{4}-\d{2}-\d{2})").unwrap());
static DATA_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-year="?(20\d{2})"?"#).unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(20\d{2})\b").unwrap());
static REPORT_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(report[_\s-]?year|report year|report_year)[:\s]*([0-9]{4})\b").unwrap()
});
static REGION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Region\s+([IVX0-9A-Za-z \-]+)").unwrap());
static REGION_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Region[:\s]+([A-Za-z0-9 \-]+)").unwrap());
static COORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?\s*(-?\d{1,3}\.\d+)\s*,\s*(-?\d{1,3}\.\d+)\s*\)?").unwrap()
});

pub const LAT_RANGE: (f64, f64) = (4.0, 22.0);
pub const LNG_RANGE: (f64, f64) = (116.0, 127.0);

pub fn within_bounds(lat: f64, lng: f64) -> bool {
    (LAT_RANGE.0..=LAT_RANGE.1).contains(&lat) && (LNG_RANGE.0..=LNG_RANGE.1).contains(&lng)
}

/// One way of pulling a value out of a fragment.
pub trait FieldExtractor {
    fn try_extract(&self, fragment: &Fragment) -> Option<String>;
}

/// Text of the first element matching a CSS selector.
pub struct SelectorText(Selector);

impl SelectorText {
    fn new(css: &str) -> Self {
        SelectorText(Selector::parse(css).expect("static selector"))
    }
}

impl FieldExtractor for SelectorText {
    fn try_extract(&self, fragment: &Fragment) -> Option<String> {
        fragment.select_text(&self.0)
    }
}

#[derive(Clone, Copy)]
enum Haystack {
    Text,
    Markup,
}

/// A capture group of the first regex match, trimmed.
pub struct Pattern {
    re: &'static LazyLock<Regex>,
    group: usize,
    over: Haystack,
}

impl Pattern {
    fn text(re: &'static LazyLock<Regex>, group: usize) -> Self {
        Pattern { re, group, over: Haystack::Text }
    }

    fn markup(re: &'static LazyLock<Regex>, group: usize) -> Self {
        Pattern { re, group, over: Haystack::Markup }
    }
}

impl FieldExtractor for Pattern {
    fn try_extract(&self, fragment: &Fragment) -> Option<String> {
        let hay = match self.over {
            Haystack::Text => fragment.text(),
            Haystack::Markup => fragment.markup(),
        };
        let caps = self.re.captures(hay)?;
        let v = caps.get(self.group)?.as_str().trim();
        if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    }
}

type Chain = Vec<Box<dyn FieldExtractor>>;

fn first_match(chain: &Chain, fragment: &Fragment) -> Option<String> {
    chain.iter().find_map(|e| e.try_extract(fragment))
}

/// Values found in one fragment. Absent values are lookup misses, not errors.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Extracted {
    pub start_date: Option<String>,
    pub project_type: Option<String>,
    pub funding_year: Option<String>,
    pub report_year: Option<String>,
    pub region: Option<String>,
    pub coords: Option<(f64, f64)>,
}

/// Extraction strategies for every detail field, in priority order.
pub struct FieldRules {
    start_date: Chain,
    project_type: Chain,
    funding_year: Chain,
    report_year: Chain,
    region: Chain,
}

impl Default for FieldRules {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldRules {
    pub fn new() -> Self {
        FieldRules {
            start_date: vec![
                Box::new(SelectorText::new(".start-date, .start_date, #start-date")),
                Box::new(Pattern::text(&DATE_RE, 1)),
            ],
            project_type: vec![
                Box::new(SelectorText::new(".type-of-work")),
                Box::new(SelectorText::new("#type_of_work")),
                Box::new(SelectorText::new(".project-type")),
                Box::new(SelectorText::new(".type_of_work")),
            ],
            funding_year: vec![
                Box::new(Pattern::markup(&DATA_YEAR_RE, 1)),
                Box::new(Pattern::text(&YEAR_RE, 1)),
            ],
            report_year: vec![Box::new(Pattern::text(&REPORT_YEAR_RE, 2))],
            region: vec![
                Box::new(Pattern::text(&REGION_RE, 1)),
                Box::new(Pattern::text(&REGION_LABEL_RE, 1)),
            ],
        }
    }

    pub fn extract(&self, fragment: &Fragment) -> Extracted {
        let funding_year = first_match(&self.funding_year, fragment);
        let report_year = first_match(&self.report_year, fragment)
            .or_else(|| distinct_year(fragment.text(), funding_year.as_deref()));
        Extracted {
            start_date: first_match(&self.start_date, fragment),
            project_type: first_match(&self.project_type, fragment),
            funding_year,
            report_year,
            region: first_match(&self.region, fragment),
            coords: coordinates(fragment.text()),
        }
    }
}

/// First year token in `text` that differs from `funding`. Unrelated years in
/// the fragment (a contractor's founding year, say) will be picked up too.
fn distinct_year(text: &str, funding: Option<&str>) -> Option<String> {
    YEAR_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .find(|y| Some(y.as_str()) != funding)
}

/// First `(lat, lng)` pair in `text`, dropped when outside the bounding box.
pub fn coordinates(text: &str) -> Option<(f64, f64)> {
    let caps = COORD_RE.captures(text)?;
    let lat: f64 = caps[1].parse().ok()?;
    let lng: f64 = caps[2].parse().ok()?;
    if within_bounds(lat, lng) {
        Some((lat, lng))
    } else {
        None
    }
}

// ── Tests ──
