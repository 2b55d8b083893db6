//! Locating a project's fragment inside a saved, fully rendered listing page.

use std::path::Path;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::LoadError;
use crate::parser::Fragment;

/// One way of finding the element that describes a project id.
trait Locator {
    fn name(&self) -> &'static str;
    fn locate<'a>(&self, doc: &'a Html, pid: &str) -> Option<ElementRef<'a>>;
}

/// Element id ending in `proj-card-<pid>`, `project-<pid>` or `card-<pid>`
/// (separator optional), tried pattern by pattern.
struct IdPattern {
    with_id: Selector,
}

impl Locator for IdPattern {
    fn name(&self) -> &'static str {
        "id-pattern"
    }

    fn locate<'a>(&self, doc: &'a Html, pid: &str) -> Option<ElementRef<'a>> {
        let pid = regex::escape(pid);
        for prefix in ["proj-card", "project", "card"] {
            let Ok(re) = Regex::new(&format!("{}[-_]?{}$", prefix, pid)) else {
                continue;
            };
            let hit = doc
                .select(&self.with_id)
                .find(|el| el.value().id().is_some_and(|id| re.is_match(id)));
            if hit.is_some() {
                return hit;
            }
        }
        None
    }
}

/// `<template>` whose id or text mentions the pid.
struct TemplateBlock {
    template: Selector,
}

impl Locator for TemplateBlock {
    fn name(&self) -> &'static str {
        "template"
    }

    fn locate<'a>(&self, doc: &'a Html, pid: &str) -> Option<ElementRef<'a>> {
        doc.select(&self.template).find(|t| {
            t.value().id().is_some_and(|id| id.contains(pid)) || t.text().collect::<String>().contains(pid)
        })
    }
}

/// Element whose `data-id` or `data-project-id` equals the pid.
struct DataAttribute {
    data_id: Selector,
    data_project_id: Selector,
}

impl Locator for DataAttribute {
    fn name(&self) -> &'static str {
        "data-attribute"
    }

    fn locate<'a>(&self, doc: &'a Html, pid: &str) -> Option<ElementRef<'a>> {
        doc.select(&self.data_id)
            .find(|el| el.value().attr("data-id") == Some(pid))
            .or_else(|| {
                doc.select(&self.data_project_id)
                    .find(|el| el.value().attr("data-project-id") == Some(pid))
            })
    }
}

/// `<script>` or `<textarea>` blob containing the pid literally.
struct TextBlob {
    blobs: Selector,
}

impl Locator for TextBlob {
    fn name(&self) -> &'static str {
        "text-blob"
    }

    fn locate<'a>(&self, doc: &'a Html, pid: &str) -> Option<ElementRef<'a>> {
        doc.select(&self.blobs)
            .find(|el| el.text().collect::<String>().contains(pid))
    }
}

pub struct SeedDocument {
    doc: Html,
    locators: Vec<Box<dyn Locator>>,
}

impl SeedDocument {
    pub fn parse(html: &str) -> Self {
        SeedDocument {
            doc: Html::parse_document(html),
            locators: vec![
                Box::new(IdPattern {
                    with_id: Selector::parse("[id]").unwrap(),
                }),
                Box::new(TemplateBlock {
                    template: Selector::parse("template").unwrap(),
                }),
                Box::new(DataAttribute {
                    data_id: Selector::parse("[data-id]").unwrap(),
                    data_project_id: Selector::parse("[data-project-id]").unwrap(),
                }),
                Box::new(TextBlob {
                    blobs: Selector::parse("script, textarea").unwrap(),
                }),
            ],
        }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let html = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&html))
    }

    /// Fragment for `pid` from the first locator that finds one. Matches are
    /// never combined across locators.
    pub fn find(&self, pid: &str) -> Option<Fragment> {
        if pid.trim().is_empty() {
            return None;
        }
        self.locators.iter().find_map(|loc| {
            let el = loc.locate(&self.doc, pid)?;
            debug!(pid, locator = loc.name(), "seed fragment located");
            Some(Fragment::from_element(el))
        })
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> SeedDocument {
        let html = std::fs::read_to_string("tests/fixtures/seed_page.html").unwrap();
        SeedDocument::parse(&html)
    }

    #[test]
    fn id_pattern_first() {
        let f = seed().find("201").unwrap();
        assert!(f.text().contains("Slope protection along Agno River"));
    }

    #[test]
    fn id_pattern_anchored_at_end() {
        // "proj-card-2011" appears first in the page but must not match "201".
        let f = seed().find("2011").unwrap();
        assert!(f.text().contains("Unrelated card"));
        let f = seed().find("201").unwrap();
        assert!(!f.text().contains("Unrelated card"));
    }

    #[test]
    fn template_lookup() {
        let f = seed().find("202").unwrap();
        assert!(f.text().contains("Report Year: 2024"));
    }

    #[test]
    fn data_attribute_lookup() {
        let f = seed().find("203").unwrap();
        assert!(f.markup().contains("data-project-id=\"203\""));
        assert!(f.text().contains("Gabion"));
    }

    #[test]
    fn script_blob_lookup() {
        let f = seed().find("204").unwrap();
        assert!(f.text().contains("\"id\":\"204\""));
    }

    #[test]
    fn miss_is_none() {
        assert!(seed().find("999").is_none());
        assert!(seed().find("").is_none());
    }
}
