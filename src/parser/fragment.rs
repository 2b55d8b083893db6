use scraper::{ElementRef, Html, Selector};

/// A piece of detail markup (modal body, seed template, script blob) ready for
/// selector lookups and text scans.
pub struct Fragment {
    markup: String,
    text: String,
    doc: Html,
}

impl Fragment {
    pub fn parse(markup: &str) -> Self {
        let doc = Html::parse_fragment(markup);
        let text = node_text(doc.root_element());
        Fragment {
            markup: markup.to_string(),
            text,
            doc,
        }
    }

    /// Keeps the element's own tag in `markup` so attribute scans see it;
    /// selectors run over its children.
    pub fn from_element(el: ElementRef<'_>) -> Self {
        let doc = Html::parse_fragment(&el.inner_html());
        Fragment {
            markup: el.html(),
            text: node_text(el),
            doc,
        }
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    /// Text nodes, trimmed, one per line.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Space-joined text of the first element matching `selector`, if non-empty.
    pub fn select_text(&self, selector: &Selector) -> Option<String> {
        let el = self.doc.select(selector).next()?;
        let t = joined_text(el);
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    }
}

pub(crate) fn joined_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn node_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
