use scraper::{ElementRef, Html, Selector};

use super::fragment::joined_text;
use crate::error::RowSkip;
use crate::record::ProjectRecord;

struct RowSelectors {
    tr: Selector,
    td: Selector,
    open_project: Selector,
    report_button: Selector,
}

impl RowSelectors {
    fn new() -> Self {
        RowSelectors {
            tr: Selector::parse("tr").unwrap(),
            td: Selector::parse("td").unwrap(),
            open_project: Selector::parse("a.load-project-card").unwrap(),
            report_button: Selector::parse("button.open-report-form").unwrap(),
        }
    }
}

/// Parse one page of listing rows. Every `<tr>` yields either a draft record
/// or the reason it was skipped; one bad row never affects the others.
pub fn parse_rows(rows_markup: &str) -> Vec<Result<ProjectRecord, RowSkip>> {
    if rows_markup.trim().is_empty() {
        return Vec::new();
    }
    // Bare <tr> outside a table is dropped by the HTML tree builder.
    let doc = if rows_markup.to_ascii_lowercase().contains("<table") {
        Html::parse_fragment(rows_markup)
    } else {
        Html::parse_fragment(&format!("<table><tbody>{}</tbody></table>", rows_markup))
    };
    let sel = RowSelectors::new();
    doc.select(&sel.tr).map(|tr| parse_row(tr, &sel)).collect()
}

fn parse_row(tr: ElementRef<'_>, sel: &RowSelectors) -> Result<ProjectRecord, RowSkip> {
    let cells: Vec<String> = tr.select(&sel.td).map(joined_text).collect();
    if cells.is_empty() {
        return Err(RowSkip::NoCells);
    }

    let mut record = ProjectRecord::default();
    if let Some(a) = tr.select(&sel.open_project).next() {
        record.project_id = non_empty_attr(a, "data-id").or_else(|| non_empty_attr(a, "href"));
        record.description = Some(joined_text(a)).filter(|d| !d.is_empty());
    }
    record.report_contract_id = tr
        .select(&sel.report_button)
        .next()
        .and_then(|b| non_empty_attr(b, "data-contract_id"));

    if record.project_id.is_none() && record.report_contract_id.is_none() {
        return Err(RowSkip::MissingIdentifier);
    }

    let cell = |i: usize| cells.get(i).filter(|c| !c.is_empty()).cloned();
    record.location = cell(1);
    record.contractor = cell(2);
    record.cost = cell(3);
    record.completion_date = cell(4);
    Ok(record)
}

fn non_empty_attr(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(markup: &str) -> Vec<ProjectRecord> {
        parse_rows(markup).into_iter().filter_map(Result::ok).collect()
    }

    #[test]
    fn page_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/rows_page1.html").unwrap();
        let outcomes = parse_rows(&html);
        assert_eq!(outcomes.len(), 4);
        let rows: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(rows.len(), 3);

        let first = rows[0];
        assert_eq!(first.project_id.as_deref(), Some("101"));
        assert_eq!(
            first.description.as_deref(),
            Some("Construction of Flood Mitigation Structure along Pampanga River")
        );
        assert_eq!(first.location.as_deref(), Some("San Fernando, Pampanga"));
        assert_eq!(first.contractor.as_deref(), Some("Tri-Star Builders"));
        assert_eq!(first.cost.as_deref(), Some("₱ 96,500,000.00"));
        assert_eq!(first.completion_date.as_deref(), Some("12/20/2024"));
        assert_eq!(first.report_contract_id.as_deref(), Some("22CA0011"));
        assert_eq!(first.start_date, None);

        // Falls back to href when data-id is missing.
        assert_eq!(rows[2].project_id.as_deref(), Some("#project-103"));
        assert_eq!(rows[2].report_contract_id, None);
        assert!(outcomes.iter().any(|o| o == &Err(RowSkip::NoCells)));
    }

    #[test]
    fn row_without_identifier_is_skipped_not_fatal() {
        let markup = r#"
            <tr><td>?</td><td>Nowhere</td></tr>
            <tr><td><a class="load-project-card" data-id="7">Dike</a></td><td>Pasig</td></tr>
        "#;
        let outcomes = parse_rows(markup);
        assert_eq!(outcomes[0], Err(RowSkip::MissingIdentifier));
        let ok = parsed(markup);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].location.as_deref(), Some("Pasig"));
        assert_eq!(ok[0].contractor, None);
    }

    #[test]
    fn report_button_alone_is_enough() {
        let ok = parsed(
            r#"<tr><td>x</td><td>Cebu</td><td><button class="open-report-form" data-contract_id="C-9">Report</button></td></tr>"#,
        );
        assert_eq!(ok[0].project_id, None);
        assert_eq!(ok[0].report_contract_id.as_deref(), Some("C-9"));
    }

    #[test]
    fn empty_or_rowless_markup() {
        assert!(parse_rows("").is_empty());
        assert!(parse_rows("<div class=\"no-results\">No projects found</div>").is_empty());
    }

    #[test]
    fn markup_already_in_a_table() {
        let ok = parsed(
            r#"<table><tr><td><a class="load-project-card" data-id="5">A</a></td></tr></table>"#,
        );
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].project_id.as_deref(), Some("5"));
    }
}
