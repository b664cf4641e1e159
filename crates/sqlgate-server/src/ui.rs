// crates/sqlgate-server/src/ui.rs
// ============================================================================
// Module: HTML Page
// Description: Server-rendered query page.
// Purpose: Show the query form, configured links, and a rendered result.
// Dependencies: sqlgate-config
// ============================================================================

//! ## Overview
//! The page is a single self-contained document with no scripts. Every piece
//! of request or result text passes through [`escape_html`]; only rewrite-rule
//! [`DisplayValue::Markup`](crate::render::DisplayValue) cells are emitted
//! verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sqlgate_config::LinkConfig;

use crate::query::SourceSummary;
use crate::render::DisplayResult;
use crate::render::escape_html;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Inputs for one page render.
#[derive(Debug, Clone, Copy)]
pub struct UiPage<'a> {
    /// Route prefix the form submits to.
    pub route_prefix: &'a str,
    /// Registered sources.
    pub sources: &'a [SourceSummary],
    /// Currently selected source.
    pub source: &'a str,
    /// Query text as submitted.
    pub query: &'a str,
    /// Configured UI links.
    pub links: &'a [LinkConfig],
    /// Error to show in place of a result.
    pub error: Option<&'a str>,
    /// Rendered result.
    pub result: Option<&'a DisplayResult>,
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders `page` as an HTML document.
#[must_use]
pub fn render_page(page: &UiPage<'_>) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>sqlgate</title>\n\
         </head>\n<body>\n",
    );
    push_links(&mut html, page.links);
    push_form(&mut html, page);
    if let Some(error) = page.error {
        html.push_str("<div class=\"error\">");
        html.push_str(&escape_html(error));
        html.push_str("</div>\n");
    } else if let Some(result) = page.result {
        push_result(&mut html, result);
    }
    html.push_str("</body>\n</html>\n");
    html
}

/// Appends the link bar.
fn push_links(html: &mut String, links: &[LinkConfig]) {
    if links.is_empty() {
        return;
    }
    html.push_str("<nav>");
    for link in links {
        html.push_str(&format!(
            "<a href=\"{}\" rel=noopener>{}</a> ",
            escape_html(&link.url),
            escape_html(&link.anchor)
        ));
    }
    html.push_str("</nav>\n");
}

/// Appends the query form.
fn push_form(html: &mut String, page: &UiPage<'_>) {
    html.push_str(&format!(
        "<form method=\"get\" action=\"{}/\">\n<select name=\"src\">",
        escape_html(page.route_prefix)
    ));
    for summary in page.sources {
        let selected = if summary.source == page.source { " selected" } else { "" };
        html.push_str(&format!(
            "<option value=\"{}\"{selected}>{} ({})</option>",
            escape_html(&summary.source),
            escape_html(&summary.source),
            escape_html(&summary.label)
        ));
    }
    html.push_str("</select>\n<textarea name=\"q\" rows=\"8\" cols=\"100\">");
    html.push_str(&escape_html(page.query));
    html.push_str("</textarea>\n<button type=\"submit\">Query</button>\n</form>\n");
}

/// Appends the result table and its footer.
fn push_result(html: &mut String, result: &DisplayResult) {
    html.push_str("<table>\n<thead><tr>");
    for column in &result.columns {
        html.push_str("<th>");
        html.push_str(&escape_html(column));
        html.push_str("</th>");
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &result.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&cell.to_html());
            html.push_str("</td>");
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n<p class=\"summary\">");
    let millis = result.elapsed.as_secs_f64() * 1000.0;
    html.push_str(&format!("{} rows in {millis:.1}ms", result.num_rows));
    if result.truncated {
        html.push_str(&format!(", showing the first {}", result.rows.len()));
    }
    if result.more {
        html.push_str(", row limit reached");
    }
    html.push_str("</p>\n");
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use std::collections::BTreeMap;
    use std::time::Duration;

    use super::*;
    use crate::render::DisplayValue;

    fn sources() -> Vec<SourceSummary> {
        vec![SourceSummary {
            source: "main".to_string(),
            label: "Main <db>".to_string(),
            named: BTreeMap::new(),
        }]
    }

    #[test]
    fn text_cells_are_escaped_and_markup_is_verbatim() {
        let result = DisplayResult {
            columns: vec!["a".to_string(), "b".to_string()],
            rows: vec![vec![
                DisplayValue::Text("<script>".to_string()),
                DisplayValue::Markup("<tt>1</tt>".to_string()),
            ]],
            num_rows: 1,
            elapsed: Duration::from_millis(1),
            truncated: false,
            more: false,
        };
        let sources = sources();
        let html = render_page(&UiPage {
            route_prefix: "",
            sources: &sources,
            source: "main",
            query: "select '<b>'",
            links: &[],
            error: None,
            result: Some(&result),
        });
        assert!(html.contains("<td>&lt;script&gt;</td><td><tt>1</tt></td>"));
        assert!(html.contains("select &#39;&lt;b&gt;&#39;"));
        assert!(html.contains("<option value=\"main\" selected>main (Main &lt;db&gt;)</option>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn error_replaces_result() {
        let sources = sources();
        let links = vec![LinkConfig {
            anchor: "Runbook".to_string(),
            url: "https://example.com/run?a=1&b=2".to_string(),
        }];
        let html = render_page(&UiPage {
            route_prefix: "/sql",
            sources: &sources,
            source: "main",
            query: "bogus",
            links: &links,
            error: Some("query rejected: <nope>"),
            result: None,
        });
        assert!(html.contains("<div class=\"error\">query rejected: &lt;nope&gt;</div>"));
        assert!(html.contains("action=\"/sql/\""));
        assert!(html.contains("href=\"https://example.com/run?a=1&amp;b=2\""));
        assert!(!html.contains("<table>"));
    }
}
