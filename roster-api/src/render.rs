//! HTML rendering for the listing page.

use roster_core::{RowSet, Value};

/// Everything the listing page shows.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub rows: &'a RowSet,
    pub visits: u64,
    pub hostname: &'a str,
    pub version: &'a str,
}

/// Escape text for use in HTML element content and attribute values.
pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Column headings: every column name in first-seen order.
fn headings(rows: &RowSet) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        for name in row.column_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

pub fn render_page(ctx: &PageContext<'_>) -> String {
    let columns = headings(ctx.rows);
    let mut html = String::with_capacity(1024);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Employees</title>\n</head>\n<body>\n");
    html.push_str("<h1>Employees</h1>\n");

    if ctx.rows.is_empty() {
        html.push_str("<p>No records found.</p>\n");
    } else {
        html.push_str("<table>\n<thead><tr>");
        for name in &columns {
            html.push_str("<th>");
            html.push_str(&escape_html(name));
            html.push_str("</th>");
        }
        html.push_str("</tr></thead>\n<tbody>\n");
        for row in ctx.rows {
            html.push_str("<tr>");
            for name in &columns {
                html.push_str("<td>");
                let cell = row.get(name).map(Value::to_string).unwrap_or_default();
                html.push_str(&escape_html(&cell));
                html.push_str("</td>");
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</tbody>\n</table>\n");
    }

    html.push_str(&format!(
        "<p>Visits this session: {}</p>\n<p>Served by {} (version {})</p>\n",
        ctx.visits,
        escape_html(ctx.hostname),
        escape_html(ctx.version)
    ));
    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roster_core::Row;

    proptest! {
        #[test]
        fn prop_escaped_text_has_no_markup(raw in "\\PC*") {
            let escaped = escape_html(&raw);
            prop_assert!(!escaped.contains('<'));
            prop_assert!(!escaped.contains('>'));
            prop_assert!(!escaped.contains('"'));
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">Tom & 'Jerry'</a>"),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_rows_in_column_order() {
        let rows = vec![
            Row::new().with("id", 1).with("name", "Ada").with("age", Value::Null),
            Row::new().with("id", 2).with("name", "<script>"),
        ];
        let html = render_page(&PageContext {
            rows: &rows,
            visits: 3,
            hostname: "web-1",
            version: "1.0",
        });

        assert!(html.contains("<th>id</th><th>name</th><th>age</th>"));
        assert!(html.contains("<td>1</td><td>Ada</td><td></td>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Visits this session: 3"));
        assert!(html.contains("Served by web-1 (version 1.0)"));
    }

    #[test]
    fn test_render_empty_row_set() {
        let html = render_page(&PageContext {
            rows: &Vec::new(),
            visits: 1,
            hostname: "Unknown Host",
            version: "1.0",
        });
        assert!(html.contains("No records found."));
        assert!(!html.contains("<table>"));
    }
}
