//! Server-rendered HTML for each dashboard view.
//!
//! Every value that came out of the database or the request is passed
//! through `html_escape`; the only exceptions are artifact fields that the
//! decoder already escaped and package descriptions rendered from markdown.

use chrono::NaiveDateTime;
use url::form_urlencoded::byte_serialize;

use fyzzdash_core::utils::markdown::render_description;
use fyzzdash_core::{
    html_escape, BatchRow, BatchSummaryRow, HomeReport, ListQuery, OverviewQuery, PackageRow,
    Page, ScanStatus, SortOrder,
};

/// Result of a scan triggered from a page, shown as a banner.
#[derive(Debug, Clone)]
pub struct ScanBanner {
    pub status: ScanStatus,
    pub command_line: String,
    pub message: String,
}

fn layout(title: &str, body: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; margin: 2rem; color: #1f2328; }}
nav a {{ margin-right: 1rem; }}
table {{ border-collapse: collapse; width: 100%; font-size: 0.9rem; margin-bottom: 1.5rem; }}
th, td {{ text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #d0d7de; vertical-align: top; }}
pre {{ background: #f6f8fa; padding: 0.75rem; overflow-x: auto; max-height: 24rem; }}
.alert {{ padding: 0.75rem 1rem; border-radius: 6px; margin-bottom: 1rem; }}
.alert-success {{ background: #dafbe1; }}
.alert-danger {{ background: #ffebe9; }}
.pager a, .pager span {{ margin-right: 1rem; }}
.empty {{ color: #656d76; padding: 1rem 0; }}
</style>
</head>
<body>
<nav><a href="/">Home</a><a href="/batches">Batches</a><a href="/batches/summaries">Summaries</a><a href="/packages">Packages</a><a href="/about">About</a></nav>
<h1>{title}</h1>
{body}
</body>
</html>"#,
        title = html_escape(title),
        body = body,
    )
}

fn opt(value: Option<&str>) -> String {
    value.map(html_escape).unwrap_or_else(|| "-".to_string())
}

fn ts(value: Option<&NaiveDateTime>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn num(value: Option<i32>) -> String {
    value.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Query string carrying the current filters plus the given overrides.
fn list_href(path: &str, query: &ListQuery, sort: &str, order: SortOrder, page: u64) -> String {
    let mut parts = Vec::new();
    if let Some(id) = &query.batch_job_id {
        parts.push(format!("batch_job_id={}", encode(id)));
    }
    if let Some(name) = &query.package_name {
        parts.push(format!("package_name={}", encode(name)));
    }
    parts.push(format!("sort={}", encode(sort)));
    parts.push(format!("order={}", order.as_sql()));
    parts.push(format!("page={}", page));
    parts.push(format!("limit={}", query.page.limit));
    html_escape(&format!("{}?{}", path, parts.join("&")))
}

fn sort_header(path: &str, query: &ListQuery, column: &str, label: &str) -> String {
    let (order, marker) = if query.sort == column {
        let arrow = if query.order == SortOrder::Asc { " ▲" } else { " ▼" };
        (query.order.flipped(), arrow)
    } else {
        (SortOrder::Desc, "")
    };
    format!(
        r#"<th><a href="{}">{}</a>{}</th>"#,
        list_href(path, query, column, order, 1),
        html_escape(label),
        marker
    )
}

fn pager<T>(path: &str, query: &ListQuery, page: &Page<T>) -> String {
    let mut out = String::from(r#"<div class="pager">"#);
    if page.has_previous() {
        out.push_str(&format!(
            r#"<a href="{}">&laquo; Previous</a>"#,
            list_href(path, query, query.sort, query.order, page.page - 1)
        ));
    }
    out.push_str(&format!(
        "<span>Page {} of {} ({} rows)</span>",
        page.page,
        page.total_pages().max(1),
        page.total_rows
    ));
    if page.has_next() {
        out.push_str(&format!(
            r#"<a href="{}">Next &raquo;</a>"#,
            list_href(path, query, query.sort, query.order, page.page + 1)
        ));
    }
    out.push_str("</div>");
    out
}

fn error_alert(error: Option<&str>) -> String {
    match error {
        Some(message) => format!(
            r#"<div class="alert alert-danger">{}</div>"#,
            html_escape(message)
        ),
        None => String::new(),
    }
}

fn scan_alert(banner: &ScanBanner) -> String {
    format!(
        r#"<div class="alert alert-{}"><code>{}</code><pre>{}</pre></div>"#,
        banner.status.as_str(),
        html_escape(&banner.command_line),
        html_escape(&banner.message)
    )
}

fn filter_form(action: &str, method: &str, query: &ListQuery, extra: &str) -> String {
    format!(
        r#"<form action="{action}" method="{method}">
<input type="text" name="batch_job_id" placeholder="Batch job id" value="{id}">
<input type="text" name="package_name" placeholder="Package name" value="{name}">
<input type="hidden" name="sort" value="{sort}">
<input type="hidden" name="order" value="{order}">
{extra}<button type="submit">Apply</button>
</form>"#,
        action = action,
        method = method,
        id = opt_value(query.batch_job_id.as_deref()),
        name = opt_value(query.package_name.as_deref()),
        sort = html_escape(query.sort),
        order = query.order.as_sql(),
        extra = extra,
    )
}

fn opt_value(value: Option<&str>) -> String {
    value.map(html_escape).unwrap_or_default()
}

fn table_or_empty(headers: String, rows: String, empty: &str) -> String {
    if rows.is_empty() {
        format!(r#"<div class="empty">{}</div>"#, empty)
    } else {
        format!("<table><thead><tr>{}</tr></thead><tbody>{}</tbody></table>", headers, rows)
    }
}

pub fn render_batches(
    page: &Page<BatchRow>,
    query: &ListQuery,
    scan: Option<&ScanBanner>,
    error: Option<&str>,
) -> String {
    const PATH: &str = "/batches";
    let headers = [
        ("batch_job_id", "Batch Job"),
        ("package_name", "Package"),
        ("start_time", "Started"),
        ("stop_time", "Stopped"),
        ("batch_status", "Status"),
        ("discovered_methods", "Methods"),
        ("discovered_methods_date", "Discovered"),
    ]
    .iter()
    .map(|(col, label)| sort_header(PATH, query, col, label))
    .collect::<String>();

    let rows = page
        .rows
        .iter()
        .map(|b| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&b.batch_job_id),
                html_escape(&b.package_name),
                ts(Some(&b.start_time)),
                ts(b.stop_time.as_ref()),
                html_escape(&b.batch_status),
                num(b.discovered_methods),
                ts(b.discovered_methods_date.as_ref()),
            )
        })
        .collect::<String>();

    let scan_field = r#"<input type="text" name="package_to_scan" placeholder="Package to scan">"#;
    let body = format!(
        "{}{}{}{}{}",
        scan.map(scan_alert).unwrap_or_default(),
        error_alert(error),
        filter_form(PATH, "post", query, scan_field),
        table_or_empty(headers, rows, "No batches found."),
        pager(PATH, query, page),
    );
    let title = format!(
        "Batch for Job(s): {}",
        query.batch_job_id.as_deref().unwrap_or("All")
    );
    layout(&title, &body)
}

pub fn render_batch_summaries(
    page: &Page<BatchSummaryRow>,
    query: &ListQuery,
    error: Option<&str>,
) -> String {
    const PATH: &str = "/batches/summaries";
    let headers = [
        ("batch_job_id", "Batch Job"),
        ("package_name", "Package"),
        ("exception_type", "Exception"),
        ("exception_occurences", "Occurrences"),
        ("exception_occurences_date", "Recorded"),
    ]
    .iter()
    .map(|(col, label)| sort_header(PATH, query, col, label))
    .collect::<String>();

    let rows = page
        .rows
        .iter()
        .map(|s| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                opt(s.batch_job_id.as_deref()),
                html_escape(&s.package_name),
                html_escape(&s.exception_type),
                num(s.exception_occurences),
                ts(s.exception_occurences_date.as_ref()),
            )
        })
        .collect::<String>();

    let body = format!(
        "{}{}{}{}",
        error_alert(error),
        filter_form(PATH, "post", query, ""),
        table_or_empty(headers, rows, "No summaries found."),
        pager(PATH, query, page),
    );
    let title = match (&query.package_name, &query.batch_job_id) {
        (Some(name), _) => format!("Batch Summaries for Package {}", name),
        (None, id) => format!("Batch Summaries for Job ID {}", id.as_deref().unwrap_or("All")),
    };
    layout(&title, &body)
}

pub fn render_packages(page: &Page<PackageRow>, query: &ListQuery, error: Option<&str>) -> String {
    const PATH: &str = "/packages";
    let headers = [
        ("name", "Name"),
        ("version", "Version"),
        ("author", "Author"),
        ("home_page", "Home Page"),
        ("license", "License"),
        ("batch_job_id", "Batch Job"),
    ]
    .iter()
    .map(|(col, label)| sort_header(PATH, query, col, label))
    .collect::<String>()
        + "<th>Description</th>";

    let rows = page
        .rows
        .iter()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&p.name),
                html_escape(&p.version),
                opt(p.author.as_deref()),
                opt(p.home_page.as_deref()),
                opt(p.license.as_deref()),
                opt(p.batch_job_id.as_deref()),
                render_description(p.description.as_deref()).unwrap_or_else(|| "-".to_string()),
            )
        })
        .collect::<String>();

    let body = format!(
        "{}{}{}{}",
        error_alert(error),
        filter_form(PATH, "get", query, ""),
        table_or_empty(headers, rows, "No packages found."),
        pager(PATH, query, page),
    );
    layout("Package Info", &body)
}

pub fn render_home(report: &HomeReport, query: &OverviewQuery) -> String {
    let overview = report
        .overview
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                html_escape(&r.package_name),
                html_escape(&r.version),
                html_escape(&r.batch_job_id),
                ts(Some(&r.start_time)),
                ts(r.stop_time.as_ref()),
                html_escape(&r.batch_status),
                num(r.discovered_methods),
                opt(r.exception_count.as_deref()),
            )
        })
        .collect::<String>();

    let topologies = report
        .topologies
        .iter()
        .map(|t| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{} <small>{}</small></td><td>{} <small>{}</small></td><td>{} <small>{}</small></td></tr>",
                html_escape(&t.resolved_name),
                html_escape(&t.batch_job_id),
                t.modules_count,
                opt(t.modules.as_deref()),
                t.classes_count,
                opt(t.classes.as_deref()),
                t.methods_count,
                opt(t.methods.as_deref()),
            )
        })
        .collect::<String>();

    let exceptions = report
        .exceptions
        .iter()
        .map(|e| {
            let pr_href = html_escape(&format!(
                "/pull_requests/new?package_name={}&record_id={}",
                encode(&e.package_name),
                encode(&e.record_id)
            ));
            format!(
                r#"<details><summary>{} &mdash; {}: {}</summary>
<p>Inputs: <code>{}</code></p>
<h4>Source</h4><pre>{}</pre>
<h4>Improved Source</h4><pre>{}</pre>
<h4>Traceback</h4><pre>{}</pre>
<p><a href="{}">Open pull request</a></p>
</details>"#,
                html_escape(&e.method_name),
                opt(e.exception_type.as_deref()),
                opt(e.exception_message.as_deref()),
                opt(e.inputs.as_deref()),
                e.source_html,
                e.improved_source_html,
                e.traceback_html,
                pr_href,
            )
        })
        .collect::<String>();

    let search = format!(
        r#"<form action="/" method="get">
<input type="text" name="package_name" placeholder="Package name" value="{}">
<input type="hidden" name="sort" value="{}">
<input type="hidden" name="order" value="{}">
<button type="submit">Search</button>
</form>"#,
        opt_value(query.package_name.as_deref()),
        html_escape(query.sort),
        query.order.as_sql(),
    );

    let body = format!(
        "{search}<h2>Latest Batches</h2>{}<h2>Topology</h2>{}<h2>Exceptions</h2>{}",
        table_or_empty(
            "<th>Package</th><th>Version</th><th>Batch Job</th><th>Started</th><th>Stopped</th><th>Status</th><th>Methods</th><th>Exceptions</th>".to_string(),
            overview,
            "No batches found.",
        ),
        table_or_empty(
            "<th>Package</th><th>Batch Job</th><th>Modules</th><th>Classes</th><th>Methods</th>".to_string(),
            topologies,
            "No topology recorded.",
        ),
        if exceptions.is_empty() {
            r#"<div class="empty">No exceptions recorded.</div>"#.to_string()
        } else {
            exceptions
        },
        search = search,
    );
    layout("PyFyzz Home", &body)
}

pub fn render_scan_result(title: &str, banner: &ScanBanner) -> String {
    layout(title, &scan_alert(banner))
}

pub fn render_about() -> String {
    layout(
        "About",
        "<p>Browse PyFyzz fuzzing batches, discovered package topology and the \
         exceptions captured while fuzzing, and trigger new scans or remediation \
         pull requests.</p>",
    )
}

pub fn render_not_found() -> String {
    layout("Page Not Found", "<p>The page you requested does not exist.</p>")
}

pub fn render_server_error(message: &str) -> String {
    layout("Server Error", &error_alert(Some(message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fyzzdash_core::{ReportParams, View};

    fn list_query(view: View, params: ReportParams) -> ListQuery {
        ListQuery::from_params(view, &params)
    }

    #[test]
    fn test_list_href_encodes_filters() {
        let q = list_query(
            View::Batches,
            ReportParams { package_name: Some("a&b c".into()), ..Default::default() },
        );
        let href = list_href("/batches", &q, "start_time", SortOrder::Asc, 2);
        assert_eq!(
            href,
            "/batches?package_name=a%26b+c&amp;sort=start_time&amp;order=ASC&amp;page=2&amp;limit=10"
        );
    }

    #[test]
    fn test_sort_header_flips_active_column() {
        let q = list_query(
            View::Batches,
            ReportParams { sort: Some("start_time".into()), order: Some("DESC".into()), ..Default::default() },
        );
        let th = sort_header("/batches", &q, "start_time", "Started");
        assert!(th.contains("order=ASC"));
        assert!(th.contains("▼"));
        let other = sort_header("/batches", &q, "package_name", "Package");
        assert!(other.contains("order=DESC"));
    }

    #[test]
    fn test_scan_banner_escapes_tool_output() {
        let html = render_scan_result(
            "Pull Request Results",
            &ScanBanner {
                status: ScanStatus::Danger,
                command_line: "pyfyzz -p x".into(),
                message: "<script>alert(1)</script>".into(),
            },
        );
        assert!(html.contains("alert-danger"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert(1)"));
    }

    #[test]
    fn test_empty_page_renders_placeholder() {
        let q = list_query(View::Packages, ReportParams::default());
        let html = render_packages(&Page::empty(q.page), &q, Some("Something went wrong!"));
        assert!(html.contains("No packages found."));
        assert!(html.contains("Something went wrong!"));
        assert!(html.contains("Page 1 of 1 (0 rows)"));
    }
}
