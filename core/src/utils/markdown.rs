use pulldown_cmark::{html, Event, Options, Parser};

use crate::utils::artifact::html_escape;

/// Renders a package description from markdown to HTML.
///
/// Raw HTML blocks and inline tags inside the markdown are emitted as escaped
/// text; package descriptions are third-party content.
pub fn render_markdown(raw: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(raw, options).map(|event| match event {
        Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
        other => other,
    });

    let mut out = String::with_capacity(raw.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Markdown when present, escaped raw text as a fallback for empty output.
pub fn render_description(raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    if raw.trim().is_empty() {
        return None;
    }
    let rendered = render_markdown(raw);
    if rendered.trim().is_empty() {
        Some(html_escape(raw))
    } else {
        Some(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_basic_markdown() {
        let out = render_markdown("# Title\n\nSome **bold** text.");
        assert!(out.contains("<h1>Title</h1>"));
        assert!(out.contains("<strong>bold</strong>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let out = render_markdown("hello <script>alert(1)</script>\n\n<div onclick=\"x()\">hi</div>\n");
        assert!(!out.contains("<script>"));
        assert!(!out.contains("<div onclick"));
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_description_absent_or_blank() {
        assert_eq!(render_description(None), None);
        assert_eq!(render_description(Some("  \n")), None);
        assert!(render_description(Some("text")).unwrap().contains("<p>text</p>"));
    }
}
