//! HTML output: escaping helpers and the standalone document wrapper.

use crate::core::config::ExportConfig;

/// Escapes HTML special characters in a plain-text string.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Builds the stylesheet for an exported document.
fn stylesheet(config: &ExportConfig) -> String {
    let mut css = format!(
        "@page {{ size: {}; margin: {}; }}\n\
         body {{ font-family: {}; font-size: {}pt; line-height: 1.4; }}\n\
         pre {{ font-family: Menlo, Monaco, monospace; background: #f5f5f5; padding: 0.5em; white-space: pre-wrap; }}\n\
         ul.dashed {{ list-style-type: \"\\2013  \"; }}\n\
         ul.checklist {{ list-style: none; padding-left: 1.2em; }}\n\
         table {{ border-collapse: collapse; margin: 0.5em 0; }}\n\
         td {{ border: 1px solid #ccc; padding: 4px 8px; vertical-align: top; }}\n\
         img {{ max-width: 100%; }}\n",
        config.page_size.css_name(),
        config.page_margin,
        config.font_family.css_stack(),
        config.font_size,
    );
    for level in 1..=4 {
        css.push_str(&format!("li.indent-{level} {{ margin-left: {}em; }}\n", level * 2));
    }
    css
}

/// Wraps rendered body markup in a complete HTML page.
pub fn to_document(title: &str, body: &str, config: &ExportConfig) -> String {
    let mut doc = String::with_capacity(body.len() + 1024);
    doc.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    if let Some(author) = config.author.as_deref() {
        doc.push_str(&format!("<meta name=\"author\" content=\"{}\">\n", escape_html(author)));
    }
    doc.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    doc.push_str("<style>\n");
    doc.push_str(&stylesheet(config));
    doc.push_str("</style>\n</head>\n<body>\n");
    doc.push_str(body);
    doc.push_str("\n</body>\n</html>\n");
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{FontFamily, PageMargin, MarginUnit, PageSize};

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_document_carries_config() {
        let config = ExportConfig {
            font_family: FontFamily::Monospace,
            font_size: 14.0,
            page_size: PageSize::A4,
            page_margin: PageMargin { value: 2.0, unit: MarginUnit::Em },
            author: Some("A & B".to_string()),
            ..Default::default()
        };
        let doc = to_document("Notes <1>", "<p>hi</p>", &config);
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>Notes &lt;1&gt;</title>"));
        assert!(doc.contains("size: A4; margin: 2em;"));
        assert!(doc.contains("font-size: 14pt"));
        assert!(doc.contains("Menlo, Monaco, \"Courier New\", monospace"));
        assert!(doc.contains("content=\"A &amp; B\""));
        assert!(doc.contains("<body>\n<p>hi</p>\n</body>"));
    }
}
