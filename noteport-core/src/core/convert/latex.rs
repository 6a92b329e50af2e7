//! LaTeX conversion and template filling.

use super::tokens::{decode_entities, tokenize, Token};
use super::DocumentInfo;
use crate::core::config::ExportConfig;
use crate::core::markup::{CHECKED_GLYPH, UNCHECKED_GLYPH};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Template used when the configuration does not supply one.
pub const DEFAULT_TEMPLATE: &str = include_str!("default_template.tex");

/// Escapes the characters LaTeX treats specially.
///
/// Each input character maps independently, so replacement text introduced
/// for one character is never re-escaped by another rule.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' => out.push_str("\\&"),
            '%' => out.push_str("\\%"),
            '$' => out.push_str("\\$"),
            '#' => out.push_str("\\#"),
            '_' => out.push_str("\\_"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            CHECKED_GLYPH => out.push_str("$\\boxtimes$"),
            UNCHECKED_GLYPH => out.push_str("$\\square$"),
            c => out.push(c),
        }
    }
    out
}

fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        if matches!(c, '%' | '#' | '&' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Default)]
struct LatexWriter {
    out: String,
    lists: Vec<&'static str>,
    strip_glyph: bool,
    in_pre: bool,
    table: Option<Vec<Vec<String>>>,
    cell: Option<String>,
}

impl LatexWriter {
    fn push(&mut self, s: &str) {
        match self.cell.as_mut() {
            Some(cell) => cell.push_str(s),
            None => self.out.push_str(s),
        }
    }

    fn text(&mut self, raw: &str) {
        let mut text = decode_entities(raw);
        if self.in_pre {
            self.out.push_str(&text);
            return;
        }
        if std::mem::take(&mut self.strip_glyph) {
            text = text
                .trim_start_matches([CHECKED_GLYPH, UNCHECKED_GLYPH])
                .trim_start()
                .to_string();
        }
        let escaped = escape_latex(&text);
        self.push(&escaped.replace('\n', "\\newline\n"));
    }

    fn finish_table(&mut self, rows: Vec<Vec<String>>) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        self.out.push_str(&format!("\\begin{{tabular}}{{|{}}}\n\\hline\n", "l|".repeat(columns)));
        for mut row in rows {
            row.resize(columns, String::new());
            self.out.push_str(&row.join(" & "));
            self.out.push_str(" \\\\\n\\hline\n");
        }
        self.out.push_str("\\end{tabular}\n\n");
    }
}

/// Converts normalized markup to a LaTeX body fragment.
pub fn to_latex_body(markup: &str) -> String {
    let mut w = LatexWriter::default();

    for token in tokenize(markup) {
        if w.in_pre && !matches!(token, Token::Text(_) | Token::Close("pre")) {
            continue;
        }
        match token {
            Token::Text(text) => w.text(text),
            Token::Open(tag) => match tag.name {
                "h1" => w.push("\\section*{"),
                "h2" => w.push("\\subsection*{"),
                "h3" | "h4" => w.push("\\subsubsection*{"),
                "pre" => {
                    w.in_pre = true;
                    w.push("\\begin{verbatim}\n");
                }
                "b" | "strong" => w.push("\\textbf{"),
                "i" | "em" => w.push("\\textit{"),
                "u" => w.push("\\uline{"),
                "s" | "del" => w.push("\\sout{"),
                "sup" => w.push("\\textsuperscript{"),
                "sub" => w.push("\\textsubscript{"),
                "a" => {
                    let href = tag.attr("href").unwrap_or_default();
                    w.push(&format!("\\href{{{}}}{{", escape_url(&href)));
                }
                "ul" | "ol" => {
                    let env = if tag.name == "ol" { "enumerate" } else { "itemize" };
                    w.lists.push(env);
                    w.push(&format!("\\begin{{{env}}}\n"));
                }
                "li" => {
                    let indent = "\\quad ".repeat(tag.indent());
                    if tag.has_class("checked") {
                        w.push(&format!("\\item[$\\boxtimes$] {indent}"));
                        w.strip_glyph = true;
                    } else if tag.has_class("unchecked") {
                        w.push(&format!("\\item[$\\square$] {indent}"));
                        w.strip_glyph = true;
                    } else {
                        w.push(&format!("\\item {indent}"));
                    }
                }
                "br" => w.push("\\newline\n"),
                "img" => match tag.attr("src").filter(|s| !s.is_empty() && !s.starts_with("data:")) {
                    Some(src) => {
                        w.push(&format!("\\includegraphics[width=\\linewidth]{{{src}}}\n\n"))
                    }
                    None => {
                        let alt = tag.attr("alt").unwrap_or_else(|| "image".to_string());
                        w.push(&escape_latex(&format!("[Image: {alt}]")));
                    }
                },
                "table" => w.table = Some(Vec::new()),
                "tr" => {
                    if let Some(rows) = w.table.as_mut() {
                        rows.push(Vec::new());
                    }
                }
                "td" | "th" => w.cell = Some(String::new()),
                _ => {}
            },
            Token::Close(name) => match name {
                "h1" | "h2" | "h3" | "h4" => w.push("}\n\n"),
                "p" | "div" => w.push("\n\n"),
                "pre" => {
                    w.in_pre = false;
                    if !w.out.ends_with('\n') {
                        w.out.push('\n');
                    }
                    w.out.push_str("\\end{verbatim}\n\n");
                }
                "b" | "strong" | "i" | "em" | "u" | "s" | "del" | "sup" | "sub" | "a" => w.push("}"),
                "li" => w.push("\n"),
                "ul" | "ol" => {
                    let env = w.lists.pop().unwrap_or("itemize");
                    w.push(&format!("\\end{{{env}}}\n\n"));
                }
                "td" | "th" => {
                    if let (Some(cell), Some(row)) =
                        (w.cell.take(), w.table.as_mut().and_then(|t| t.last_mut()))
                    {
                        row.push(cell);
                    }
                }
                "table" => {
                    if let Some(rows) = w.table.take() {
                        w.finish_table(rows);
                    }
                }
                _ => {}
            },
        }
    }

    w.out.trim_end().to_string()
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").ok())
        .as_ref()
}

/// Replaces `{{name}}` placeholders with `values`; unknown names are left as written.
pub fn fill_template(template: &str, values: &HashMap<&str, String>) -> String {
    let Some(pattern) = placeholder_pattern() else {
        return template.to_string();
    };
    pattern
        .replace_all(template, |caps: &Captures<'_>| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Renders markup into a complete LaTeX document using the configured template.
pub fn to_latex_document(markup: &str, info: &DocumentInfo, config: &ExportConfig) -> String {
    let date = |d: Option<chrono::DateTime<chrono::Utc>>| {
        d.map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string()).unwrap_or_default()
    };
    let mut values = HashMap::new();
    values.insert("title", escape_latex(&info.title));
    values.insert("body", to_latex_body(markup));
    values.insert("created", date(info.created));
    values.insert("modified", date(info.modified));
    values.insert("author", escape_latex(config.author.as_deref().unwrap_or_default()));
    values.insert("paper", config.page_size.latex_paper().to_string());
    values.insert("margin", format!("{:.1}pt", config.margin_points()));

    let template = config.latex_template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
    fill_template(template, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_special_characters() {
        assert_eq!(
            escape_latex(r"\ & % $ # _ { } ~ ^"),
            r"\textbackslash{} \& \% \$ \# \_ \{ \} \textasciitilde{} \textasciicircum{}"
        );
    }

    #[test]
    fn test_body_structure() {
        let markup = "<h1>Plan</h1><p><b>50%</b> done</p><ol><li>a_b</li></ol>";
        assert_eq!(
            to_latex_body(markup),
            "\\section*{Plan}\n\n\\textbf{50\\%} done\n\n\\begin{enumerate}\n\\item a\\_b\n\\end{enumerate}"
        );
    }

    #[test]
    fn test_verbatim_is_not_escaped() {
        let body = to_latex_body("<pre>a_b &amp; {c}</pre>");
        assert_eq!(body, "\\begin{verbatim}\na_b & {c}\n\\end{verbatim}");
    }

    #[test]
    fn test_checklist_items() {
        let body = to_latex_body(
            "<ul class=\"checklist\"><li class=\"checked\">\u{2611} x</li><li class=\"unchecked\">\u{2610} y</li></ul>",
        );
        assert!(body.contains("\\item[$\\boxtimes$] x\n"));
        assert!(body.contains("\\item[$\\square$] y\n"));
    }

    #[test]
    fn test_unknown_placeholders_survive() {
        let mut values = HashMap::new();
        values.insert("title", "T".to_string());
        assert_eq!(
            fill_template("{{title}} {{ title }} {{nope}} {single}", &values),
            "T T {{nope}} {single}"
        );
    }

    #[test]
    fn test_body_containing_braces_is_not_rescanned() {
        let mut values = HashMap::new();
        values.insert("body", "{{title}}".to_string());
        values.insert("title", "T".to_string());
        assert_eq!(fill_template("{{body}}", &values), "{{title}}");
    }

    #[test]
    fn test_document_uses_default_template() {
        let info = DocumentInfo {
            title: "Q&A".to_string(),
            created: Some(chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            modified: None,
        };
        let config = ExportConfig { author: Some("Ann".to_string()), ..Default::default() };
        let doc = to_latex_document("<p>hi</p>", &info, &config);
        assert!(doc.contains("\\title{ Q\\&A }"));
        assert!(doc.contains("\\author{ Ann }"));
        assert!(doc.contains("[letterpaper,margin=72.0pt]{geometry}"));
        assert!(doc.contains("Created 2024-01-02 03:04 UTC"));
        assert!(doc.contains("\n\nhi\n\n"));
        assert!(!doc.contains("{{"));
    }

    #[test]
    fn test_custom_template() {
        let config = ExportConfig {
            latex_template: Some("%{{title}}|{{body}}|{{custom}}".to_string()),
            ..Default::default()
        };
        let info = DocumentInfo { title: "x".to_string(), ..Default::default() };
        assert_eq!(to_latex_document("<p>y</p>", &info, &config), "%x|y|{{custom}}");
    }
}
