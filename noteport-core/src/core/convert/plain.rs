//! Plain-text conversion: styling is stripped, tables become tab-separated
//! lines and links keep their target as `text (url)`. Unordered items share
//! one bullet glyph; numbered items keep their numbers.

use super::tokens::{decode_entities, tokenize, Token};

pub const BULLET: &str = "\u{2022} ";

#[derive(Default)]
struct PlainWriter {
    out: String,
    lists: Vec<Option<usize>>,
    row: Option<Vec<String>>,
    cell: Option<String>,
    links: Vec<(usize, Option<String>)>,
}

impl PlainWriter {
    fn target(&mut self) -> &mut String {
        match self.cell.as_mut() {
            Some(cell) => cell,
            None => &mut self.out,
        }
    }

    fn push(&mut self, text: &str) {
        if self.cell.is_some() {
            // Cells must stay on one line.
            let flat = text.replace(['\n', '\t'], " ");
            self.target().push_str(&flat);
        } else {
            self.target().push_str(text);
        }
    }

    fn end_line(&mut self) {
        if self.cell.is_some() {
            self.push(" ");
        } else if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }
}

/// Converts normalized markup to plain text.
pub fn to_plain_text(markup: &str) -> String {
    let mut w = PlainWriter::default();

    for token in tokenize(markup) {
        match token {
            Token::Text(text) => w.push(&decode_entities(text)),
            Token::Open(tag) => match tag.name {
                "ul" => w.lists.push(None),
                "ol" => w.lists.push(Some(0)),
                "li" => {
                    w.end_line();
                    let indent = "  ".repeat(tag.indent());
                    let marker = match w.lists.last_mut() {
                        Some(Some(n)) => {
                            *n += 1;
                            format!("{n}. ")
                        }
                        // Checklist items already carry their glyph.
                        _ if tag.has_class("checked") || tag.has_class("unchecked") => String::new(),
                        _ => BULLET.to_string(),
                    };
                    w.push(&format!("{indent}{marker}"));
                }
                "tr" => w.row = Some(Vec::new()),
                "td" | "th" => w.cell = Some(String::new()),
                "br" => w.push("\n"),
                "a" => {
                    let start = w.target().len();
                    w.links.push((start, tag.attr("href")));
                }
                "img" => {
                    let alt = tag.attr("alt").unwrap_or_else(|| "image".to_string());
                    w.push(&format!("[Image: {alt}]"));
                }
                _ => {}
            },
            Token::Close(name) => match name {
                "p" | "h1" | "h2" | "h3" | "h4" | "pre" | "li" | "div" => w.end_line(),
                "ul" | "ol" => {
                    w.lists.pop();
                    w.end_line();
                }
                "td" | "th" => {
                    if let (Some(cell), Some(row)) = (w.cell.take(), w.row.as_mut()) {
                        row.push(cell.trim().to_string());
                    }
                }
                "tr" => {
                    if let Some(row) = w.row.take() {
                        w.end_line();
                        w.out.push_str(&row.join("\t"));
                        w.out.push('\n');
                    }
                }
                "a" => {
                    if let Some((start, Some(href))) = w.links.pop() {
                        let text = w.target().get(start..).unwrap_or_default().to_string();
                        if !href.is_empty() && text.trim() != href {
                            w.push(&format!(" ({href})"));
                        }
                    }
                }
                _ => {}
            },
        }
    }

    let trimmed = w.out.trim_end();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_styles_and_keeps_lines() {
        let markup = "<h1>Title</h1><p><b>bold</b> and <i>it</i></p><p>1 &lt; 2</p>";
        assert_eq!(to_plain_text(markup), "Title\nbold and it\n1 < 2\n");
    }

    #[test]
    fn test_lists_use_bullet_and_numbers() {
        let markup = "<ul class=\"dotted\"><li>a</li><li class=\"indent-1\">b</li></ul><ol><li>x</li><li>y</li></ol>";
        assert_eq!(to_plain_text(markup), "\u{2022} a\n  \u{2022} b\n1. x\n2. y\n");
    }

    #[test]
    fn test_dotted_and_dashed_share_one_glyph() {
        let markup = "<ul class=\"dotted\"><li>a</li></ul><ul class=\"dashed\"><li>b</li></ul>";
        assert_eq!(to_plain_text(markup), "\u{2022} a\n\u{2022} b\n");
    }

    #[test]
    fn test_checklist_keeps_glyphs() {
        let markup = "<ul class=\"checklist\"><li class=\"checked\">\u{2611} done</li></ul>";
        assert_eq!(to_plain_text(markup), "\u{2611} done\n");
    }

    #[test]
    fn test_links_show_target() {
        let markup = "<p>see <a href=\"https://x.y/\">site</a> or <a href=\"https://z\">https://z</a></p>";
        assert_eq!(to_plain_text(markup), "see site (https://x.y/) or https://z\n");
    }

    #[test]
    fn test_table_becomes_tab_separated() {
        let markup = "<p>before</p><table><tr><td>a</td><td>b<br>c</td></tr><tr><td></td><td>d</td></tr></table>";
        assert_eq!(to_plain_text(markup), "before\na\tb c\n\td\n");
    }

    #[test]
    fn test_monospace_keeps_newlines() {
        assert_eq!(to_plain_text("<pre>a\n  b</pre><p>c</p>"), "a\n  b\nc\n");
    }
}
