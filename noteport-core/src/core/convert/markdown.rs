//! Markdown conversion (CommonMark with GFM tables, strikethrough and task
//! lists).
//!
//! Monospaced blocks are lifted out before any inline processing so their
//! content reaches the fenced block untouched. Output is normalized: at most
//! one blank line between blocks and exactly one trailing newline.

use super::tokens::{decode_entities, tokenize, Tag, Token};
use crate::core::markup::{CHECKED_GLYPH, UNCHECKED_GLYPH};

enum Segment<'a> {
    Code(String),
    Markup(Vec<Token<'a>>),
}

/// Splits the token stream into monospaced blocks and everything else.
fn split_code_blocks(markup: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut current = Vec::new();
    let mut code: Option<String> = None;

    for token in tokenize(markup) {
        if let Some(buf) = code.as_mut() {
            match token {
                Token::Text(text) => buf.push_str(&decode_entities(text)),
                Token::Open(tag) if tag.name == "br" => buf.push('\n'),
                Token::Close("pre") => {
                    segments.push(Segment::Code(std::mem::take(buf)));
                    code = None;
                }
                _ => {}
            }
            continue;
        }
        match token {
            Token::Open(tag) if tag.name == "pre" => {
                if !current.is_empty() {
                    segments.push(Segment::Markup(std::mem::take(&mut current)));
                }
                code = Some(String::new());
            }
            other => current.push(other),
        }
    }
    if let Some(buf) = code {
        segments.push(Segment::Code(buf));
    }
    if !current.is_empty() {
        segments.push(Segment::Markup(current));
    }
    segments
}

fn escape_inline(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\\' | '*' | '_' | '`' | '[' | ']' | '~' | '|' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Backslash-escapes a leading heading, list or setext marker on `line`.
fn escape_block_marker(line: &str) -> String {
    let body = line.trim_start_matches([' ', '\t']);
    let indent = &line[..line.len() - body.len()];
    let digits = body.len() - body.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let split = match body[digits..].chars().next() {
        Some('.' | ')') if digits > 0 => digits,
        Some('#' | '-' | '+' | '=') if digits == 0 => 0,
        _ => return line.to_string(),
    };
    format!("{indent}{}\\{}", &body[..split], &body[split..])
}

/// Escapes literal text so it renders as typed. Every line after the first
/// starts a new Markdown line; the first does so only when `at_line_start`.
fn escape_text(text: &str, at_line_start: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        let line = escape_inline(line);
        if i == 0 && !at_line_start {
            out.push_str(&line);
            continue;
        }
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&escape_block_marker(&line));
    }
    out
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    /// One entry per open list: `true` when ordered.
    lists: Vec<bool>,
    /// Item counters per indent level of the innermost ordered list.
    counters: Vec<usize>,
    strip_glyph: bool,
    /// Set right after a list marker, where a block marker would still apply.
    item_start: bool,
    /// Emphasis openers held back until the first non-blank text.
    pending: Vec<&'static str>,
    links: Vec<Option<String>>,
    table: Option<Vec<Vec<String>>>,
    cell: Option<String>,
}

impl MarkdownWriter {
    fn push(&mut self, text: &str) {
        match self.cell.as_mut() {
            Some(cell) => cell.push_str(text),
            None => self.out.push_str(text),
        }
    }

    fn start_line(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn blank_line(&mut self) {
        self.start_line();
        if !self.out.is_empty() && !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn open_item(&mut self, tag: &Tag<'_>) {
        self.start_line();
        let indent = tag.indent();
        self.push(&"    ".repeat(indent));
        if self.lists.last() == Some(&true) {
            if self.counters.len() <= indent {
                self.counters.resize(indent + 1, 0);
            }
            self.counters.truncate(indent + 1);
            self.counters[indent] += 1;
            let n = self.counters[indent];
            self.push(&format!("{n}. "));
        } else if tag.has_class("checked") {
            self.push("- [x] ");
            self.strip_glyph = true;
        } else if tag.has_class("unchecked") {
            self.push("- [ ] ");
            self.strip_glyph = true;
        } else {
            self.push("- ");
        }
        self.item_start = true;
    }

    fn open_inline(&mut self, sigil: &'static str) {
        self.pending.push(sigil);
    }

    fn flush_pending(&mut self) {
        let sigils: String = self.pending.drain(..).collect();
        self.push(&sigils);
    }

    /// Closes emphasis so that trailing whitespace lands outside the delimiter.
    fn close_inline(&mut self, sigil: &'static str) {
        if let Some(pos) = self.pending.iter().rposition(|s| *s == sigil) {
            self.pending.remove(pos);
            return;
        }
        let target = match self.cell.as_mut() {
            Some(cell) => cell,
            None => &mut self.out,
        };
        let kept = target.trim_end().len();
        let trailing = target.split_off(kept);
        target.push_str(sigil);
        target.push_str(&trailing);
    }

    fn text(&mut self, raw: &str) {
        let mut text = decode_entities(raw);
        if std::mem::take(&mut self.strip_glyph) {
            text = text
                .trim_start_matches([CHECKED_GLYPH, UNCHECKED_GLYPH])
                .trim_start()
                .to_string();
        }
        let item_start = std::mem::take(&mut self.item_start);
        let escaped = match self.cell {
            Some(_) => escape_inline(&text).replace('\n', "<br>"),
            None => {
                let at_line_start = item_start || self.out.is_empty() || self.out.ends_with('\n');
                escape_text(&text, at_line_start)
            }
        };
        let body = escaped.trim_start();
        if body.is_empty() || self.pending.is_empty() {
            self.push(&escaped);
            return;
        }
        self.push(&escaped[..escaped.len() - body.len()]);
        self.flush_pending();
        self.push(body);
    }

    fn finish_table(&mut self, rows: Vec<Vec<String>>) {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }
        self.blank_line();
        let line = |cells: &[String]| {
            let mut padded: Vec<&str> = cells.iter().map(|c| c.trim()).collect();
            padded.resize(columns, "");
            format!("| {} |\n", padded.join(" | "))
        };
        let mut rows = rows.into_iter();
        if let Some(header) = rows.next() {
            self.out.push_str(&line(&header));
            self.out.push_str(&format!("|{}\n", " --- |".repeat(columns)));
        }
        for row in rows {
            self.out.push_str(&line(&row));
        }
        self.out.push('\n');
    }

    fn markup(&mut self, tokens: Vec<Token<'_>>) {
        for token in tokens {
            match token {
                Token::Text(text) => self.text(text),
                Token::Open(tag) => match tag.name {
                    "h1" | "h2" | "h3" | "h4" => {
                        self.blank_line();
                        let level = usize::from(tag.name.as_bytes()[1] - b'0');
                        self.push(&format!("{} ", "#".repeat(level)));
                    }
                    "p" => self.start_line(),
                    "div" => self.blank_line(),
                    "ul" | "ol" => {
                        if self.lists.is_empty() {
                            self.blank_line();
                        }
                        self.lists.push(tag.name == "ol");
                        self.counters.clear();
                    }
                    "li" => self.open_item(&tag),
                    "b" | "strong" => self.open_inline("**"),
                    "i" | "em" => self.open_inline("*"),
                    "s" | "del" => self.open_inline("~~"),
                    "a" => {
                        self.flush_pending();
                        self.links.push(tag.attr("href"));
                        self.push("[");
                    }
                    "img" => {
                        self.flush_pending();
                        let alt = tag.attr("alt").unwrap_or_default();
                        let src = tag.attr("src").unwrap_or_default();
                        self.push(&format!("![{}]({src})", escape_inline(&alt)));
                    }
                    "br" => self.push(if self.cell.is_some() { "<br>" } else { "  \n" }),
                    "table" => self.table = Some(Vec::new()),
                    "tr" => {
                        if let Some(rows) = self.table.as_mut() {
                            rows.push(Vec::new());
                        }
                    }
                    "td" | "th" => self.cell = Some(String::new()),
                    _ => {}
                },
                Token::Close(name) => match name {
                    "h1" | "h2" | "h3" | "h4" | "p" | "div" => self.blank_line(),
                    "li" => self.start_line(),
                    "ul" | "ol" => {
                        self.lists.pop();
                        if self.lists.is_empty() {
                            self.blank_line();
                        }
                    }
                    "b" | "strong" => self.close_inline("**"),
                    "i" | "em" => self.close_inline("*"),
                    "s" | "del" => self.close_inline("~~"),
                    "a" => {
                        let href = self.links.pop().flatten().unwrap_or_default();
                        self.push(&format!("]({href})"));
                    }
                    "td" | "th" => {
                        if let (Some(cell), Some(row)) =
                            (self.cell.take(), self.table.as_mut().and_then(|t| t.last_mut()))
                        {
                            row.push(cell);
                        }
                    }
                    "table" => {
                        if let Some(rows) = self.table.take() {
                            self.finish_table(rows);
                        }
                    }
                    _ => {}
                },
            }
        }
    }

    fn code(&mut self, code: &str) {
        self.blank_line();
        let fence = if code.contains("```") { "~~~~" } else { "```" };
        self.out.push_str(fence);
        self.out.push('\n');
        self.out.push_str(code.trim_end_matches('\n'));
        self.out.push('\n');
        self.out.push_str(fence);
        self.out.push_str("\n\n");
    }
}

/// Collapses runs of blank lines and ends the text with one newline.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0;
    for c in text.trim().chars() {
        if c == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(c);
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Converts normalized markup to Markdown.
pub fn to_markdown(markup: &str) -> String {
    let mut w = MarkdownWriter::default();
    for segment in split_code_blocks(markup) {
        match segment {
            Segment::Code(code) => w.code(&code),
            Segment::Markup(tokens) => w.markup(tokens),
        }
    }
    normalize(&w.out)
}
