//! Rendering of a note's text and attribute runs into normalized markup.
//!
//! Normalized markup is a small, fixed HTML subset that every converter in
//! [`crate::core::convert`] understands:
//!
//! | Construct | Markup |
//! |---|---|
//! | paragraph line | `<p>…</p>` |
//! | title / heading / subheading | `<h1>` / `<h2>` / `<h3>` |
//! | monospaced lines | `<pre>…</pre>` |
//! | dotted / dashed / checklist | `<ul class="dotted|dashed|checklist"><li>…</li></ul>` |
//! | numbered | `<ol><li>…</li></ol>` |
//! | checklist item | `<li class="checked">☑ …` / `<li class="unchecked">☐ …` |
//! | indented item | `class="indent-N"` on the `<li>` |
//! | inline styles | `<a href>`, `<b>`, `<i>`, `<u>`, `<s>`, `<sup>`/`<sub>` nested in that order |
//! | attachment | `<attachment id="…" type="…"></attachment>` placeholder |
//! | attachment between blocks | the placeholder inside `<div class="attachment">` |
//!
//! Rendering never fails: unknown paragraph styles render as paragraphs and
//! runs that overrun the text are clamped to it.

use crate::core::convert::html::escape_html;
use crate::core::note_body::{AttributeRun, NoteText, ParagraphKind};

pub const CHECKED_GLYPH: char = '\u{2611}';
pub const UNCHECKED_GLYPH: char = '\u{2610}';
const OBJECT_REPLACEMENT: char = '\u{fffc}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Paragraph,
    Heading(u8),
    Pre,
    List(ParagraphKind),
}

impl Block {
    fn for_kind(kind: ParagraphKind) -> Self {
        match kind {
            ParagraphKind::Title => Self::Heading(1),
            ParagraphKind::Heading => Self::Heading(2),
            ParagraphKind::Subheading => Self::Heading(3),
            ParagraphKind::Monospaced => Self::Pre,
            k if k.is_list() => Self::List(k),
            _ => Self::Paragraph,
        }
    }

    fn open_tag(self) -> &'static str {
        match self {
            Self::Paragraph => "<p>",
            Self::Heading(1) => "<h1>",
            Self::Heading(2) => "<h2>",
            Self::Heading(_) => "<h3>",
            Self::Pre => "<pre>",
            Self::List(ParagraphKind::DashedList) => "<ul class=\"dashed\">",
            Self::List(ParagraphKind::NumberedList) => "<ol>",
            Self::List(ParagraphKind::Checklist) => "<ul class=\"checklist\">",
            Self::List(_) => "<ul class=\"dotted\">",
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            Self::Paragraph => "</p>",
            Self::Heading(1) => "</h1>",
            Self::Heading(2) => "</h2>",
            Self::Heading(_) => "</h3>",
            Self::Pre => "</pre>",
            Self::List(ParagraphKind::NumberedList) => "</ol>",
            Self::List(_) => "</ul>",
        }
    }
}

#[derive(Default)]
struct Renderer {
    out: String,
    block: Option<Block>,
    item_open: bool,
    pending_pre_newlines: usize,
}

impl Renderer {
    fn close_block(&mut self) {
        if let Some(block) = self.block.take() {
            if self.item_open {
                self.out.push_str("</li>");
                self.item_open = false;
            }
            self.pending_pre_newlines = 0;
            self.out.push_str(block.close_tag());
        }
    }

    /// Makes sure `block` is open and ready for inline content.
    fn ensure_open(&mut self, block: Block, run: &AttributeRun) {
        if self.block != Some(block) {
            self.close_block();
            self.out.push_str(block.open_tag());
            self.block = Some(block);
        }
        match block {
            Block::List(kind) if !self.item_open => {
                self.open_item(kind, run);
            }
            Block::Pre => {
                for _ in 0..self.pending_pre_newlines {
                    self.out.push('\n');
                }
                self.pending_pre_newlines = 0;
            }
            _ => {}
        }
    }

    fn open_item(&mut self, kind: ParagraphKind, run: &AttributeRun) {
        let style = run.paragraph.as_ref();
        let indent = style.map(|p| p.indent).unwrap_or(0);
        let mut classes = Vec::new();
        let mut glyph = None;
        if kind == ParagraphKind::Checklist {
            let done = style.and_then(|p| p.checklist.as_ref()).is_some_and(|c| c.done);
            classes.push(if done { "checked" } else { "unchecked" }.to_string());
            glyph = Some(if done { CHECKED_GLYPH } else { UNCHECKED_GLYPH });
        }
        if indent > 0 {
            classes.push(format!("indent-{indent}"));
        }
        if classes.is_empty() {
            self.out.push_str("<li>");
        } else {
            self.out.push_str(&format!("<li class=\"{}\">", classes.join(" ")));
        }
        if let Some(glyph) = glyph {
            self.out.push(glyph);
            self.out.push(' ');
        }
        self.item_open = true;
    }

    fn newline(&mut self) {
        match self.block {
            Some(Block::List(_)) => {
                if self.item_open {
                    self.out.push_str("</li>");
                    self.item_open = false;
                }
            }
            Some(Block::Pre) => self.pending_pre_newlines += 1,
            Some(_) => self.close_block(),
            None => {}
        }
    }

    fn text_run(&mut self, block: Block, text: &str, run: &AttributeRun) {
        for segment in text.split_inclusive('\n') {
            let (content, ends_line) = match segment.strip_suffix('\n') {
                Some(content) => (content, true),
                None => (segment, false),
            };
            let content: String = content.chars().filter(|&c| c != OBJECT_REPLACEMENT).collect();
            if !content.is_empty() {
                self.ensure_open(block, run);
                push_styled(&mut self.out, &content, run);
            }
            if ends_line {
                self.newline();
            }
        }
    }

    fn attachment_run(&mut self, block: Block, run: &AttributeRun) {
        let Some(info) = run.attachment.as_ref() else {
            return;
        };
        let tag = placeholder(&info.identifier, &info.type_uti);
        if self.block != Some(block) && block == Block::Paragraph {
            // Standalone attachment between blocks.
            self.close_block();
            self.out.push_str(&format!("<div class=\"attachment\">{tag}</div>"));
        } else {
            self.ensure_open(block, run);
            self.out.push_str(&tag);
        }
    }
}

/// The placeholder tag that attachment resolution later replaces.
pub fn placeholder(identifier: &str, type_uti: &str) -> String {
    format!(
        "<attachment id=\"{}\" type=\"{}\"></attachment>",
        escape_html(identifier),
        escape_html(type_uti)
    )
}

/// Wraps `text` in the run's inline styles, outermost first: link, bold,
/// italic, underline, strikethrough, super/subscript.
fn push_styled(out: &mut String, text: &str, run: &AttributeRun) {
    let mut closers: Vec<&str> = Vec::new();
    if let Some(link) = run.link.as_deref().filter(|l| !l.is_empty()) {
        out.push_str(&format!("<a href=\"{}\">", escape_html(link)));
        closers.push("</a>");
    }
    let flags = [
        (run.bold, "<b>", "</b>"),
        (run.italic, "<i>", "</i>"),
        (run.underline, "<u>", "</u>"),
        (run.strikethrough, "<s>", "</s>"),
        (run.superscript > 0, "<sup>", "</sup>"),
        (run.superscript < 0, "<sub>", "</sub>"),
    ];
    for (on, open, close) in flags {
        if on {
            out.push_str(open);
            closers.push(close);
        }
    }
    out.push_str(&escape_html(text));
    for close in closers.iter().rev() {
        out.push_str(close);
    }
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

/// Renders `text` annotated by `runs` into normalized markup.
///
/// Run lengths are UTF-16 code units. Runs past the end of the text are
/// clamped; text after the last run renders as unstyled prose. A run ending
/// between the halves of a surrogate pair is extended to cover the pair.
pub fn render(text: &str, runs: &[AttributeRun]) -> String {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut renderer = Renderer::default();
    let mut cursor = 0usize;

    for run in runs {
        let mut end = cursor.saturating_add(run.length).min(units.len());
        if end > cursor && end < units.len() && is_high_surrogate(units[end - 1]) {
            end += 1;
        }
        let slice = String::from_utf16_lossy(&units[cursor..end]);
        cursor = end;

        let block = Block::for_kind(run.paragraph_kind());
        if run.attachment.is_some() {
            renderer.attachment_run(block, run);
        } else if !slice.is_empty() {
            renderer.text_run(block, &slice, run);
        }
    }

    if cursor < units.len() {
        let rest = String::from_utf16_lossy(&units[cursor..]);
        renderer.text_run(Block::Paragraph, &rest, &AttributeRun::default());
    }

    renderer.close_block();
    renderer.out
}

/// Renders a decoded note body.
pub fn render_note_text(note: &NoteText) -> String {
    render(&note.text, &note.runs)
}
