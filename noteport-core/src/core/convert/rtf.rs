//! RTF conversion.
//!
//! Literal text is escaped (`\`, `{`, `}`, then non-ASCII as `\uN?`) as soon
//! as it leaves the tokenizer; control words are only ever appended by the
//! writer itself, so escaping can never touch them.

use super::tokens::{decode_entities, tokenize, Token};
use crate::core::config::ExportConfig;
use base64::{engine::general_purpose, Engine as _};

/// Points to twips.
fn twips(points: f64) -> i64 {
    (points * 20.0).round() as i64
}

/// Escapes literal text for an RTF body.
pub fn escape_rtf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\n' => out.push_str("\\line "),
            '\t' => out.push_str("\\tab "),
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // Control word parameters are signed 16-bit.
                    out.push_str(&format!("\\u{}?", *unit as i16));
                }
            }
        }
    }
    out
}

/// Builds a picture group from a base64 `data:` URI carrying PNG or JPEG.
fn picture(src: &str) -> Option<String> {
    let (blip, data) = if let Some(data) = src.strip_prefix("data:image/png;base64,") {
        ("\\pngblip", data)
    } else if let Some(data) = src.strip_prefix("data:image/jpeg;base64,") {
        ("\\jpegblip", data)
    } else {
        return None;
    };
    let bytes = general_purpose::STANDARD.decode(data.trim()).ok()?;
    let mut out = String::with_capacity(bytes.len() * 2 + 16);
    out.push_str("{\\pict");
    out.push_str(blip);
    out.push(' ');
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out.push('}');
    Some(out)
}

struct RtfWriter<'c> {
    config: &'c ExportConfig,
    out: String,
    lists: Vec<Option<usize>>,
    list_marker: Vec<&'static str>,
    row: Option<Vec<String>>,
    cell: Option<String>,
}

impl<'c> RtfWriter<'c> {
    fn push(&mut self, s: &str) {
        match self.cell.as_mut() {
            Some(cell) => cell.push_str(s),
            None => self.out.push_str(s),
        }
    }

    fn heading_size(&self, level: u8) -> i64 {
        let scale = match level {
            1 => 2.0,
            2 => 1.6,
            _ => 1.3,
        };
        (self.config.font_size * 2.0 * scale).round() as i64
    }

    fn header(&self) -> String {
        let (width, height) = self.config.page_size.dimensions_pt();
        let margin = twips(self.config.margin_points());
        format!(
            "{{\\rtf1\\ansi\\ansicpg1252\\deff0\n\
             {{\\fonttbl{{\\f0\\fnil {};}}{{\\f1\\fmodern Courier New;}}}}\n\
             \\paperw{}\\paperh{}\\margl{margin}\\margr{margin}\\margt{margin}\\margb{margin}\n\
             \\f0\\fs{}\n",
            self.config.font_family.face_name(),
            twips(width),
            twips(height),
            (self.config.font_size * 2.0).round() as i64,
        )
    }

    fn finish_row(&mut self, cells: Vec<String>) {
        if cells.is_empty() {
            return;
        }
        let (width, _) = self.config.page_size.dimensions_pt();
        let usable = twips(width) - 2 * twips(self.config.margin_points());
        let cell_width = (usable / cells.len() as i64).max(360);
        self.out.push_str("\\trowd\\trgaph108");
        for i in 1..=cells.len() as i64 {
            self.out.push_str(&format!("\\clbrdrt\\brdrs\\clbrdrl\\brdrs\\clbrdrb\\brdrs\\clbrdrr\\brdrs\\cellx{}", i * cell_width));
        }
        self.out.push_str("\n\\pard\\intbl ");
        for cell in cells {
            self.out.push_str(&cell);
            self.out.push_str("\\cell ");
        }
        self.out.push_str("\\row\n\\pard ");
    }
}

/// Converts normalized markup to a complete RTF document.
pub fn to_rtf(markup: &str, config: &ExportConfig) -> String {
    let mut w = RtfWriter {
        config,
        out: String::new(),
        lists: Vec::new(),
        list_marker: Vec::new(),
        row: None,
        cell: None,
    };
    let body_size = (config.font_size * 2.0).round() as i64;

    for token in tokenize(markup) {
        match token {
            Token::Text(text) => w.push(&escape_rtf(&decode_entities(text))),
            Token::Open(tag) => match tag.name {
                "h1" | "h2" | "h3" => {
                    let level = tag.name.as_bytes()[1] - b'0';
                    let size = w.heading_size(level);
                    w.push(&format!("\\pard{{\\b\\fs{size} "));
                }
                "p" | "div" => w.push("\\pard "),
                "pre" => w.push("\\pard{\\f1 "),
                "b" | "strong" => w.push("{\\b "),
                "i" | "em" => w.push("{\\i "),
                "u" => w.push("{\\ul "),
                "s" | "del" => w.push("{\\strike "),
                "sup" => w.push("{\\super "),
                "sub" => w.push("{\\sub "),
                "a" => {
                    let href = escape_rtf(&tag.attr("href").unwrap_or_default()).replace('"', "\\'22");
                    w.push(&format!(
                        "{{\\field{{\\*\\fldinst{{HYPERLINK \"{href}\"}}}}{{\\fldrslt{{\\ul "
                    ));
                }
                "ul" => {
                    w.lists.push(None);
                    w.list_marker.push(if tag.has_class("dashed") {
                        "\\endash\\tab "
                    } else if tag.has_class("checklist") {
                        ""
                    } else {
                        "\\bullet\\tab "
                    });
                }
                "ol" => {
                    w.lists.push(Some(0));
                    w.list_marker.push("");
                }
                "li" => {
                    let indent = 360 * (tag.indent() as i64 + 1);
                    let marker = match w.lists.last_mut() {
                        Some(Some(n)) => {
                            *n += 1;
                            format!("{n}.\\tab ")
                        }
                        _ => w.list_marker.last().copied().unwrap_or_default().to_string(),
                    };
                    w.push(&format!("\\pard\\li{indent}\\fi-360 {marker}"));
                }
                "br" => w.push("\\line "),
                "img" => match tag.attr("src").as_deref().and_then(picture) {
                    Some(pict) => w.push(&pict),
                    None => {
                        let alt = tag.attr("alt").unwrap_or_else(|| "image".to_string());
                        w.push(&escape_rtf(&format!("[Image: {alt}]")));
                    }
                },
                "tr" => w.row = Some(Vec::new()),
                "td" | "th" => w.cell = Some(String::new()),
                _ => {}
            },
            Token::Close(name) => match name {
                "h1" | "h2" | "h3" => w.push(&format!("}}\\fs{body_size}\\par\n")),
                "p" | "li" | "div" => w.push("\\par\n"),
                "pre" => w.push("}\\par\n"),
                "b" | "strong" | "i" | "em" | "u" | "s" | "del" | "sup" | "sub" => w.push("}"),
                "a" => w.push("}}}"),
                "ul" | "ol" => {
                    w.lists.pop();
                    w.list_marker.pop();
                    w.push("\\pard\n");
                }
                "td" | "th" => {
                    if let (Some(cell), Some(row)) = (w.cell.take(), w.row.as_mut()) {
                        row.push(cell);
                    }
                }
                "tr" => {
                    if let Some(cells) = w.row.take() {
                        w.finish_row(cells);
                    }
                }
                _ => {}
            },
        }
    }

    let mut doc = w.header();
    doc.push_str(&w.out);
    doc.push('}');
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(markup: &str) -> String {
        let doc = to_rtf(markup, &ExportConfig::default());
        let start = doc.find("\\fs24\n").map(|i| i + "\\fs24\n".len()).unwrap();
        doc[start..doc.len() - 1].to_string()
    }

    #[test]
    fn test_literal_specials_escaped_but_control_words_are_not() {
        let out = body("<p>C:\\dir {x} <b>bold}</b></p>");
        assert_eq!(out, "\\pard C:\\\\dir \\{x\\} {\\b bold\\}}\\par\n");
        // The injected bold group opens with an unescaped brace.
        assert!(out.contains("{\\b "));
        assert!(!out.contains("\\{\\b"));
    }

    #[test]
    fn test_non_ascii_uses_unicode_escapes() {
        assert_eq!(escape_rtf("caf\u{e9}"), "caf\\u233?");
        assert_eq!(escape_rtf("\u{1F600}"), "\\u-10179?\\u-8704?");
    }

    #[test]
    fn test_entities_are_decoded_before_escaping() {
        assert_eq!(body("<p>a &amp; &lt;b&gt;</p>"), "\\pard a & <b>\\par\n");
    }

    #[test]
    fn test_header_reflects_config() {
        let doc = to_rtf("", &ExportConfig::default());
        assert!(doc.starts_with("{\\rtf1\\ansi"));
        assert!(doc.contains("\\paperw12240\\paperh15840"));
        assert!(doc.contains("\\margl1440"));
        assert!(doc.contains("{\\f0\\fnil Helvetica;}"));
        assert!(doc.ends_with('}'));
    }

    #[test]
    fn test_lists_and_links() {
        let out = body("<ol><li>one</li></ol><p><a href=\"https://x\">x</a></p>");
        assert!(out.contains("\\pard\\li360\\fi-360 1.\\tab one\\par\n"));
        assert!(out.contains("{\\field{\\*\\fldinst{HYPERLINK \"https://x\"}}{\\fldrslt{\\ul x}}}"));
    }

    #[test]
    fn test_table_rows() {
        let out = body("<table><tr><td>a</td><td>b</td></tr></table>");
        assert!(out.starts_with("\\trowd\\trgaph108"));
        assert!(out.contains("\\pard\\intbl a\\cell b\\cell \\row"));
    }

    #[test]
    fn test_braces_stay_balanced() {
        let doc = to_rtf(
            "<h1>T</h1><ul class=\"dashed\"><li><i>x</i></li></ul><pre>{code}</pre>",
            &ExportConfig::default(),
        );
        let mut depth = 0i32;
        let mut prev = ' ';
        for c in doc.chars() {
            if prev != '\\' {
                match c {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            prev = if prev == '\\' && c == '\\' { ' ' } else { c };
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn test_png_and_jpeg_data_uris_become_pictures() {
        let png = general_purpose::STANDARD.encode([0x89, b'P', b'N', b'G']);
        let out = body(&format!("<p><img src=\"data:image/png;base64,{png}\" alt=\"a.png\"></p>"));
        assert_eq!(out, "\\pard {\\pict\\pngblip 89504e47}\\par\n");

        let jpeg = general_purpose::STANDARD.encode([0xff, 0xd8]);
        let out = body(&format!("<img src=\"data:image/jpeg;base64,{jpeg}\" alt=\"b.jpg\">"));
        assert!(out.starts_with("{\\pict\\jpegblip ffd8}"));
    }

    #[test]
    fn test_other_images_keep_placeholder() {
        let out = body("<img src=\"data:image/gif;base64,R0lG\" alt=\"c.gif\">");
        assert!(out.starts_with("[Image: c.gif]"));
        let out = body("<img src=\"data:image/png;base64,@@@\" alt=\"d.png\">");
        assert!(out.starts_with("[Image: d.png]"));
    }
}
