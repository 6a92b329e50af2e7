//! Tokenizer for normalized markup, shared by the text converters.

/// One lexical unit of normalized markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Open(Tag<'a>),
    Close(&'a str),
    /// Raw text, still entity-escaped.
    Text(&'a str),
}

/// An opening tag with its unparsed attribute string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag<'a> {
    pub name: &'a str,
    attrs: &'a str,
}

impl<'a> Tag<'a> {
    /// Entity-decoded value of a double-quoted attribute.
    pub fn attr(&self, key: &str) -> Option<String> {
        let mut rest = self.attrs;
        while let Some(pos) = rest.find(key) {
            let before_ok = rest[..pos]
                .chars()
                .next_back()
                .map_or(true, char::is_whitespace);
            let after = &rest[pos + key.len()..];
            if before_ok {
                if let Some(value) = after.strip_prefix("=\"") {
                    let end = value.find('"')?;
                    return Some(decode_entities(&value[..end]));
                }
            }
            rest = after;
        }
        None
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    /// Indent level from an `indent-N` class, zero when absent.
    pub fn indent(&self) -> usize {
        self.attr("class")
            .and_then(|c| {
                c.split_whitespace()
                    .find_map(|c| c.strip_prefix("indent-").and_then(|n| n.parse().ok()))
            })
            .unwrap_or(0)
    }
}

/// Splits markup into tags and text.
///
/// A `<` that does not start a well-formed tag is kept as text.
pub fn tokenize(markup: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;
    let bytes = markup.as_bytes();

    while let Some(offset) = markup[pos..].find('<') {
        let lt = pos + offset;
        let closing = bytes.get(lt + 1) == Some(&b'/');
        let name_start = lt + 1 + usize::from(closing);
        let starts_name = bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic);
        let gt = markup[lt..].find('>').map(|g| lt + g);
        let (true, Some(gt)) = (starts_name, gt) else {
            pos = lt + 1;
            continue;
        };

        if text_start < lt {
            tokens.push(Token::Text(&markup[text_start..lt]));
        }
        let inner = &markup[name_start..gt];
        let name_end = inner
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(inner.len());
        let name = &inner[..name_end];
        if closing {
            tokens.push(Token::Close(name));
        } else {
            let attrs = inner[name_end..].trim_end_matches('/').trim();
            tokens.push(Token::Open(Tag { name, attrs }));
        }
        pos = gt + 1;
        text_start = pos;
    }

    if text_start < markup.len() {
        tokens.push(Token::Text(&markup[text_start..]));
    }
    tokens
}

/// Reverses the escaping applied by the markup renderer.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_tags_and_text() {
        let tokens = tokenize("<p>a &amp; b</p><br>");
        assert_eq!(tokens.len(), 4);
        assert!(matches!(tokens[0], Token::Open(t) if t.name == "p"));
        assert_eq!(tokens[1], Token::Text("a &amp; b"));
        assert_eq!(tokens[2], Token::Close("p"));
        assert!(matches!(tokens[3], Token::Open(t) if t.name == "br"));
    }

    #[test]
    fn test_attributes() {
        let tokens = tokenize(r#"<li class="checked indent-2"><a href="x?a=1&amp;b=2">"#);
        let Token::Open(li) = tokens[0] else { panic!("expected li") };
        assert!(li.has_class("checked"));
        assert!(!li.has_class("indent"));
        assert_eq!(li.indent(), 2);
        let Token::Open(a) = tokens[1] else { panic!("expected a") };
        assert_eq!(a.attr("href").as_deref(), Some("x?a=1&b=2"));
        assert_eq!(a.attr("ref"), None);
    }

    #[test]
    fn test_stray_angle_bracket_is_text() {
        let tokens = tokenize("1 < 2 <b>x</b>");
        assert_eq!(tokens[0], Token::Text("1 < 2 "));
        assert!(matches!(tokens[1], Token::Open(t) if t.name == "b"));
    }

    #[test]
    fn test_decode_entities_unescapes_ampersand_last() {
        assert_eq!(decode_entities("&amp;lt; &lt;"), "&lt; <");
    }
}
