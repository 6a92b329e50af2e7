//! Per-note export pipeline.
//!
//! A note's body is rendered to normalized markup, its attachment
//! placeholders are replaced by tables, links, images or placeholder text,
//! and the result is handed to the converter for the requested format.

use crate::core::attachment::{self, ResolvedAttachment};
use crate::core::config::{ExportConfig, ExportFormat};
use crate::core::convert::html::escape_html;
use crate::core::convert::tokens::decode_entities;
use crate::core::convert::{convert, DocumentInfo};
use crate::core::error::InflateError;
use crate::core::gzip;
use crate::core::markup;
use crate::core::mergeable::decode_mergeable;
use crate::core::model::Note;
use crate::core::store::{AttachmentRow, Store};
use crate::core::table::table_from_blob;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Type tag of embedded tables.
pub const TABLE_UTI: &str = "com.apple.notes.table";
/// Type tag of URL cards.
pub const URL_UTI: &str = "public.url";
/// Prefix shared by hashtags, mentions and note links.
pub const INLINE_TEXT_UTI_PREFIX: &str = "com.apple.notes.inlinetextattachment";

/// A file the caller should write next to a document that links to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedAttachment {
    pub filename: String,
    pub mime: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// A note converted to one export format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedDocument {
    pub format: ExportFormat,
    pub file_extension: String,
    pub content: String,
    /// Files referenced by relative name from `content`.
    pub attachments: Vec<ExportedAttachment>,
}

fn placeholder_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"<attachment id="([^"]*)" type="([^"]*)"></attachment>"#).ok())
        .as_ref()
}

fn missing(label: &str) -> String {
    format!("[Attachment: {}]", escape_html(label))
}

/// First `http(s)` string in a URL card's mergeable data.
fn url_from_mergeable(blob: &[u8]) -> Option<String> {
    let raw = match gzip::inflate(blob) {
        Ok(raw) => raw,
        Err(InflateError::NotCompressed) => blob.to_vec(),
        Err(e) => {
            warn!("URL card data is unreadable: {e}");
            return None;
        }
    };
    let graph = decode_mergeable(&raw)
        .map_err(|e| warn!("URL card data is malformed: {e}"))
        .ok()?;
    let url = graph
        .register_strings()
        .find(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(str::to_string);
    url
}

struct AttachmentWriter<'a> {
    store: &'a Store,
    format: ExportFormat,
    config: &'a ExportConfig,
    exported: Vec<ExportedAttachment>,
    used_names: HashSet<String>,
}

impl AttachmentWriter<'_> {
    fn substitute(&mut self, identifier: &str, type_uti: &str) -> String {
        let row = match self.store.attachment_row(identifier) {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!("Attachment {identifier} is not in the store");
                return missing(type_uti);
            }
            Err(e) => {
                warn!("Attachment lookup for {identifier} failed: {e}");
                return missing(type_uti);
            }
        };
        let uti = if row.type_uti.is_empty() { type_uti } else { row.type_uti.as_str() };

        if uti == TABLE_UTI {
            self.table(&row, uti)
        } else if uti == URL_UTI {
            self.url_card(&row, uti)
        } else if uti.starts_with(INLINE_TEXT_UTI_PREFIX) {
            match row.alt_text.as_deref() {
                Some(text) => escape_html(text),
                None => missing(uti),
            }
        } else {
            match attachment::resolve_row(self.store.container_dir(), &row) {
                Ok(resolved) => self.file(resolved),
                Err(_) => missing(uti),
            }
        }
    }

    fn table(&self, row: &AttachmentRow, uti: &str) -> String {
        let Some(blob) = row.mergeable_data.as_deref() else {
            warn!("Table {} has no data", row.identifier);
            return missing(uti);
        };
        match table_from_blob(blob) {
            Ok(table) => {
                debug!(
                    "Table {} is {}x{}",
                    row.identifier,
                    table.row_count(),
                    table.column_count()
                );
                table.to_html()
            }
            Err(e) => {
                warn!("Table {} could not be rebuilt: {e}", row.identifier);
                missing(uti)
            }
        }
    }

    fn url_card(&self, row: &AttachmentRow, uti: &str) -> String {
        let url = row
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| row.mergeable_data.as_deref().and_then(url_from_mergeable));
        match url {
            Some(url) => {
                let url = escape_html(&url);
                format!("<a href=\"{url}\">{url}</a>")
            }
            None => missing(uti),
        }
    }

    /// Whether the target format can carry this file inside the document.
    fn embeds_inline(&self, resolved: &ResolvedAttachment) -> bool {
        if !self.config.embed_images_inline {
            return false;
        }
        match self.format {
            ExportFormat::Html => resolved.is_image(),
            ExportFormat::Rtf => matches!(resolved.mime.as_str(), "image/png" | "image/jpeg"),
            _ => false,
        }
    }

    fn file(&mut self, resolved: ResolvedAttachment) -> String {
        if self.embeds_inline(&resolved) {
            let data = general_purpose::STANDARD.encode(&resolved.bytes);
            return format!(
                "<img src=\"data:{};base64,{data}\" alt=\"{}\">",
                escape_html(&resolved.mime),
                escape_html(&resolved.filename)
            );
        }
        if !self.config.link_embedded_images {
            return missing(&resolved.filename);
        }
        let is_image = resolved.is_image();
        let name = escape_html(&self.export(resolved));
        if is_image {
            format!("<img src=\"{name}\" alt=\"{name}\">")
        } else {
            format!("<a href=\"{name}\">{name}</a>")
        }
    }

    /// Queues a file for the caller and returns its unique relative name.
    fn export(&mut self, resolved: ResolvedAttachment) -> String {
        let base = resolved.filename.replace(['/', '\\'], "_");
        let mut name = base.clone();
        if self.used_names.contains(&name) {
            name = format!("{}-{base}", resolved.identifier);
        }
        self.used_names.insert(name.clone());
        self.exported.push(ExportedAttachment {
            filename: name.clone(),
            mime: resolved.mime,
            bytes: resolved.bytes,
        });
        name
    }
}

/// Replaces every attachment placeholder in `markup`.
fn substitute_attachments(
    store: &Store,
    markup: &str,
    format: ExportFormat,
    config: &ExportConfig,
) -> (String, Vec<ExportedAttachment>) {
    let Some(pattern) = placeholder_pattern() else {
        return (markup.to_string(), Vec::new());
    };
    let mut writer = AttachmentWriter {
        store,
        format,
        config,
        exported: Vec::new(),
        used_names: HashSet::new(),
    };
    let out = pattern
        .replace_all(markup, |caps: &Captures<'_>| {
            writer.substitute(&decode_entities(&caps[1]), &decode_entities(&caps[2]))
        })
        .into_owned();
    (out, writer.exported)
}

/// Renders `note` into a complete document of `format`.
///
/// Never fails: anything that cannot be resolved degrades to placeholder text.
pub fn render_document(
    store: &Store,
    note: &Note,
    format: ExportFormat,
    config: &ExportConfig,
) -> RenderedDocument {
    let markup = markup::render_note_text(&note.body);
    let (markup, attachments) = substitute_attachments(store, &markup, format, config);
    let info = DocumentInfo {
        title: note.title.clone(),
        created: note.created,
        modified: note.modified,
    };
    debug!("Rendering note {} as {:?}", note.id, format);
    RenderedDocument {
        format,
        file_extension: format.extension().to_string(),
        content: convert(&markup, format, &info, config),
        attachments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mergeable::fixtures::{graph, register, string_ref};
    use crate::core::note_body::{AttachmentInfo, AttributeRun, NoteText};
    use crate::core::store::fixtures::StoreBuilder;
    use crate::core::table::fixtures::single_cell;

    fn attachment_note(identifier: &str, uti: &str) -> Note {
        let body = NoteText {
            text: "\u{fffc}".to_string(),
            runs: vec![AttributeRun {
                length: 1,
                attachment: Some(AttachmentInfo {
                    identifier: identifier.to_string(),
                    type_uti: uti.to_string(),
                }),
                ..Default::default()
            }],
        };
        Note {
            id: 1,
            title: "Attachments".to_string(),
            text: body.text.clone(),
            created: None,
            modified: None,
            folder_id: None,
            account_id: None,
            attachments: Vec::new(),
            body,
            body_error: None,
        }
    }

    fn fixture() -> StoreBuilder {
        let b = StoreBuilder::new();
        b.account(1, "On My Mac", "LocalAccount", 0)
            .folder(2, "Notes", None, 1)
            .note(3, "Attachments", 2, 1, None);
        b
    }

    #[test]
    fn test_table_attachment_becomes_table() {
        let b = fixture();
        b.attachment(10, "TABLE", TABLE_UTI, 3, None)
            .set(10, "ZMERGEABLEDATA1", single_cell("only"));
        let store = Store::open(b.path()).unwrap();
        let note = attachment_note("TABLE", TABLE_UTI);

        let html = render_document(&store, &note, ExportFormat::Html, &ExportConfig::default());
        assert!(html.content.contains("<table><tr><td>only</td></tr></table>"));
        let md = render_document(&store, &note, ExportFormat::Markdown, &ExportConfig::default());
        assert_eq!(md.content, "| only |\n| --- |\n");
        assert_eq!(md.file_extension, "md");
    }

    #[test]
    fn test_unknown_attachment_renders_placeholder_text() {
        let b = fixture();
        let store = Store::open(b.path()).unwrap();
        let note = attachment_note("GONE", "public.jpeg");
        let doc = render_document(&store, &note, ExportFormat::PlainText, &ExportConfig::default());
        assert_eq!(doc.content, "[Attachment: public.jpeg]\n");
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_url_card_prefers_stored_url() {
        let b = fixture();
        b.attachment(10, "URL", URL_UTI, 3, None)
            .set(10, "ZURLSTRING", "https://example.com/a");
        let store = Store::open(b.path()).unwrap();
        let doc = render_document(
            &store,
            &attachment_note("URL", URL_UTI),
            ExportFormat::Markdown,
            &ExportConfig::default(),
        );
        assert_eq!(doc.content, "[https://example.com/a](https://example.com/a)\n");
    }

    #[test]
    fn test_url_card_falls_back_to_mergeable_data() {
        let b = fixture();
        let data = graph(
            vec![register(string_ref("title")), register(string_ref("https://fallback.example"))],
            &[],
            &[],
            &[],
        );
        b.attachment(10, "URL", URL_UTI, 3, None).set(10, "ZMERGEABLEDATA1", data);
        let store = Store::open(b.path()).unwrap();
        let doc = render_document(
            &store,
            &attachment_note("URL", URL_UTI),
            ExportFormat::PlainText,
            &ExportConfig::default(),
        );
        assert_eq!(doc.content, "https://fallback.example\n");
    }

    #[test]
    fn test_hashtag_uses_alt_text() {
        let b = fixture();
        let uti = "com.apple.notes.inlinetextattachment.hashtag";
        b.attachment(10, "TAG", uti, 3, None).set(10, "ZALTTEXT", "#travel");
        let store = Store::open(b.path()).unwrap();
        let doc = render_document(&store, &attachment_note("TAG", uti), ExportFormat::PlainText, &ExportConfig::default());
        assert_eq!(doc.content, "#travel\n");
    }

    fn image_fixture() -> StoreBuilder {
        let b = fixture();
        b.media(11, "MEDIA", "photo.png", None)
            .attachment(10, "IMG", "public.png", 3, Some(11));
        let dir = b.root().join("Media/MEDIA");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("photo.png"), b"png-bytes").unwrap();
        b
    }

    #[test]
    fn test_html_embeds_images_as_data_uri() {
        let b = image_fixture();
        let store = Store::open(b.path()).unwrap();
        let doc = render_document(
            &store,
            &attachment_note("IMG", "public.png"),
            ExportFormat::Html,
            &ExportConfig::default(),
        );
        let encoded = general_purpose::STANDARD.encode(b"png-bytes");
        assert!(doc
            .content
            .contains(&format!("<img src=\"data:image/png;base64,{encoded}\" alt=\"photo.png\">")));
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_rtf_embeds_png_as_picture() {
        let b = image_fixture();
        let store = Store::open(b.path()).unwrap();
        let doc = render_document(
            &store,
            &attachment_note("IMG", "public.png"),
            ExportFormat::Rtf,
            &ExportConfig::default(),
        );
        assert!(doc.content.contains("{\\pict\\pngblip 706e672d6279746573}"));
        assert!(!doc.content.contains("[Image:"));
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_linked_images_are_returned_alongside() {
        let b = image_fixture();
        let store = Store::open(b.path()).unwrap();
        let config = ExportConfig { link_embedded_images: true, ..Default::default() };
        let doc = render_document(&store, &attachment_note("IMG", "public.png"), ExportFormat::Markdown, &config);
        assert_eq!(doc.content, "![photo.png](photo.png)\n");
        assert_eq!(
            doc.attachments,
            vec![ExportedAttachment {
                filename: "photo.png".to_string(),
                mime: "image/png".to_string(),
                bytes: b"png-bytes".to_vec(),
            }]
        );
    }

    #[test]
    fn test_unlinked_file_names_the_attachment() {
        let b = image_fixture();
        let store = Store::open(b.path()).unwrap();
        let doc = render_document(
            &store,
            &attachment_note("IMG", "public.png"),
            ExportFormat::PlainText,
            &ExportConfig::default(),
        );
        assert_eq!(doc.content, "[Attachment: photo.png]\n");
    }

    #[test]
    fn test_duplicate_export_names_are_disambiguated() {
        let b = image_fixture();
        let store = Store::open(b.path()).unwrap();
        let config = ExportConfig { link_embedded_images: true, ..Default::default() };
        let (_, exported) = substitute_attachments(
            &store,
            &format!("{}{}", markup::placeholder("IMG", "public.png"), markup::placeholder("IMG", "public.png")),
            ExportFormat::Markdown,
            &config,
        );
        let names: Vec<_> = exported.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["photo.png", "IMG-photo.png"]);
    }
}
