//! The read-only note library facade.

use crate::core::attachment::{self, ResolvedAttachment};
use crate::core::config::{ExportConfig, ExportFormat};
use crate::core::error::{BodyError, ResolveError};
use crate::core::gzip;
use crate::core::model::{Account, AttachmentRef, Folder, Note};
use crate::core::note_body::{decode_note_store, NoteText};
use crate::core::render::{render_document, RenderedDocument};
use crate::core::store::{NoteRow, Store};
use crate::Result;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Decompresses and decodes a stored note body.
///
/// # Errors
///
/// Returns [`BodyError::Missing`] when there is no blob, otherwise the
/// inflate or decode failure. Uncompressed blobs are not reinterpreted.
pub fn decode_body(data: Option<&[u8]>) -> std::result::Result<NoteText, BodyError> {
    let data = data.filter(|d| !d.is_empty()).ok_or(BodyError::Missing)?;
    let raw = gzip::inflate(data)?;
    Ok(decode_note_store(&raw)?)
}

/// Folder names from the root down to `folder_id`.
///
/// Unknown parents end the walk; a parent cycle is cut at the first repeat.
pub fn folder_path(folders: &[Folder], folder_id: i64) -> Vec<String> {
    let by_id: HashMap<i64, &Folder> = folders.iter().map(|f| (f.id, f)).collect();
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(folder_id);
    while let Some(id) = current {
        if !seen.insert(id) {
            warn!("Folder {folder_id} has a parent cycle at {id}");
            break;
        }
        let Some(folder) = by_id.get(&id) else {
            break;
        };
        path.push(folder.name.clone());
        current = folder.parent_id;
    }
    path.reverse();
    path
}

/// An open note store.
///
/// Each `NoteLibrary` owns its own read-only connection. Threads that export
/// in parallel open one library each; a library is never shared between them.
pub struct NoteLibrary {
    store: Store,
}

impl NoteLibrary {
    /// Opens the store at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NoteportError::InvalidStore`] if the file is not a note
    /// store, or [`crate::NoteportError::Database`] for any SQLite failure.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { store: Store::open(path)? })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.store.accounts()
    }

    /// Every live folder, duplicates included.
    pub fn folders(&self) -> Result<Vec<Folder>> {
        self.store.folders()
    }

    /// Folder names from the root down to `folder_id`, for display.
    pub fn folder_path(&self, folder_id: i64) -> Result<Vec<String>> {
        Ok(folder_path(&self.store.folders()?, folder_id))
    }

    /// Every exportable note with its decoded body.
    ///
    /// A note whose body cannot be decoded is still returned, with an empty
    /// body and [`Note::body_error`] set.
    pub fn notes(&self) -> Result<Vec<Note>> {
        let rows = self.store.note_rows()?;
        debug!("Decoding {} notes", rows.len());
        Ok(rows.into_iter().map(|row| self.build_note(row)).collect())
    }

    /// Fetches a single note by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NoteportError::NoteNotFound`] if the note does not
    /// exist or is excluded from export.
    pub fn note(&self, id: i64) -> Result<Note> {
        let row = self.store.note_row(id)?;
        Ok(self.build_note(row))
    }

    /// Renders an already loaded note.
    pub fn render_note(&self, note: &Note, format: ExportFormat, config: &ExportConfig) -> RenderedDocument {
        render_document(&self.store, note, format, config)
    }

    /// Loads and renders the note `id`.
    pub fn export_note(&self, id: i64, format: ExportFormat, config: &ExportConfig) -> Result<RenderedDocument> {
        let note = self.note(id)?;
        Ok(self.render_note(&note, format, config))
    }

    /// Attachment bytes plus a best-guess MIME type.
    pub fn resolve_attachment(&self, identifier: &str) -> std::result::Result<ResolvedAttachment, ResolveError> {
        attachment::resolve(&self.store, identifier)
    }

    fn build_note(&self, row: NoteRow) -> Note {
        let (body, body_error) = match decode_body(row.data.as_deref()) {
            Ok(body) => (body, None),
            Err(BodyError::Missing) => {
                debug!("Note {} has no body data", row.id);
                (NoteText::default(), Some(BodyError::Missing))
            }
            Err(e) => {
                warn!("Note {} ({:?}) body is unreadable: {e}", row.id, row.title);
                (NoteText::default(), Some(e))
            }
        };
        let attachments = body
            .attachments()
            .map(|info| AttachmentRef {
                identifier: info.identifier.clone(),
                type_uti: info.type_uti.clone(),
                filename: self.attachment_filename(&info.identifier),
            })
            .collect();

        Note {
            id: row.id,
            title: row.title,
            text: body.text.clone(),
            created: row.created,
            modified: row.modified,
            folder_id: row.folder_id,
            account_id: row.account_id,
            attachments,
            body,
            body_error,
        }
    }

    fn attachment_filename(&self, identifier: &str) -> Option<String> {
        match self.store.attachment_row(identifier) {
            Ok(row) => row.and_then(|r| r.media).and_then(|m| m.filename),
            Err(e) => {
                debug!("No file name for attachment {identifier}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::InflateError;
    use crate::core::note_body::fixtures::*;
    use crate::core::note_body::ParagraphKind;
    use crate::core::store::fixtures::StoreBuilder;
    use crate::core::table::fixtures::single_cell;
    use crate::NoteportError;
    use chrono::TimeZone;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn fixture() -> StoreBuilder {
        let b = StoreBuilder::new();
        b.account(1, "iCloud", "ACCT", 1)
            .folder(2, "Notes", None, 1)
            .folder(3, "Trips", Some(2), 1);
        b
    }

    #[test]
    fn test_dotted_list_note_end_to_end() {
        let b = fixture();
        let body = gzip(&note_store(note("Hello\nWorld", vec![with_style(run(11), 100)])));
        b.note(10, "Greeting", 2, 1, Some(&body));
        let library = NoteLibrary::open(b.path()).unwrap();

        let note = library.note(10).unwrap();
        assert!(note.has_body());
        assert_eq!(note.text, "Hello\nWorld");
        assert_eq!(note.body.runs[0].paragraph_kind(), ParagraphKind::DottedList);

        let doc = library.render_note(&note, ExportFormat::Html, &ExportConfig::default());
        assert!(doc
            .content
            .contains("<ul class=\"dotted\"><li>Hello</li><li>World</li></ul>"));
        assert_eq!(doc.content.matches("<li>").count(), 2);
    }

    #[test]
    fn test_corrupt_body_keeps_metadata() {
        let b = fixture();
        b.note(10, "Broken", 3, 1, Some(b"\x00\x01not a compressed blob".as_slice()));
        let library = NoteLibrary::open(b.path()).unwrap();

        let note = library.note(10).unwrap();
        assert_eq!(note.id, 10);
        assert_eq!(note.title, "Broken");
        assert_eq!(note.folder_id, Some(3));
        assert_eq!(note.account_id, Some(1));
        assert_eq!(note.created, Some(chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        assert_eq!(note.modified, Some(chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap()));
        assert_eq!(note.text, "");
        assert!(!note.has_body());
        assert_eq!(note.body_error, Some(BodyError::Inflate(InflateError::NotCompressed)));
    }

    #[test]
    fn test_one_bad_note_does_not_affect_others() {
        let b = fixture();
        let good = gzip(&note_store(note("fine", vec![run(4)])));
        let mut damaged = gzip(b"whatever");
        damaged.truncate(12);
        b.note(10, "Good", 2, 1, Some(&good))
            .note(11, "Damaged", 2, 1, Some(&damaged))
            .note(12, "Empty", 2, 1, None);
        let library = NoteLibrary::open(b.path()).unwrap();

        let notes = library.notes().unwrap();
        assert_eq!(notes.len(), 3);
        let by_title = |t: &str| notes.iter().find(|n| n.title == t).unwrap();
        assert_eq!(by_title("Good").text, "fine");
        assert!(matches!(
            by_title("Damaged").body_error,
            Some(BodyError::Inflate(InflateError::CorruptStream(_)))
        ));
        assert_eq!(by_title("Empty").body_error, Some(BodyError::Missing));
    }

    #[test]
    fn test_three_line_list_has_three_items() {
        let b = fixture();
        let body = gzip(&note_store(note("a\nb\nc\n", vec![with_style(run(6), 102)])));
        b.note(10, "List", 2, 1, Some(&body));
        let library = NoteLibrary::open(b.path()).unwrap();
        let doc = library.export_note(10, ExportFormat::Markdown, &ExportConfig::default()).unwrap();
        assert_eq!(doc.content, "1. a\n2. b\n3. c\n");
    }

    #[test]
    fn test_rtf_export_escapes_text_but_not_bold_group() {
        let b = fixture();
        let body = gzip(&note_store(note(
            "C:\\dir {x} bold",
            vec![run(11), run(4).varint(5, 1)],
        )));
        b.note(10, "Paths", 2, 1, Some(&body));
        let library = NoteLibrary::open(b.path()).unwrap();
        let doc = library.export_note(10, ExportFormat::Rtf, &ExportConfig::default()).unwrap();
        assert!(doc.content.contains("\\pard C:\\\\dir \\{x\\} {\\b bold}\\par\n"));
        assert_eq!(doc.file_extension, "rtf");
    }

    #[test]
    fn test_table_attachment_through_note() {
        let b = fixture();
        let body = gzip(&note_store(note(
            "Costs\n\u{fffc}",
            vec![run(6), with_attachment(run(1), "TBL", "com.apple.notes.table")],
        )));
        b.note(10, "Budget", 2, 1, Some(&body))
            .attachment(20, "TBL", "com.apple.notes.table", 10, None)
            .set(20, "ZMERGEABLEDATA1", gzip(&single_cell("42")));
        let library = NoteLibrary::open(b.path()).unwrap();

        let note = library.note(10).unwrap();
        assert_eq!(note.attachments.len(), 1);
        assert_eq!(note.attachments[0].identifier, "TBL");
        let doc = library.render_note(&note, ExportFormat::PlainText, &ExportConfig::default());
        assert_eq!(doc.content, "Costs\n42\n");
    }

    #[test]
    fn test_attachment_filename_comes_from_media() {
        let b = fixture();
        let body = gzip(&note_store(note(
            "\u{fffc}",
            vec![with_attachment(run(1), "IMG", "public.jpeg")],
        )));
        b.note(10, "Photo", 2, 1, Some(&body))
            .media(21, "MEDIA", "beach.jpg", Some("G1"))
            .attachment(20, "IMG", "public.jpeg", 10, Some(21));
        let library = NoteLibrary::open(b.path()).unwrap();
        let note = library.note(10).unwrap();
        assert_eq!(note.attachments[0].filename.as_deref(), Some("beach.jpg"));
        assert_eq!(
            library.resolve_attachment("IMG"),
            Err(ResolveError::NotFound("IMG".to_string()))
        );
        assert_eq!(
            library.resolve_attachment("NOPE"),
            Err(ResolveError::UnknownAttachment("NOPE".to_string()))
        );
    }

    #[test]
    fn test_missing_note_is_an_error() {
        let b = fixture();
        let library = NoteLibrary::open(b.path()).unwrap();
        assert!(matches!(library.note(99), Err(NoteportError::NoteNotFound(99))));
    }

    #[test]
    fn test_folder_path() {
        let b = fixture();
        let library = NoteLibrary::open(b.path()).unwrap();
        assert_eq!(library.folder_path(3).unwrap(), vec!["Notes", "Trips"]);
        assert!(library.folder_path(99).unwrap().is_empty());
    }

    #[test]
    fn test_folder_path_cycle_terminates() {
        let folders = vec![
            Folder { id: 1, name: "a".to_string(), parent_id: Some(2), account_id: None },
            Folder { id: 2, name: "b".to_string(), parent_id: Some(1), account_id: None },
        ];
        assert_eq!(folder_path(&folders, 1), vec!["b", "a"]);
    }

    #[test]
    fn test_libraries_on_separate_threads() {
        let b = fixture();
        for id in 10..14 {
            let body = gzip(&note_store(note(&format!("note {id}"), vec![run(7)])));
            b.note(id, &format!("N{id}"), 2, 1, Some(&body));
        }
        let path = b.path();
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let library = NoteLibrary::open(&path).unwrap();
                    library
                        .notes()
                        .unwrap()
                        .iter()
                        .map(|n| library.render_note(n, ExportFormat::PlainText, &ExportConfig::default()).content)
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        for handle in handles {
            let mut out = handle.join().unwrap();
            out.sort();
            assert_eq!(out, vec!["note 10\n", "note 11\n", "note 12\n", "note 13\n"]);
        }
    }
}
