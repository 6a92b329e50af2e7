//! Core library for Noteport, which reads a note store without modifying it and
//! renders its notes as portable documents.
//!
//! The primary entry point is [`NoteLibrary`], which represents an open
//! `NoteStore.sqlite` file. Each note's compressed body is decoded into
//! styled text, rendered to normalized markup and converted to HTML, plain
//! text, Markdown, RTF or LaTeX with [`NoteLibrary::render_note`].
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use core::{
    attachment::{guess_mime, resolve, resolve_row, AttachmentSource, ResolvedAttachment},
    config::{ExportConfig, ExportFormat, FontFamily, MarginUnit, PageMargin, PageSize},
    convert::{convert, DocumentInfo},
    error::{BodyError, DecodeError, InflateError, NoteportError, ResolveError, Result, TableError},
    gzip::inflate,
    library::{decode_body, folder_path, NoteLibrary},
    markup::render_note_text,
    mergeable::{decode_mergeable, ObjectGraph},
    model::{Account, AccountKind, AttachmentRef, Folder, Note},
    note_body::{decode_note_store, AttributeRun, NoteText, ParagraphKind},
    render::{render_document, ExportedAttachment, RenderedDocument},
    schema::{ColumnMap, LogicalColumn, SchemaGeneration},
    store::Store,
    table::{parse_table, table_from_blob, ParsedTable},
};
