//! Internal domain modules for the Noteport core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod attachment;
pub mod config;
pub mod convert;
pub mod error;
pub mod gzip;
pub mod library;
pub mod markup;
pub mod mergeable;
pub mod model;
pub mod note_body;
pub mod proto;
pub mod render;
pub mod schema;
pub mod store;
pub mod table;

#[doc(inline)]
pub use attachment::{resolve, resolve_row, AttachmentSource, ResolvedAttachment};
#[doc(inline)]
pub use config::{ExportConfig, ExportFormat, FontFamily, MarginUnit, PageMargin, PageSize};
#[doc(inline)]
pub use convert::{convert, DocumentInfo};
#[doc(inline)]
pub use error::{BodyError, DecodeError, InflateError, NoteportError, ResolveError, Result, TableError};
#[doc(inline)]
pub use library::{decode_body, folder_path, NoteLibrary};
#[doc(inline)]
pub use markup::render_note_text;
#[doc(inline)]
pub use mergeable::{decode_mergeable, ObjectGraph};
#[doc(inline)]
pub use model::{Account, AccountKind, AttachmentRef, Folder, Note};
#[doc(inline)]
pub use note_body::{AttributeRun, NoteText, ParagraphKind};
#[doc(inline)]
pub use render::{render_document, ExportedAttachment, RenderedDocument};
#[doc(inline)]
pub use schema::{ColumnMap, LogicalColumn, SchemaGeneration};
#[doc(inline)]
pub use store::Store;
#[doc(inline)]
pub use table::{parse_table, table_from_blob, ParsedTable};
