//! Read-only access to the note store's SQLite database.
//!
//! All record kinds live in one object table and are told apart by an entity
//! number looked up in `Z_PRIMARYKEY`. Column names come from a
//! [`ColumnMap`] resolved when the store is opened.

use crate::core::model::{store_timestamp, Account, AccountKind, Folder};
use crate::core::schema::{ColumnMap, LogicalColumn as C, NOTE_DATA_TABLE, OBJECT_TABLE};
use crate::{NoteportError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Entity numbers of the record kinds this library reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entities {
    pub account: Option<i64>,
    pub folder: Option<i64>,
    pub note: i64,
    pub attachment: Option<i64>,
    pub media: Option<i64>,
}

impl Entities {
    fn load(conn: &Connection) -> Result<Self> {
        let mut stmt = conn.prepare("SELECT Z_NAME, Z_ENT FROM Z_PRIMARYKEY")?;
        let by_name = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        let note = by_name
            .get("ICNote")
            .copied()
            .ok_or_else(|| NoteportError::InvalidStore("no ICNote entity".to_string()))?;
        Ok(Self {
            account: by_name.get("ICAccount").copied(),
            folder: by_name.get("ICFolder").copied(),
            note,
            attachment: by_name.get("ICAttachment").copied(),
            media: by_name.get("ICMedia").copied(),
        })
    }
}

/// Note metadata plus its still-compressed body blob.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteRow {
    pub id: i64,
    pub title: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub folder_id: Option<i64>,
    pub account_id: Option<i64>,
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRow {
    pub id: i64,
    pub identifier: String,
    pub filename: Option<String>,
    pub generation: Option<String>,
}

/// Everything the store knows about one attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRow {
    pub id: i64,
    pub identifier: String,
    pub type_uti: String,
    pub note_id: Option<i64>,
    /// Identifier of the owning note's account; names its media directory.
    pub account_identifier: Option<String>,
    pub mergeable_data: Option<Vec<u8>>,
    pub url: Option<String>,
    pub alt_text: Option<String>,
    pub fallback_image_generation: Option<String>,
    pub fallback_pdf_generation: Option<String>,
    pub media: Option<MediaRow>,
}

/// An open, read-only note store.
pub struct Store {
    conn: Connection,
    path: PathBuf,
    columns: ColumnMap,
    entities: Entities,
}

impl Store {
    /// Opens the store at `path` without ever writing to it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(5000))?;
        conn.pragma_update(None, "query_only", "ON")?;

        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type='table'
             AND name IN (?1, ?2, 'Z_PRIMARYKEY')",
            [OBJECT_TABLE, NOTE_DATA_TABLE],
            |row| row.get(0),
        )?;
        if table_count != 3 {
            return Err(NoteportError::InvalidStore(
                "Not a note store database".to_string(),
            ));
        }

        let entities = Entities::load(&conn)?;
        let columns = ColumnMap::probe(&conn)?;
        log::debug!(
            "Opened {} (schema {:?}, entities {:?})",
            path.display(),
            columns.generation(),
            entities
        );
        Ok(Self { conn, path, columns, entities })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the database file; media paths are relative to it.
    pub fn container_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn accounts(&self) -> Result<Vec<Account>> {
        let Some(entity) = self.entities.account else {
            return Ok(Vec::new());
        };
        let c = &self.columns;
        let sql = format!(
            "SELECT a.Z_PK, {}, {}, {} FROM {OBJECT_TABLE} a WHERE a.Z_ENT = ?1 ORDER BY a.Z_PK",
            c.expr("a", C::AccountName),
            c.expr("a", C::AccountIdentifier),
            c.expr("a", C::AccountType),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([entity], |row| {
            let identifier: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            let kind = AccountKind::classify(&identifier, row.get(3)?);
            Ok(Account {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                identifier,
                kind,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// All folders not marked for deletion, duplicates included.
    pub fn folders(&self) -> Result<Vec<Folder>> {
        let Some(entity) = self.entities.folder else {
            return Ok(Vec::new());
        };
        let c = &self.columns;
        let sql = format!(
            "SELECT f.Z_PK, {}, {}, {} FROM {OBJECT_TABLE} f
             WHERE f.Z_ENT = ?1 AND COALESCE({}, 0) = 0
             ORDER BY f.Z_PK",
            c.expr("f", C::FolderTitle),
            c.expr("f", C::FolderParent),
            c.expr("f", C::FolderAccount),
            c.expr("f", C::MarkedForDeletion),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([entity], |row| {
            Ok(Folder {
                id: row.get(0)?,
                name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                parent_id: row.get(2)?,
                account_id: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    fn note_query(&self, filter: &str) -> String {
        let c = &self.columns;
        format!(
            "SELECT n.Z_PK, {}, {}, {}, {}, {}, d.ZDATA
             FROM {OBJECT_TABLE} n
             LEFT JOIN {NOTE_DATA_TABLE} d ON d.ZNOTE = n.Z_PK
             WHERE n.Z_ENT = ?1
             AND COALESCE({}, 0) = 0
             AND COALESCE({}, 0) = 0
             {filter}
             ORDER BY n.Z_PK",
            c.expr("n", C::NoteTitle),
            c.expr("n", C::NoteCreated),
            c.expr("n", C::NoteModified),
            c.expr("n", C::NoteFolder),
            c.expr("n", C::NoteAccount),
            c.expr("n", C::NotePasswordProtected),
            c.expr("n", C::MarkedForDeletion),
        )
    }

    fn map_note_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NoteRow> {
        Ok(NoteRow {
            id: row.get(0)?,
            title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            created: row.get::<_, Option<f64>>(2)?.and_then(store_timestamp),
            modified: row.get::<_, Option<f64>>(3)?.and_then(store_timestamp),
            folder_id: row.get(4)?,
            account_id: row.get(5)?,
            data: row.get(6)?,
        })
    }

    /// Every exportable note. Password-protected and deleted notes never leave the query.
    pub fn note_rows(&self) -> Result<Vec<NoteRow>> {
        let mut stmt = self.conn.prepare(&self.note_query(""))?;
        let rows = stmt.query_map([self.entities.note], Self::map_note_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    pub fn note_row(&self, id: i64) -> Result<NoteRow> {
        let mut stmt = self.conn.prepare(&self.note_query("AND n.Z_PK = ?2"))?;
        stmt.query_row([self.entities.note, id], Self::map_note_row)
            .optional()?
            .ok_or(NoteportError::NoteNotFound(id))
    }

    /// Looks up an attachment, its media record and its account by identifier.
    pub fn attachment_row(&self, identifier: &str) -> Result<Option<AttachmentRow>> {
        let Some(entity) = self.entities.attachment else {
            return Ok(None);
        };
        let c = &self.columns;
        let sql = format!(
            "SELECT a.Z_PK, {}, {}, n.Z_PK, {}, {}, {}, {}, {}, {},
                    m.Z_PK, {}, {}, {}
             FROM {OBJECT_TABLE} a
             LEFT JOIN {OBJECT_TABLE} n ON n.Z_PK = {}
             LEFT JOIN {OBJECT_TABLE} acc ON acc.Z_PK = {}
             LEFT JOIN {OBJECT_TABLE} m ON m.Z_PK = {}
             WHERE a.Z_ENT = ?1 AND {} = ?2
             LIMIT 1",
            c.expr("a", C::AttachmentIdentifier),
            c.expr("a", C::AttachmentType),
            c.expr("acc", C::AccountIdentifier),
            c.expr("a", C::AttachmentMergeableData),
            c.expr("a", C::AttachmentUrl),
            c.expr("a", C::AttachmentAltText),
            c.expr("a", C::FallbackImageGeneration),
            c.expr("a", C::FallbackPdfGeneration),
            c.expr("m", C::AttachmentIdentifier),
            c.expr("m", C::MediaFilename),
            c.expr("m", C::MediaGeneration),
            c.expr("a", C::AttachmentNote),
            c.expr("n", C::NoteAccount),
            c.expr("a", C::AttachmentMedia),
            c.expr("a", C::AttachmentIdentifier),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt
            .query_row(rusqlite::params![entity, identifier], |row| {
                let media = match row.get::<_, Option<i64>>(10)? {
                    Some(id) => Some(MediaRow {
                        id,
                        identifier: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
                        filename: row.get(12)?,
                        generation: generation_text(row, 13)?,
                    }),
                    None => None,
                };
                Ok(AttachmentRow {
                    id: row.get(0)?,
                    identifier: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    type_uti: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    note_id: row.get(3)?,
                    account_identifier: row.get(4)?,
                    mergeable_data: row.get(5)?,
                    url: row.get(6)?,
                    alt_text: row.get(7)?,
                    fallback_image_generation: generation_text(row, 8)?,
                    fallback_pdf_generation: generation_text(row, 9)?,
                    media,
                })
            })
            .optional()?;
        Ok(row)
    }
}

/// Generation identifiers are text in newer stores and integers in older ones.
fn generation_text(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<Option<String>> {
    use rusqlite::types::ValueRef;
    Ok(match row.get_ref(index)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}
