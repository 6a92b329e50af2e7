//! Runtime probing of the store's column layout.
//!
//! The producing application renames semantically identical columns between
//! releases (`ZACCOUNT2` → `ZACCOUNT3` → …). Every logical column used by the
//! queries in [`crate::core::store`] is described once here as an ordered
//! candidate list, newest first, each tagged with the schema generation that
//! introduced it, plus a SQL fallback expression. A [`ColumnMap`] resolves
//! the whole table against the live column set when a store is opened.

use crate::Result;
use log::debug;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

/// Shared table holding accounts, folders, notes, attachments and media.
pub const OBJECT_TABLE: &str = "ZICCLOUDSYNCINGOBJECT";
/// Table holding the compressed note bodies.
pub const NOTE_DATA_TABLE: &str = "ZICNOTEDATA";

/// Returns the live column names of `table`; empty when the table is absent.
pub fn detect_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(columns)
}

/// One release family of the store layout, ordered oldest to newest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaGeneration {
    /// Only unsuffixed columns.
    Classic,
    /// Introduces `ZTITLE1`/`ZTITLE2` and `ZACCOUNT2`.
    Account2,
    Account3,
    Account4,
    /// Introduces `ZACCOUNT7` and `ZCREATIONDATE3`.
    Account7,
}

impl SchemaGeneration {
    /// Picks the newest generation whose marker column is present.
    pub fn detect(columns: &HashSet<String>) -> Self {
        const MARKERS: [(&str, SchemaGeneration); 5] = [
            ("ZACCOUNT7", SchemaGeneration::Account7),
            ("ZCREATIONDATE3", SchemaGeneration::Account7),
            ("ZACCOUNT4", SchemaGeneration::Account4),
            ("ZACCOUNT3", SchemaGeneration::Account3),
            ("ZACCOUNT2", SchemaGeneration::Account2),
        ];
        MARKERS
            .iter()
            .find(|(column, _)| columns.contains(*column))
            .map(|(_, generation)| *generation)
            .unwrap_or(Self::Classic)
    }
}

/// A field the queries need, independent of its physical column name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalColumn {
    AccountName,
    AccountIdentifier,
    AccountType,
    FolderTitle,
    FolderParent,
    FolderAccount,
    NoteTitle,
    NoteFolder,
    NoteAccount,
    NoteCreated,
    NoteModified,
    NotePasswordProtected,
    MarkedForDeletion,
    AttachmentIdentifier,
    AttachmentType,
    AttachmentNote,
    AttachmentMedia,
    AttachmentMergeableData,
    AttachmentUrl,
    AttachmentAltText,
    FallbackImageGeneration,
    FallbackPdfGeneration,
    MediaFilename,
    MediaGeneration,
}

type Candidates = &'static [(&'static str, SchemaGeneration)];

impl LogicalColumn {
    pub const ALL: [LogicalColumn; 24] = [
        Self::AccountName,
        Self::AccountIdentifier,
        Self::AccountType,
        Self::FolderTitle,
        Self::FolderParent,
        Self::FolderAccount,
        Self::NoteTitle,
        Self::NoteFolder,
        Self::NoteAccount,
        Self::NoteCreated,
        Self::NoteModified,
        Self::NotePasswordProtected,
        Self::MarkedForDeletion,
        Self::AttachmentIdentifier,
        Self::AttachmentType,
        Self::AttachmentNote,
        Self::AttachmentMedia,
        Self::AttachmentMergeableData,
        Self::AttachmentUrl,
        Self::AttachmentAltText,
        Self::FallbackImageGeneration,
        Self::FallbackPdfGeneration,
        Self::MediaFilename,
        Self::MediaGeneration,
    ];

    /// Physical candidates, newest first, with the generation that introduced each.
    fn candidates(self) -> Candidates {
        use SchemaGeneration::*;
        match self {
            Self::AccountName => &[("ZNAME", Classic)],
            Self::AccountIdentifier | Self::AttachmentIdentifier => &[("ZIDENTIFIER", Classic)],
            Self::AccountType => &[("ZACCOUNTTYPE", Classic)],
            Self::FolderTitle => &[("ZTITLE2", Account2), ("ZTITLE", Classic)],
            Self::FolderParent => &[("ZPARENT", Classic)],
            Self::FolderAccount => &[("ZOWNER", Account2), ("ZACCOUNT", Classic)],
            Self::NoteTitle => &[("ZTITLE1", Account2), ("ZTITLE", Classic)],
            Self::NoteFolder => &[("ZFOLDER", Classic)],
            Self::NoteAccount => &[
                ("ZACCOUNT7", Account7),
                ("ZACCOUNT4", Account4),
                ("ZACCOUNT3", Account3),
                ("ZACCOUNT2", Account2),
            ],
            Self::NoteCreated => &[
                ("ZCREATIONDATE3", Account7),
                ("ZCREATIONDATE1", Account2),
                ("ZCREATIONDATE", Classic),
            ],
            Self::NoteModified => &[("ZMODIFICATIONDATE1", Account2), ("ZMODIFICATIONDATE", Classic)],
            Self::NotePasswordProtected => &[("ZISPASSWORDPROTECTED", Classic)],
            Self::MarkedForDeletion => &[("ZMARKEDFORDELETION", Classic)],
            Self::AttachmentType => &[("ZTYPEUTI", Classic)],
            Self::AttachmentNote => &[("ZNOTE", Classic)],
            Self::AttachmentMedia => &[("ZMEDIA", Classic)],
            Self::AttachmentMergeableData => &[("ZMERGEABLEDATA1", Account2), ("ZMERGEABLEDATA", Classic)],
            Self::AttachmentUrl => &[("ZURLSTRING", Classic)],
            Self::AttachmentAltText => &[("ZALTTEXT", Classic)],
            Self::FallbackImageGeneration => &[("ZFALLBACKIMAGEGENERATION", Classic)],
            Self::FallbackPdfGeneration => &[("ZFALLBACKPDFGENERATION", Classic)],
            Self::MediaFilename => &[("ZFILENAME", Classic)],
            Self::MediaGeneration => &[("ZGENERATION1", Account4), ("ZGENERATION", Classic)],
        }
    }

    /// Expression used when no candidate is present. Never fails to evaluate.
    fn fallback(self) -> &'static str {
        match self {
            Self::AccountName => "'Account ' || Z_PK",
            Self::AccountIdentifier => "CAST(Z_PK AS TEXT)",
            Self::FolderTitle => "'Folder ' || Z_PK",
            Self::NoteTitle => "'Note ' || Z_PK",
            Self::AttachmentIdentifier => "CAST(Z_PK AS TEXT)",
            Self::AttachmentType => "''",
            Self::NotePasswordProtected | Self::MarkedForDeletion => "0",
            _ => "NULL",
        }
    }
}

/// Logical columns resolved against one store's object table.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    generation: SchemaGeneration,
    resolved: HashMap<LogicalColumn, Option<&'static str>>,
}

impl ColumnMap {
    /// Resolves every logical column against `columns`.
    pub fn resolve(columns: &HashSet<String>) -> Self {
        let generation = SchemaGeneration::detect(columns);
        let resolved = LogicalColumn::ALL
            .iter()
            .map(|&logical| {
                let pick = logical
                    .candidates()
                    .iter()
                    .find(|(name, introduced)| *introduced <= generation && columns.contains(*name))
                    .map(|(name, _)| *name);
                if pick.is_none() {
                    debug!("No column for {logical:?}; using fallback expression");
                }
                (logical, pick)
            })
            .collect();
        debug!("Detected schema generation {generation:?}");
        Self { generation, resolved }
    }

    /// Probes the live object table of `conn`.
    pub fn probe(conn: &Connection) -> Result<Self> {
        Ok(Self::resolve(&detect_columns(conn, OBJECT_TABLE)?))
    }

    pub fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    /// Physical column chosen for `logical`, if any.
    pub fn column(&self, logical: LogicalColumn) -> Option<&'static str> {
        self.resolved.get(&logical).copied().flatten()
    }

    /// SQL expression for `logical` qualified by table alias `alias`.
    pub fn expr(&self, alias: &str, logical: LogicalColumn) -> String {
        match self.column(logical) {
            Some(column) => format!("{alias}.{column}"),
            None => logical.fallback().replace("Z_PK", &format!("{alias}.Z_PK")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_columns_reads_live_schema() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE ZICCLOUDSYNCINGOBJECT (Z_PK INTEGER PRIMARY KEY, ZTITLE1 TEXT)")
            .unwrap();
        let found = detect_columns(&conn, OBJECT_TABLE).unwrap();
        assert_eq!(found, columns(&["Z_PK", "ZTITLE1"]));
        assert!(detect_columns(&conn, "MISSING").unwrap().is_empty());
    }

    #[test]
    fn test_generation_detection() {
        assert_eq!(SchemaGeneration::detect(&columns(&["ZTITLE"])), SchemaGeneration::Classic);
        assert_eq!(
            SchemaGeneration::detect(&columns(&["ZACCOUNT2", "ZACCOUNT3"])),
            SchemaGeneration::Account3
        );
        assert_eq!(
            SchemaGeneration::detect(&columns(&["ZACCOUNT4", "ZCREATIONDATE3"])),
            SchemaGeneration::Account7
        );
    }

    #[test]
    fn test_newest_candidate_wins() {
        let map = ColumnMap::resolve(&columns(&["ZACCOUNT2", "ZACCOUNT3", "ZACCOUNT4", "ZTITLE", "ZTITLE1"]));
        assert_eq!(map.generation(), SchemaGeneration::Account4);
        assert_eq!(map.column(LogicalColumn::NoteAccount), Some("ZACCOUNT4"));
        assert_eq!(map.column(LogicalColumn::NoteTitle), Some("ZTITLE1"));
    }

    #[test]
    fn test_candidate_newer_than_generation_is_skipped() {
        // A stray ZGENERATION1 in a classic layout is not trusted.
        let map = ColumnMap::resolve(&columns(&["ZGENERATION", "ZGENERATION1"]));
        assert_eq!(map.column(LogicalColumn::MediaGeneration), Some("ZGENERATION"));
    }

    #[test]
    fn test_missing_columns_use_fallbacks() {
        let map = ColumnMap::resolve(&columns(&["Z_PK"]));
        assert_eq!(map.column(LogicalColumn::NoteTitle), None);
        assert_eq!(map.expr("n", LogicalColumn::NoteTitle), "'Note ' || n.Z_PK");
        assert_eq!(map.expr("n", LogicalColumn::NoteAccount), "NULL");
        assert_eq!(map.expr("n", LogicalColumn::NotePasswordProtected), "0");
    }

    #[test]
    fn test_expr_is_alias_qualified() {
        let map = ColumnMap::resolve(&columns(&["ZFOLDER"]));
        assert_eq!(map.expr("n", LogicalColumn::NoteFolder), "n.ZFOLDER");
    }
}
