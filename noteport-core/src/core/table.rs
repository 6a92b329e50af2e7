//! Reconstruction of embedded tables from a decoded object graph.
//!
//! A table is a custom map holding three references: an ordered set of row
//! ids, an ordered set of column ids, and a dictionary `column id → (row id →
//! cell note)`. Ids are small custom maps whose first value points into the
//! graph's uuid table. Rows and columns are resolved to sequence positions
//! through [`AxisIndex`]; cells whose ids do not resolve are skipped.

use crate::core::convert::html::escape_html;
use crate::core::error::{InflateError, TableError};
use crate::core::gzip;
use crate::core::mergeable::{
    decode_mergeable, CustomMap, Entry, ObjectGraph, ObjectIndex, ObjectRef, UuidIndex, WireIndex,
};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

/// Type tag of a table's root custom map.
pub const TABLE_TYPE: &str = "com.apple.notes.ICTable";

const KEY_ROWS: &str = "crRows";
const KEY_COLUMNS: &str = "crColumns";
const KEY_CELLS: &str = "cellColumns";
const KEY_DIRECTION: &str = "crTableColumnDirection";
const RIGHT_TO_LEFT: &str = "CRTableColumnDirectionRightToLeft";

/// A rectangular grid of cell text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTable {
    rows: Vec<Vec<String>>,
    column_count: usize,
}

impl ParsedTable {
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Renders the grid as a normalized-markup `<table>`.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<table>");
        for row in &self.rows {
            out.push_str("<tr>");
            for cell in row {
                out.push_str("<td>");
                out.push_str(&escape_html(cell.trim_end_matches('\n')).replace('\n', "<br>"));
                out.push_str("</td>");
            }
            out.push_str("</tr>");
        }
        out.push_str("</table>");
        out
    }
}

/// Maps uuid positions to sequence positions along one table axis.
#[derive(Debug, Default)]
struct AxisIndex {
    positions: HashMap<UuidIndex, usize>,
    len: usize,
}

impl AxisIndex {
    /// Builds the index from an ordered set: literal array first, then aliases.
    ///
    /// An alias only fills in an id that has no position yet; it never moves
    /// an id that the literal array already placed.
    fn build(graph: &ObjectGraph, set_ref: &ObjectRef) -> Option<Self> {
        let Some((_, Entry::OrderedSet(set))) = graph.resolve(set_ref) else {
            return None;
        };
        let mut index = AxisIndex { positions: HashMap::new(), len: set.array.len() };

        for (position, slot) in set.array.iter().enumerate() {
            match graph.uuid_position(&slot.uuid) {
                Some(uuid) => {
                    index.positions.entry(uuid).or_insert(position);
                }
                None => debug!("ordered slot {position} has a uuid missing from the side table"),
            }
        }

        for (key, alias) in &set.contents.elements {
            let Some(position) = target_uuid(graph, key).and_then(|u| index.positions.get(&u).copied())
            else {
                continue;
            };
            if let Some(alias_uuid) = target_uuid(graph, alias) {
                index.positions.entry(alias_uuid).or_insert(position);
            }
        }
        Some(index)
    }

    fn position(&self, graph: &ObjectGraph, id: &ObjectRef) -> Option<usize> {
        target_uuid(graph, id).and_then(|u| self.positions.get(&u).copied())
    }
}

/// Follows an id reference to the uuid it names.
fn target_uuid(graph: &ObjectGraph, id: &ObjectRef) -> Option<UuidIndex> {
    match graph.resolve(id)? {
        (_, Entry::CustomMap(map)) => {
            let wire = map.entries.first()?.value.unsigned?;
            graph.uuid_index(WireIndex::new(wire))
        }
        _ => None,
    }
}

/// Finds the table's root custom map.
pub fn find_table_root(graph: &ObjectGraph) -> Option<ObjectIndex> {
    graph.find_custom_map(TABLE_TYPE).map(|(index, _)| index)
}

/// Decodes the table rooted at `root`.
///
/// # Errors
///
/// Returns [`TableError::NotATable`] if `root` is not a table map, if its row
/// or column set is missing, or if either axis is empty.
pub fn reconstruct_table(graph: &ObjectGraph, root: ObjectIndex) -> Result<ParsedTable, TableError> {
    let Some(Entry::CustomMap(table)) = graph.entry(root) else {
        return Err(TableError::NotATable);
    };
    if graph.type_name(table.type_index) != Some(TABLE_TYPE) {
        return Err(TableError::NotATable);
    }

    let axis = |key: &str| {
        graph
            .map_value(table, key)
            .and_then(|set_ref| AxisIndex::build(graph, set_ref))
    };
    let rows = axis(KEY_ROWS).ok_or(TableError::NotATable)?;
    let columns = axis(KEY_COLUMNS).ok_or(TableError::NotATable)?;
    if rows.len == 0 || columns.len == 0 {
        return Err(TableError::NotATable);
    }

    let mut grid = vec![vec![String::new(); columns.len]; rows.len];
    let mut skipped = 0usize;

    let cell_columns = graph.map_value(table, KEY_CELLS).and_then(|r| graph.resolve(r));
    if let Some((_, Entry::Dictionary(by_column))) = cell_columns {
        for (column_id, column_ref) in &by_column.elements {
            let column = columns.position(graph, column_id);
            let Some((_, Entry::Dictionary(by_row))) = graph.resolve(column_ref) else {
                skipped += 1;
                continue;
            };
            for (row_id, cell_ref) in &by_row.elements {
                let (Some(column), Some(row)) = (column, rows.position(graph, row_id)) else {
                    skipped += 1;
                    continue;
                };
                match cell_text(graph, cell_ref) {
                    Some(text) => grid[row][column] = text,
                    None => skipped += 1,
                }
            }
        }
    }
    if skipped > 0 {
        warn!("table: {skipped} cell(s) could not be placed");
    }

    if is_right_to_left(graph, table) {
        for row in &mut grid {
            row.reverse();
        }
    }

    Ok(ParsedTable { rows: grid, column_count: columns.len })
}

/// Finds and reconstructs the table in `graph`.
pub fn parse_table(graph: &ObjectGraph) -> Result<ParsedTable, TableError> {
    let root = find_table_root(graph).ok_or(TableError::NotATable)?;
    reconstruct_table(graph, root)
}

/// Unwraps, decodes and reconstructs a table from its stored mergeable data.
pub fn table_from_blob(blob: &[u8]) -> Result<ParsedTable, TableError> {
    let raw = match gzip::inflate(blob) {
        Ok(raw) => raw,
        Err(InflateError::NotCompressed) => blob.to_vec(),
        Err(e) => return Err(e.into()),
    };
    let graph = decode_mergeable(&raw)?;
    parse_table(&graph)
}

fn cell_text(graph: &ObjectGraph, cell: &ObjectRef) -> Option<String> {
    match graph.resolve(cell)? {
        (_, Entry::Note(note)) => Some(note.text.replace('\u{fffc}', "")),
        (_, Entry::AttachmentInfo(info)) => Some(format!("[Attachment: {}]", info.type_uti)),
        _ => None,
    }
}

fn is_right_to_left(graph: &ObjectGraph, table: &CustomMap) -> bool {
    let Some(direction) = graph.map_value(table, KEY_DIRECTION) else {
        return false;
    };
    let value = match (&direction.string, graph.resolve(direction)) {
        (Some(s), _) => Some(s.as_str()),
        (None, Some((_, Entry::Register(r)))) => r.string.as_deref(),
        _ => None,
    };
    value == Some(RIGHT_TO_LEFT)
}
