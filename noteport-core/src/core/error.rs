//! Error types for the Noteport core library.
//!
//! [`NoteportError`] is reserved for failures that stop an operation outright
//! (the store cannot be opened, a query fails). Everything that happens while
//! decoding a single note is scoped to that note and reported through the
//! narrower enums below, which callers can collect into a report.

use thiserror::Error;

/// All errors that can stop a library-level operation.
#[derive(Debug, Error)]
pub enum NoteportError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The opened file is not a note store this library understands.
    #[error("Invalid note store: {0}")]
    InvalidStore(String),

    /// A note ID was requested that does not exist (or is excluded) in the store.
    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration record could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`NoteportError`].
pub type Result<T> = std::result::Result<T, NoteportError>;

impl NoteportError {
    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Failed to read the note store: {e}"),
            Self::InvalidStore(_) => "Could not open the note store".to_string(),
            Self::NoteNotFound(_) => "Note no longer exists".to_string(),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Settings format error: {e}"),
        }
    }
}

/// Failure to unwrap a compressed blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InflateError {
    /// The input does not start with the compressed-container signature.
    #[error("data is not a compressed stream")]
    NotCompressed,

    /// The container was recognised but its header or payload is damaged.
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),
}

/// Structural failure while walking a length-prefixed message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ended in the middle of a field.
    #[error("message truncated at byte {0}")]
    Truncated(usize),

    /// A varint ran past ten bytes.
    #[error("varint overflow at byte {0}")]
    VarintOverflow(usize),

    /// A field used a wire type this reader cannot skip.
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType { field: u32, wire_type: u8 },

    /// A field had the wrong wire type or the message lacked a required part.
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Why a note's body could not be decoded. The note's metadata is still returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BodyError {
    /// The store has no body blob for this note.
    #[error("note has no body data")]
    Missing,

    /// The blob could not be decompressed.
    #[error(transparent)]
    Inflate(#[from] InflateError),

    /// The decompressed bytes are not a valid note message.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Why an object graph did not yield a table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// No entry carries the table type tag, or the table has no rows or no columns.
    #[error("object graph does not contain a table")]
    NotATable,

    /// The table's mergeable data could not be unwrapped.
    #[error(transparent)]
    Inflate(#[from] InflateError),

    /// The table's mergeable data could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Why attachment bytes could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The attachment identifier is unknown to the store.
    #[error("attachment not in store: {0}")]
    UnknownAttachment(String),

    /// Neither an inline payload nor any external file was found.
    #[error("attachment bytes not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_error_wraps_inflate_category() {
        let e: BodyError = InflateError::NotCompressed.into();
        assert_eq!(e, BodyError::Inflate(InflateError::NotCompressed));
        assert!(e.to_string().contains("not a compressed stream"));
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let e = NoteportError::InvalidStore("missing ZICNOTEDATA".to_string());
        assert_eq!(e.user_message(), "Could not open the note store");
    }
}
