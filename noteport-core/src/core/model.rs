//! Records surfaced to the presentation layer.

use crate::core::error::BodyError;
use crate::core::note_body::NoteText;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the store's epoch.
pub const STORE_EPOCH_OFFSET: i64 = 978_307_200;

/// Converts a store timestamp (fractional seconds since 2001-01-01 UTC).
pub fn store_timestamp(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64 + STORE_EPOCH_OFFSET, nanos)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountKind {
    Local,
    Exchange,
    Imap,
    Cloud,
    Other,
}

impl AccountKind {
    /// Classifies an account from its identifier and stored type code.
    pub fn classify(identifier: &str, type_code: Option<i64>) -> Self {
        if identifier == "LocalAccount" {
            return Self::Local;
        }
        match type_code {
            Some(1) => Self::Cloud,
            Some(2) => Self::Exchange,
            Some(3) => Self::Imap,
            Some(0) => Self::Local,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub identifier: String,
    pub kind: AccountKind,
}

/// A folder row. Duplicates (same name and account) are kept as separate records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i64,
    pub name: String,
    /// `None` for a root folder of its account.
    pub parent_id: Option<i64>,
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub identifier: String,
    /// Hierarchical type tag, e.g. `public.jpeg`.
    pub type_uti: String,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: i64,
    pub title: String,
    /// Decoded plain text; empty when the body could not be decoded.
    pub text: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub folder_id: Option<i64>,
    pub account_id: Option<i64>,
    pub attachments: Vec<AttachmentRef>,
    /// Text plus style runs, the source of all rendering.
    #[serde(skip)]
    pub body: NoteText,
    /// Why the body is empty, when decoding failed.
    #[serde(skip)]
    pub body_error: Option<BodyError>,
}

impl Note {
    pub fn has_body(&self) -> bool {
        self.body_error.is_none()
    }
}
