//! Locating attachment bytes.
//!
//! Lookup is two-tier. An inline payload stored with the attachment row wins
//! when it is large enough to be real content; otherwise a fixed list of
//! candidate paths under the store's container directory is tried in order:
//!
//! ```text
//! Accounts/<account>/Media/<media id>/<generation>/<file name>
//! Accounts/<account>/Media/<media id>/<file name>
//! Media/<media id>/<generation>/<file name>
//! Media/<media id>/<file name>
//! Accounts/<account>/FallbackImages/<attachment id>/<generation>/FallbackImage.{png,jpg,jpeg}
//! Accounts/<account>/FallbackImages/<attachment id>.{png,jpg,jpeg}
//! FallbackImages/<attachment id>.{png,jpg,jpeg}
//! Accounts/<account>/FallbackPDFs/<attachment id>/<generation>/FallbackPDF.pdf
//! Accounts/<account>/FallbackPDFs/<attachment id>.pdf
//! FallbackPDFs/<attachment id>.pdf
//! ```
//!
//! When the owning account is unknown every directory under `Accounts/` is
//! tried. The first existing file wins.

use crate::core::error::ResolveError;
use crate::core::gzip;
use crate::core::store::{AttachmentRow, Store};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Inline payloads smaller than this are reference markers, not content.
pub const MIN_INLINE_PAYLOAD: usize = 64;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Where resolved bytes came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    Inline,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttachment {
    pub identifier: String,
    pub type_uti: String,
    /// Suggested file name for the exported copy.
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub source: AttachmentSource,
}

impl ResolvedAttachment {
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Best-guess MIME type from the type tag, then the file name.
pub fn guess_mime(type_uti: &str, filename: Option<&str>) -> String {
    let known = match type_uti {
        "public.jpeg" => Some("image/jpeg"),
        "public.png" => Some("image/png"),
        "public.heic" => Some("image/heic"),
        "public.tiff" => Some("image/tiff"),
        "com.compuserve.gif" => Some("image/gif"),
        "com.adobe.pdf" => Some("application/pdf"),
        "public.mpeg-4" => Some("video/mp4"),
        "com.apple.quicktime-movie" => Some("video/quicktime"),
        "public.mp3" => Some("audio/mpeg"),
        "com.apple.m4a-audio" => Some("audio/mp4"),
        "public.vcard" => Some("text/vcard"),
        "public.plain-text" => Some("text/plain"),
        _ => None,
    };
    if let Some(mime) = known {
        return mime.to_string();
    }
    filename
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// A candidate file and the name its exported copy should carry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    path: PathBuf,
    filename: String,
}

/// Account directories to search: the owner's, or every one present.
fn account_dirs(root: &Path, row: &AttachmentRow) -> Vec<String> {
    if let Some(account) = row.account_identifier.as_deref().filter(|a| !a.is_empty()) {
        return vec![account.to_string()];
    }
    let mut found: Vec<String> = fs::read_dir(root.join("Accounts"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    found.sort();
    found
}

/// Every path worth checking for `row`, in priority order.
fn candidates(root: &Path, row: &AttachmentRow, accounts: &[String]) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut push = |path: PathBuf, filename: &str| {
        out.push(Candidate { path, filename: filename.to_string() });
    };

    if let Some(media) = row.media.as_ref() {
        if let Some(filename) = media.filename.as_deref().filter(|f| !f.is_empty()) {
            let mut media_dirs: Vec<PathBuf> = accounts
                .iter()
                .map(|a| root.join("Accounts").join(a).join("Media").join(&media.identifier))
                .collect();
            media_dirs.push(root.join("Media").join(&media.identifier));
            for dir in media_dirs {
                if let Some(generation) = media.generation.as_deref() {
                    push(dir.join(generation).join(filename), filename);
                }
                push(dir.join(filename), filename);
            }
        }
    }

    let id = &row.identifier;
    for ext in IMAGE_EXTENSIONS {
        let filename = format!("{id}.{ext}");
        for account in accounts {
            let base = root.join("Accounts").join(account).join("FallbackImages");
            if let Some(generation) = row.fallback_image_generation.as_deref() {
                push(base.join(id).join(generation).join(format!("FallbackImage.{ext}")), &filename);
            }
            push(base.join(&filename), &filename);
        }
        push(root.join("FallbackImages").join(&filename), &filename);
    }

    let filename = format!("{id}.pdf");
    for account in accounts {
        let base = root.join("Accounts").join(account).join("FallbackPDFs");
        if let Some(generation) = row.fallback_pdf_generation.as_deref() {
            push(base.join(id).join(generation).join("FallbackPDF.pdf"), &filename);
        }
        push(base.join(&filename), &filename);
    }
    push(root.join("FallbackPDFs").join(&filename), &filename);

    out
}

fn inline_payload(row: &AttachmentRow) -> Option<&[u8]> {
    row.mergeable_data
        .as_deref()
        // Compressed mergeable data is structure, not a file.
        .filter(|data| data.len() >= MIN_INLINE_PAYLOAD && !gzip::is_compressed(data))
}

/// Resolves the bytes of an attachment row whose files live under `root`.
pub fn resolve_row(root: &Path, row: &AttachmentRow) -> Result<ResolvedAttachment, ResolveError> {
    let media_name = row.media.as_ref().and_then(|m| m.filename.clone());

    if let Some(bytes) = inline_payload(row) {
        let filename = media_name.unwrap_or_else(|| row.identifier.clone());
        return Ok(ResolvedAttachment {
            identifier: row.identifier.clone(),
            type_uti: row.type_uti.clone(),
            mime: guess_mime(&row.type_uti, Some(&filename)),
            filename,
            bytes: bytes.to_vec(),
            source: AttachmentSource::Inline,
        });
    }

    let accounts = account_dirs(root, row);
    for candidate in candidates(root, row, &accounts) {
        if !candidate.path.is_file() {
            continue;
        }
        match fs::read(&candidate.path) {
            Ok(bytes) => {
                debug!("Attachment {} found at {}", row.identifier, candidate.path.display());
                return Ok(ResolvedAttachment {
                    identifier: row.identifier.clone(),
                    type_uti: row.type_uti.clone(),
                    mime: guess_mime(&row.type_uti, Some(&candidate.filename)),
                    filename: candidate.filename,
                    bytes,
                    source: AttachmentSource::File(candidate.path),
                });
            }
            Err(e) => warn!("Cannot read {}: {e}", candidate.path.display()),
        }
    }

    warn!("Attachment {} ({}) not found", row.identifier, row.type_uti);
    Err(ResolveError::NotFound(row.identifier.clone()))
}

/// Resolves an attachment of `store` by identifier.
pub fn resolve(store: &Store, identifier: &str) -> Result<ResolvedAttachment, ResolveError> {
    match store.attachment_row(identifier) {
        Ok(Some(row)) => resolve_row(store.container_dir(), &row),
        Ok(None) => Err(ResolveError::UnknownAttachment(identifier.to_string())),
        Err(e) => {
            warn!("Attachment lookup for {identifier} failed: {e}");
            Err(ResolveError::NotFound(identifier.to_string()))
        }
    }
}
