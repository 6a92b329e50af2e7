//! Text-level converters from normalized markup to the export formats.
//!
//! Each converter is a pure function of its input; they share only the
//! tokenizer.

pub mod html;
pub mod latex;
pub mod markdown;
pub mod plain;
pub mod rtf;
pub mod tokens;

use crate::core::config::{ExportConfig, ExportFormat};
use chrono::{DateTime, Utc};

/// Document-level metadata some formats embed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: String,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

/// Converts body markup into a complete document of the requested format.
pub fn convert(markup: &str, format: ExportFormat, info: &DocumentInfo, config: &ExportConfig) -> String {
    match format {
        ExportFormat::Html => html::to_document(&info.title, markup, config),
        ExportFormat::PlainText => plain::to_plain_text(markup),
        ExportFormat::Markdown => markdown::to_markdown(markup),
        ExportFormat::Rtf => rtf::to_rtf(markup, config),
        ExportFormat::Latex => latex::to_latex_document(markup, info, config),
    }
}
