//! Export options recognised by the document renderers.
//!
//! The record is persisted as JSON by the host application. Loading never
//! fails: a missing or unreadable file yields the defaults.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Output format of a rendered note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportFormat {
    Html,
    PlainText,
    Markdown,
    Rtf,
    Latex,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        Self::Html,
        Self::PlainText,
        Self::Markdown,
        Self::Rtf,
        Self::Latex,
    ];

    /// File extension (without the dot) conventionally used for the format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::PlainText => "txt",
            Self::Markdown => "md",
            Self::Rtf => "rtf",
            Self::Latex => "tex",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FontFamily {
    #[default]
    System,
    Serif,
    SansSerif,
    Monospace,
}

impl FontFamily {
    /// CSS `font-family` stack.
    pub fn css_stack(self) -> &'static str {
        match self {
            Self::System => "-apple-system, BlinkMacSystemFont, \"Helvetica Neue\", sans-serif",
            Self::Serif => "Georgia, \"Times New Roman\", serif",
            Self::SansSerif => "\"Helvetica Neue\", Helvetica, Arial, sans-serif",
            Self::Monospace => "Menlo, Monaco, \"Courier New\", monospace",
        }
    }

    /// Concrete font name for formats that need a single face.
    pub fn face_name(self) -> &'static str {
        match self {
            Self::System | Self::SansSerif => "Helvetica",
            Self::Serif => "Times New Roman",
            Self::Monospace => "Courier New",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageSize {
    #[default]
    Letter,
    A4,
    A5,
    Legal,
    Tabloid,
}

impl PageSize {
    /// Width and height in points.
    pub fn dimensions_pt(self) -> (f64, f64) {
        match self {
            Self::Letter => (612.0, 792.0),
            Self::A4 => (595.28, 841.89),
            Self::A5 => (419.53, 595.28),
            Self::Legal => (612.0, 1008.0),
            Self::Tabloid => (792.0, 1224.0),
        }
    }

    pub fn css_name(self) -> &'static str {
        match self {
            Self::Letter => "letter",
            Self::A4 => "A4",
            Self::A5 => "A5",
            Self::Legal => "legal",
            Self::Tabloid => "11in 17in",
        }
    }

    /// Paper option understood by LaTeX's `geometry` package.
    pub fn latex_paper(self) -> &'static str {
        match self {
            Self::Letter => "letterpaper",
            Self::A4 => "a4paper",
            Self::A5 => "a5paper",
            Self::Legal => "legalpaper",
            Self::Tabloid => "paperwidth=11in,paperheight=17in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarginUnit {
    Px,
    #[default]
    Pt,
    Em,
    Rem,
    Percent,
}

/// A page margin with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageMargin {
    pub value: f64,
    pub unit: MarginUnit,
}

impl Default for PageMargin {
    fn default() -> Self {
        Self { value: 72.0, unit: MarginUnit::Pt }
    }
}

impl PageMargin {
    /// Margin converted to points.
    ///
    /// Relative units are resolved against `font_size` (em/rem) or the page
    /// width (percent).
    pub fn to_points(self, font_size: f64, page_width: f64) -> f64 {
        match self.unit {
            MarginUnit::Px => self.value * 0.75,
            MarginUnit::Pt => self.value,
            MarginUnit::Em | MarginUnit::Rem => self.value * font_size,
            MarginUnit::Percent => self.value / 100.0 * page_width,
        }
    }
}

impl fmt::Display for PageMargin {
    /// CSS length syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            MarginUnit::Px => "px",
            MarginUnit::Pt => "pt",
            MarginUnit::Em => "em",
            MarginUnit::Rem => "rem",
            MarginUnit::Percent => "%",
        };
        write!(f, "{}{unit}", self.value)
    }
}

/// Options applied when a note is rendered to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportConfig {
    pub font_family: FontFamily,
    /// Body font size in points.
    pub font_size: f64,
    pub page_margin: PageMargin,
    pub page_size: PageSize,
    /// Embed images in the document: `data:` URIs in HTML, picture groups
    /// for PNG and JPEG in RTF.
    pub embed_images_inline: bool,
    /// Link images by file name and return their bytes alongside the document.
    pub link_embedded_images: bool,
    /// LaTeX template; the bundled template is used when absent.
    pub latex_template: Option<String>,
    pub author: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            font_family: FontFamily::default(),
            font_size: 12.0,
            page_margin: PageMargin::default(),
            page_size: PageSize::default(),
            embed_images_inline: true,
            link_embedded_images: false,
            latex_template: None,
            author: None,
        }
    }
}

impl ExportConfig {
    /// Loads the record from `path`; returns defaults if the file is missing or corrupt.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable export config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Writes the record as pretty JSON, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Page margin in points for the configured page and font size.
    pub fn margin_points(&self) -> f64 {
        let (width, _) = self.page_size.dimensions_pt();
        self.page_margin.to_points(self.font_size, width)
    }
}
