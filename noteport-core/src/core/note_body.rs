//! Decoding of note bodies: plain text plus a run-length list of style spans.
//!
//! Wire layout (field numbers):
//!
//! ```text
//! NoteStore      { 2: Document }
//! Document       { 2: version, 3: Note }
//! Note           { 2: text, 5: AttributeRun* }
//! AttributeRun   { 1: length, 2: ParagraphStyle, 3: Font, 5: font weight,
//!                  6: underlined, 7: strikethrough, 8: superscript, 9: link,
//!                  12: AttachmentInfo }
//! ParagraphStyle { 1: style type, 2: alignment, 4: indent, 5: Checklist }
//! Checklist      { 1: uuid, 2: done }
//! Font           { 1: name, 2: point size }
//! AttachmentInfo { 1: identifier, 2: type tag }
//! ```

use crate::core::error::DecodeError;
use crate::core::proto::{fields, Field};

/// Paragraph-level classification carried by a run's style type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParagraphKind {
    #[default]
    Body,
    Title,
    Heading,
    Subheading,
    Monospaced,
    DottedList,
    DashedList,
    NumberedList,
    Checklist,
}

impl ParagraphKind {
    /// Maps a wire style code; unknown codes are plain body text.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Title,
            1 => Self::Heading,
            2 => Self::Subheading,
            4 => Self::Monospaced,
            100 => Self::DottedList,
            101 => Self::DashedList,
            102 => Self::NumberedList,
            103 => Self::Checklist,
            _ => Self::Body,
        }
    }

    pub fn is_list(self) -> bool {
        matches!(
            self,
            Self::DottedList | Self::DashedList | Self::NumberedList | Self::Checklist
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChecklistState {
    pub uuid: Vec<u8>,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParagraphStyle {
    pub kind: ParagraphKind,
    pub alignment: i64,
    pub indent: u32,
    pub checklist: Option<ChecklistState>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Font {
    pub name: Option<String>,
    pub point_size: Option<f32>,
}

/// Reference from a run to an embedded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentInfo {
    pub identifier: String,
    pub type_uti: String,
}

/// A contiguous span of note text sharing one annotation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeRun {
    /// Span length in UTF-16 code units.
    pub length: usize,
    pub paragraph: Option<ParagraphStyle>,
    pub font: Option<Font>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strikethrough: bool,
    /// Positive for superscript, negative for subscript.
    pub superscript: i64,
    pub link: Option<String>,
    pub attachment: Option<AttachmentInfo>,
}

impl AttributeRun {
    pub fn paragraph_kind(&self) -> ParagraphKind {
        self.paragraph.as_ref().map(|p| p.kind).unwrap_or_default()
    }
}

/// Decoded text of a note (or of a table cell).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoteText {
    pub text: String,
    pub runs: Vec<AttributeRun>,
}

impl NoteText {
    /// Attachment references in document order.
    pub fn attachments(&self) -> impl Iterator<Item = &AttachmentInfo> {
        self.runs.iter().filter_map(|r| r.attachment.as_ref())
    }
}

/// Decodes a full note-body envelope.
///
/// A document without a note yields empty text; a missing document is malformed.
pub fn decode_note_store(bytes: &[u8]) -> Result<NoteText, DecodeError> {
    let document = first_message(bytes, 2)?
        .ok_or_else(|| DecodeError::Malformed("note store has no document".to_string()))?;
    match first_message(document, 3)? {
        Some(note) => decode_note(note),
        None => Ok(NoteText::default()),
    }
}

/// Decodes a bare `Note` message (also used for table cells).
pub fn decode_note(bytes: &[u8]) -> Result<NoteText, DecodeError> {
    let mut note = NoteText::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            2 => note.text = field.string()?,
            5 => note.runs.push(decode_run(field.bytes()?)?),
            _ => {}
        }
    }
    Ok(note)
}

fn decode_run(bytes: &[u8]) -> Result<AttributeRun, DecodeError> {
    let mut run = AttributeRun::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => run.length = usize::try_from(field.uint()?).unwrap_or(usize::MAX),
            2 => run.paragraph = Some(decode_paragraph(field.bytes()?)?),
            3 => run.font = Some(decode_font(field.bytes()?)?),
            5 => {
                let weight = field.int()?;
                run.bold = weight == 1 || weight == 3;
                run.italic = weight == 2 || weight == 3;
            }
            6 => run.underline = field.int()? != 0,
            7 => run.strikethrough = field.int()? != 0,
            8 => run.superscript = field.int()?,
            9 => run.link = Some(field.string()?),
            12 => run.attachment = Some(decode_attachment_info(field.bytes()?)?),
            _ => {}
        }
    }
    Ok(run)
}

fn decode_paragraph(bytes: &[u8]) -> Result<ParagraphStyle, DecodeError> {
    let mut style = ParagraphStyle::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => style.kind = ParagraphKind::from_code(field.int()?),
            2 => style.alignment = field.int()?,
            4 => style.indent = u32::try_from(field.int()?).unwrap_or(0),
            5 => style.checklist = Some(decode_checklist(field.bytes()?)?),
            _ => {}
        }
    }
    Ok(style)
}

fn decode_checklist(bytes: &[u8]) -> Result<ChecklistState, DecodeError> {
    let mut state = ChecklistState::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => state.uuid = field.bytes()?.to_vec(),
            2 => state.done = field.int()? != 0,
            _ => {}
        }
    }
    Ok(state)
}

fn decode_font(bytes: &[u8]) -> Result<Font, DecodeError> {
    let mut font = Font::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => font.name = Some(field.string()?),
            2 => font.point_size = Some(field.float()?),
            _ => {}
        }
    }
    Ok(font)
}

pub(crate) fn decode_attachment_info(bytes: &[u8]) -> Result<AttachmentInfo, DecodeError> {
    let mut info = AttachmentInfo::default();
    for field in fields(bytes) {
        let field = field?;
        match field.number {
            1 => info.identifier = field.string()?,
            2 => info.type_uti = field.string()?,
            _ => {}
        }
    }
    Ok(info)
}

/// Returns the payload of the first sub-message with field number `number`.
pub(crate) fn first_message(bytes: &[u8], number: u32) -> Result<Option<&[u8]>, DecodeError> {
    for field in fields(bytes) {
        let field: Field = field?;
        if field.number == number {
            return field.bytes().map(Some);
        }
    }
    Ok(None)
}

/// Fixture builders shared by the decoder, renderer and library tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::core::proto::encode::Message;

    pub fn run(length: u64) -> Message {
        Message::new().varint(1, length)
    }

    pub fn with_style(run: Message, code: i64) -> Message {
        run.message(2, Message::new().int(1, code))
    }

    pub fn with_checkbox(run: Message, done: bool) -> Message {
        run.message(
            2,
            Message::new()
                .int(1, 103)
                .message(5, Message::new().bytes(1, &[7; 16]).varint(2, u64::from(done))),
        )
    }

    pub fn with_attachment(run: Message, id: &str, uti: &str) -> Message {
        run.message(12, Message::new().string(1, id).string(2, uti))
    }

    pub fn note(text: &str, runs: Vec<Message>) -> Message {
        runs.into_iter()
            .fold(Message::new().string(2, text), |m, r| m.message(5, r))
    }

    /// Wraps a note in the document envelope.
    pub fn note_store(note: Message) -> Vec<u8> {
        Message::new()
            .message(2, Message::new().varint(2, 0).message(3, note))
            .finish()
    }
}
