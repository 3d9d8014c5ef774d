//! Line metrics and byte offset to line/character conversion.

use crate::diagnostic::{Position, Range};

/// One physical line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLineMetrics<'a> {
    /// Line content without its terminator.
    pub text: &'a str,
    /// Zero-based line index.
    pub index: usize,
    /// Byte offset of the first byte of the line in the whole document.
    pub byte_offset: usize,
    /// Length in bytes of `text`.
    pub byte_len: usize,
}

impl TextLineMetrics<'_> {
    /// Byte offset one past the last content byte of the line.
    pub fn end_offset(&self) -> usize {
        self.byte_offset + self.byte_len
    }
}

/// Unit in which LSP character offsets are counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionEncoding {
    Utf8,
    #[default]
    Utf16,
}

/// Split `text` into lines.
///
/// Lines end at `\n`; a `\r` directly before it is part of the terminator,
/// so CRLF and LF documents yield the same line contents. There is always at
/// least one line, and a trailing terminator opens an empty final line.
pub fn line_metrics(text: &str) -> Vec<TextLineMetrics<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (index, raw) in text.split('\n').enumerate() {
        let content = raw.strip_suffix('\r').unwrap_or(raw);
        lines.push(TextLineMetrics {
            text: content,
            index,
            byte_offset: start,
            byte_len: content.len(),
        });
        start += raw.len() + 1;
    }
    lines
}

/// The line containing `offset`.
///
/// A line owns every byte from its start up to the start of the next line,
/// terminator included, so the offset just past a line's content still maps
/// to that line. Offsets beyond the end of the text map to the last line.
pub fn line_at_byte_offset<'m, 'a>(
    metrics: &'m [TextLineMetrics<'a>],
    offset: usize,
) -> Option<&'m TextLineMetrics<'a>> {
    let idx = metrics.partition_point(|line| line.byte_offset <= offset);
    metrics.get(idx.checked_sub(1)?)
}

/// Zero-based UTF-16 character offset of `offset` within `line`.
pub fn char_offset(line: &TextLineMetrics<'_>, offset: usize) -> u32 {
    char_offset_in(line, offset, PositionEncoding::Utf16)
}

/// Character offset of `offset` within `line` in the given encoding.
///
/// The local offset is clamped to the line content and rounded down to a
/// char boundary.
pub fn char_offset_in(
    line: &TextLineMetrics<'_>,
    offset: usize,
    encoding: PositionEncoding,
) -> u32 {
    let mut local = offset.saturating_sub(line.byte_offset).min(line.byte_len);
    while !line.text.is_char_boundary(local) {
        local -= 1;
    }
    match encoding {
        PositionEncoding::Utf8 => local as u32,
        PositionEncoding::Utf16 => line.text[..local].encode_utf16().count() as u32,
    }
}

/// Convert a byte offset in the document to a line/character position.
pub fn position_at(
    metrics: &[TextLineMetrics<'_>],
    offset: usize,
    encoding: PositionEncoding,
) -> Position {
    match line_at_byte_offset(metrics, offset) {
        Some(line) => Position::new(line.index as u32, char_offset_in(line, offset, encoding)),
        None => Position::default(),
    }
}

/// Convert a byte range of the document to a line/character range.
pub fn byte_range_to_range(
    metrics: &[TextLineMetrics<'_>],
    start: usize,
    end: usize,
    encoding: PositionEncoding,
) -> Range {
    Range::new(
        position_at(metrics, start, encoding),
        position_at(metrics, end, encoding),
    )
}
