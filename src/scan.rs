//! Forward-only JSONC token reader.
//!
//! Produces tokens with exact byte offsets into the source text without
//! building a tree. Commas, colons and whitespace are consumed silently;
//! comments are reported as [`TokenKind::Comment`] so callers decide whether
//! to skip them.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    PropertyName,
    String,
    Number,
    True,
    False,
    Null,
    Comment,
}

impl TokenKind {
    pub fn is_container_start(self) -> bool {
        matches!(self, Self::StartObject | Self::StartArray)
    }

    pub fn is_container_end(self) -> bool {
        matches!(self, Self::EndObject | Self::EndArray)
    }
}

/// A token and its byte span `[start, end)` in the source.
///
/// String and property name spans include the surrounding quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("unexpected character '{ch}' at byte {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated string starting at byte {offset}")]
    UnterminatedString { offset: usize },
    #[error("unterminated comment starting at byte {offset}")]
    UnterminatedComment { offset: usize },
    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },
    #[error("mismatched closing bracket at byte {offset}")]
    MismatchedClose { offset: usize },
    #[error("unexpected end of input")]
    UnexpectedEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

pub struct JsonReader<'a> {
    text: &'a str,
    pos: usize,
    stack: Vec<Container>,
    /// Inside an object, the next string is a property name.
    expect_name: bool,
}

impl<'a> JsonReader<'a> {
    pub fn new(text: &'a str) -> Self {
        let pos = if text.starts_with('\u{FEFF}') { 3 } else { 0 };
        Self {
            text,
            pos,
            stack: Vec::new(),
            expect_name: false,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Current container nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// Read the next token, or `None` at the end of input.
    pub fn read(&mut self) -> Result<Option<Token>, ScanError> {
        let bytes = self.text.as_bytes();
        while let Some(&b) = bytes.get(self.pos) {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' | b':' => self.pos += 1,
                b',' => {
                    self.pos += 1;
                    self.expect_name = self.stack.last() == Some(&Container::Object);
                }
                _ => break,
            }
        }

        let start = self.pos;
        let Some(&b) = bytes.get(start) else {
            if self.stack.is_empty() {
                return Ok(None);
            }
            return Err(ScanError::UnexpectedEnd);
        };

        let kind = match b {
            b'{' => {
                self.pos += 1;
                self.stack.push(Container::Object);
                self.expect_name = true;
                TokenKind::StartObject
            }
            b'[' => {
                self.pos += 1;
                self.stack.push(Container::Array);
                self.expect_name = false;
                TokenKind::StartArray
            }
            b'}' => {
                self.close(Container::Object)?;
                TokenKind::EndObject
            }
            b']' => {
                self.close(Container::Array)?;
                TokenKind::EndArray
            }
            b'"' => {
                self.scan_string()?;
                if self.expect_name && self.stack.last() == Some(&Container::Object) {
                    self.expect_name = false;
                    TokenKind::PropertyName
                } else {
                    self.after_value();
                    TokenKind::String
                }
            }
            b'/' => {
                self.scan_comment()?;
                TokenKind::Comment
            }
            b'-' | b'0'..=b'9' => {
                self.pos += 1;
                while let Some(&c) = bytes.get(self.pos) {
                    if c.is_ascii_digit() || matches!(c, b'.' | b'e' | b'E' | b'+' | b'-') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.after_value();
                TokenKind::Number
            }
            b't' => self.scan_literal("true", TokenKind::True)?,
            b'f' => self.scan_literal("false", TokenKind::False)?,
            b'n' => self.scan_literal("null", TokenKind::Null)?,
            _ => return Err(self.unexpected(start)),
        };

        Ok(Some(Token {
            kind,
            start,
            end: self.pos,
        }))
    }

    /// Read the next token that is not a comment.
    pub fn read_non_comment(&mut self) -> Result<Option<Token>, ScanError> {
        loop {
            match self.read()? {
                Some(t) if t.kind == TokenKind::Comment => continue,
                other => return Ok(other),
            }
        }
    }

    /// Unescape the content of a string or property name token.
    pub fn decode_string(&self, token: &Token) -> Result<String, ScanError> {
        decode_string(&self.text[token.start + 1..token.end - 1], token.start + 1)
    }

    fn close(&mut self, expected: Container) -> Result<(), ScanError> {
        if self.stack.pop() != Some(expected) {
            return Err(ScanError::MismatchedClose { offset: self.pos });
        }
        self.pos += 1;
        self.after_value();
        Ok(())
    }

    fn after_value(&mut self) {
        self.expect_name = false;
    }

    fn unexpected(&self, offset: usize) -> ScanError {
        match self.text[offset..].chars().next() {
            Some(ch) => ScanError::UnexpectedChar { ch, offset },
            None => ScanError::UnexpectedEnd,
        }
    }

    fn scan_literal(&mut self, word: &str, kind: TokenKind) -> Result<TokenKind, ScanError> {
        if !self.text[self.pos..].starts_with(word) {
            return Err(self.unexpected(self.pos));
        }
        self.pos += word.len();
        self.after_value();
        Ok(kind)
    }

    fn scan_string(&mut self) -> Result<(), ScanError> {
        let bytes = self.text.as_bytes();
        let start = self.pos;
        let mut i = start + 1;
        while let Some(&b) = bytes.get(i) {
            match b {
                b'"' => {
                    self.pos = i + 1;
                    return Ok(());
                }
                b'\\' => {
                    match bytes.get(i + 1) {
                        Some(b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' | b'u') => {}
                        Some(_) => return Err(ScanError::InvalidEscape { offset: i }),
                        None => break,
                    }
                    i += 2;
                }
                _ => i += 1,
            }
        }
        Err(ScanError::UnterminatedString { offset: start })
    }

    fn scan_comment(&mut self) -> Result<(), ScanError> {
        let start = self.pos;
        let rest = &self.text[start..];
        if rest.starts_with("//") {
            let len = rest.find('\n').unwrap_or(rest.len());
            // A CRLF terminator stays outside the comment.
            let len = if rest[..len].ends_with('\r') { len - 1 } else { len };
            self.pos += len;
            Ok(())
        } else if rest.starts_with("/*") {
            match rest[2..].find("*/") {
                Some(idx) => {
                    self.pos += idx + 4;
                    Ok(())
                }
                None => Err(ScanError::UnterminatedComment { offset: start }),
            }
        } else {
            Err(self.unexpected(start))
        }
    }
}

fn decode_string(raw: &str, base: usize) -> Result<String, ScanError> {
    if !raw.contains('\\') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let invalid = || ScanError::InvalidEscape { offset: base + i };
        let Some((_, esc)) = chars.next() else {
            return Err(invalid());
        };
        match esc {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let hi = read_hex4(raw, i + 2).ok_or_else(invalid)?;
                skip(&mut chars, 4);
                let mut code = hi as u32;
                if (0xD800..0xDC00).contains(&hi) && raw[i + 6..].starts_with("\\u") {
                    if let Some(lo) = read_hex4(raw, i + 8)
                        && (0xDC00..0xE000).contains(&lo)
                    {
                        code = 0x10000 + ((hi as u32 - 0xD800) << 10) + (lo as u32 - 0xDC00);
                        skip(&mut chars, 6);
                    }
                }
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            _ => return Err(invalid()),
        }
    }
    Ok(out)
}

fn read_hex4(raw: &str, at: usize) -> Option<u16> {
    let digits = raw.get(at..at + 4)?;
    u16::from_str_radix(digits, 16).ok()
}

fn skip(chars: &mut impl Iterator<Item = (usize, char)>, n: usize) {
    for _ in 0..n {
        chars.next();
    }
}
