//! JSON Pointer navigation over the streaming reader.
//!
//! Resolves a pointer to the token span of the value it addresses in a single
//! forward pass. Subtrees whose path already diverges from the target are
//! skipped with a balanced bracket scan instead of being descended into, so
//! the work is linear in the size of the document.

use std::fmt;
use std::str::FromStr;

use jsonschema::paths::LocationSegment;
use thiserror::Error;

use crate::scan::{JsonReader, ScanError, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("no value at JSON pointer '{0}'")]
    NotFound(String),
    #[error("invalid JSON pointer '{0}': must be empty or start with '/'")]
    Invalid(String),
    #[error("unexpected token at byte {offset}")]
    UnexpectedToken { offset: usize },
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// One step of a path: an array index or an object key.
///
/// `Index(0)` and `Key("0")` are different segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Key(k) => f.write_str(&k.replace('~', "~0").replace('/', "~1")),
        }
    }
}

/// The path to a value, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathStack {
    segments: Vec<PathSegment>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.segments.pop()
    }

    /// Advance the top array index by one. Returns false if the top is not an index.
    pub fn increment_top(&mut self) -> bool {
        match self.segments.last_mut() {
            Some(PathSegment::Index(i)) => {
                *i += 1;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of leading segments shared with `other`.
    pub fn matching_prefix_len(&self, other: &PathStack) -> usize {
        self.segments
            .iter()
            .zip(&other.segments)
            .take_while(|(a, b)| a == b)
            .count()
    }

    pub fn is_prefix_of(&self, other: &PathStack) -> bool {
        self.len() <= other.len() && self.matching_prefix_len(other) == self.len()
    }
}

impl fmt::Display for PathStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

/// Parses an RFC 6901 pointer. Canonical decimal segments become indices.
impl FromStr for PathStack {
    type Err = PointerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::new());
        }
        let Some(rest) = s.strip_prefix('/') else {
            return Err(PointerError::Invalid(s.to_string()));
        };
        let segments = rest
            .split('/')
            .map(|raw| {
                let key = raw.replace("~1", "/").replace("~0", "~");
                match parse_index(&key) {
                    Some(i) => PathSegment::Index(i),
                    None => PathSegment::Key(key),
                }
            })
            .collect();
        Ok(Self { segments })
    }
}

fn parse_index(s: &str) -> Option<usize> {
    let canonical = s == "0" || (!s.starts_with('0') && !s.is_empty());
    if canonical && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

/// Builds a path from a validator's instance location, keeping segment types.
impl<'a> FromIterator<LocationSegment<'a>> for PathStack {
    fn from_iter<I: IntoIterator<Item = LocationSegment<'a>>>(iter: I) -> Self {
        let segments = iter
            .into_iter()
            .map(|seg| match seg {
                LocationSegment::Property(name) => PathSegment::Key(name.to_string()),
                LocationSegment::Index(idx) => PathSegment::Index(idx),
            })
            .collect();
        Self { segments }
    }
}

impl FromIterator<PathSegment> for PathStack {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

fn next_token(reader: &mut JsonReader<'_>) -> Result<Token, PointerError> {
    reader
        .read_non_comment()?
        .ok_or(PointerError::Scan(ScanError::UnexpectedEnd))
}

/// Scan forward until the value addressed by `target` is reached and return
/// its first token.
///
/// When no such value exists the whole input is consumed before
/// [`PointerError::NotFound`] is returned.
pub fn advance_to_pointer(
    reader: &mut JsonReader<'_>,
    target: &PathStack,
) -> Result<Token, PointerError> {
    let mut path = PathStack::new();
    let root = next_token(reader)?;
    if let Some(found) = find_value(reader, root, &mut path, target)? {
        return Ok(found);
    }
    while reader.read()?.is_some() {}
    Err(PointerError::NotFound(target.to_string()))
}

/// `token` is the first token of the value at `path`, and `path` is a prefix
/// of `target`. On `None` the value has been consumed entirely.
fn find_value(
    reader: &mut JsonReader<'_>,
    token: Token,
    path: &mut PathStack,
    target: &PathStack,
) -> Result<Option<Token>, PointerError> {
    if path == target {
        return Ok(Some(token));
    }
    match token.kind {
        TokenKind::StartObject => find_in_object(reader, path, target),
        TokenKind::StartArray => find_in_array(reader, path, target),
        TokenKind::String | TokenKind::Number | TokenKind::True | TokenKind::False
        | TokenKind::Null => Ok(None),
        _ => Err(PointerError::UnexpectedToken {
            offset: token.start,
        }),
    }
}

fn skip_value(reader: &mut JsonReader<'_>, token: Token) -> Result<(), PointerError> {
    if token.kind.is_container_start() {
        skip_container(reader)?;
    }
    Ok(())
}

/// Search the elements of an array whose `[` has just been read.
///
/// Returns with the closing `]` consumed and `path` restored when the target
/// is not inside the array.
pub fn find_in_array(
    reader: &mut JsonReader<'_>,
    path: &mut PathStack,
    target: &PathStack,
) -> Result<Option<Token>, PointerError> {
    path.push(PathSegment::Index(0));
    let mut first = true;
    loop {
        let token = next_token(reader)?;
        if token.kind == TokenKind::EndArray {
            path.pop();
            return Ok(None);
        }
        if !first {
            path.increment_top();
        }
        first = false;

        if path.is_prefix_of(target) {
            if let Some(found) = find_value(reader, token, path, target)? {
                return Ok(Some(found));
            }
        } else {
            skip_value(reader, token)?;
        }
    }
}

/// Search the members of an object whose `{` has just been read.
pub fn find_in_object(
    reader: &mut JsonReader<'_>,
    path: &mut PathStack,
    target: &PathStack,
) -> Result<Option<Token>, PointerError> {
    loop {
        let token = next_token(reader)?;
        match token.kind {
            TokenKind::EndObject => return Ok(None),
            TokenKind::PropertyName => {
                let name = reader.decode_string(&token)?;
                path.push(PathSegment::Key(name));
                let value = next_token(reader)?;
                if path.is_prefix_of(target) {
                    if let Some(found) = find_value(reader, value, path, target)? {
                        return Ok(Some(found));
                    }
                } else {
                    skip_value(reader, value)?;
                }
                path.pop();
            }
            _ => {
                return Err(PointerError::UnexpectedToken {
                    offset: token.start,
                });
            }
        }
    }
}

/// Consume tokens up to the bracket closing the container that was just
/// opened, and return that closing token.
pub fn skip_container(reader: &mut JsonReader<'_>) -> Result<Token, PointerError> {
    let mut depth = 1usize;
    loop {
        let token = next_token(reader)?;
        if token.kind.is_container_start() {
            depth += 1;
        } else if token.kind.is_container_end() {
            depth -= 1;
            if depth == 0 {
                return Ok(token);
            }
        }
    }
}

/// Byte bounds `[start, end)` of the value addressed by `pointer`.
///
/// Strings include their quotes and containers include their closing bracket.
pub fn element_bounds(text: &str, pointer: &PathStack) -> Result<(usize, usize), PointerError> {
    let mut reader = JsonReader::new(text);
    let token = advance_to_pointer(&mut reader, pointer)?;
    if token.kind.is_container_start() {
        let close = skip_container(&mut reader)?;
        Ok((token.start, close.end))
    } else {
        Ok((token.start, token.end))
    }
}
