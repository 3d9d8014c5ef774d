use miette::SourceSpan;
use thiserror::Error;

/// Value of the `source` field on every published diagnostic.
pub const DIAGNOSTIC_SOURCE: &str = "jsls";

/// The severity of a diagnostic. Everything reported today is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
}

/// Stable diagnostic codes reported to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// Unexpected failure while analyzing a document.
    UnknownError,
    /// The `$schema` URL could not be fetched or compiled.
    SchemaUnresolved,
    /// A validation failure could not be mapped back to the text.
    ResultProcessing,
    /// The document violates its schema.
    ValidationError,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownError => "JSLS-100",
            Self::SchemaUnresolved => "JSLS-101",
            Self::ResultProcessing => "JSLS-102",
            Self::ValidationError => "JSLS-1000",
        }
    }

    /// Whether this code reports a failure of the tool rather than of the document.
    pub fn is_tool_error(&self) -> bool {
        !matches!(self, Self::ValidationError)
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for DiagnosticCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Zero-based line/character position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// A diagnostic produced by one analysis pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub range: Option<Range>,
    /// Byte span in the analyzed text, when the diagnostic points at a value.
    pub span: Option<std::ops::Range<usize>>,
    pub source: &'static str,
}

impl Diagnostic {
    /// An error-severity diagnostic with no location.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            range: None,
            span: None,
            source: DIAGNOSTIC_SOURCE,
        }
    }

    pub fn with_location(mut self, span: std::ops::Range<usize>, range: Range) -> Self {
        self.span = Some(span);
        self.range = Some(range);
        self
    }

    /// Convert to a miette-renderable diagnostic.
    pub fn to_renderable(&self, file_path: &str, source: &str) -> RenderableDiagnostic {
        // A zero-length span at offset 0 keeps the "╭─[file:1:1]" header for
        // diagnostics without a location.
        let span = match &self.span {
            Some(r) => SourceSpan::new(r.start.into(), r.len()),
            None => SourceSpan::new(0.into(), 0),
        };
        RenderableDiagnostic {
            message: format!("{}: {}", self.code, self.message),
            src: miette::NamedSource::new(file_path, source.to_owned()),
            span: Some(span),
            label: self.span.as_ref().map(|_| "here".to_string()),
        }
    }
}

/// Miette-compatible error for rendering rich diagnostics.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RenderableDiagnostic {
    pub message: String,
    pub src: miette::NamedSource<String>,
    pub span: Option<SourceSpan>,
    pub label: Option<String>,
}

impl miette::Diagnostic for RenderableDiagnostic {
    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        self.span.map(|span| {
            Box::new(std::iter::once(miette::LabeledSpan::new(
                self.label.clone(),
                span.offset(),
                span.len(),
            ))) as Box<dyn Iterator<Item = miette::LabeledSpan>>
        })
    }
}

/// A lightweight diagnostic for tool-level errors that have no source code.
///
/// Renders through miette as:
///   × could not read settings.json: No such file or directory
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolDiagnostic {
    message: String,
    severity: miette::Severity,
    help_text: Option<String>,
}

impl ToolDiagnostic {
    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            severity: miette::Severity::Error,
            help_text: None,
        }
    }

    pub fn warning(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
            severity: miette::Severity::Warning,
            help_text: None,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help_text = Some(help.into());
        self
    }
}

impl miette::Diagnostic for ToolDiagnostic {
    fn severity(&self) -> Option<miette::Severity> {
        Some(self.severity)
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.help_text
            .as_ref()
            .map(|h| Box::new(h.as_str()) as Box<dyn std::fmt::Display>)
    }
}
