use crate::diagnostic::{Diagnostic, Range, Severity, ToolDiagnostic};
use owo_colors::Stream::Stderr;
use owo_colors::{OwoColorize, Style};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Human,
    Json,
}

/// Outcome of checking one file.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub path: String,
    /// The `$schema` URL, `None` if the document declares none.
    pub schema: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub duration: Duration,
}

impl CheckReport {
    /// True if any diagnostic reports a failure of the tool itself.
    pub fn has_tool_error(&self) -> bool {
        self.diagnostics.iter().any(|d| d.code.is_tool_error())
    }

    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

fn plural(n: usize, singular: &str, plural_form: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural_form}")
    }
}

fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// Render a report in human format using miette.
pub fn render_human(report: &CheckReport, source: &str, stderr: &mut impl Write) {
    if report.schema.is_none() {
        let diag = ToolDiagnostic::warning("no $schema property")
            .with_help("add a \"$schema\" property naming the schema URL");
        let _ = writeln!(stderr, "{:?}", miette::Report::new(diag));
    }

    for diag in &report.diagnostics {
        let renderable = diag.to_renderable(&report.path, source);
        let _ = writeln!(stderr, "{:?}", miette::Report::new(renderable));
    }

    let _ = writeln!(stderr);
    let duration = format_duration(report.duration);
    if report.is_valid() {
        let msg = if report.schema.is_some() {
            format!("✓ {} is valid ({duration})", report.path)
        } else {
            format!("✓ {} skipped ({duration})", report.path)
        };
        let style = Style::new().green().bold();
        let _ = writeln!(
            stderr,
            "{}",
            msg.if_supports_color(Stderr, |text| text.style(style))
        );
    } else {
        let msg = format!(
            "✗ Found {} in {} ({duration})",
            plural(report.diagnostics.len(), "problem", "problems"),
            report.path,
        );
        let style = Style::new().red().bold();
        let _ = writeln!(
            stderr,
            "{}",
            msg.if_supports_color(Stderr, |text| text.style(style))
        );
    }
}

// --- Typed JSON output structures ---

#[derive(Serialize)]
struct JsonOutput<'a> {
    version: u32,
    path: &'a str,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    diagnostics: Vec<JsonDiagnostic<'a>>,
    duration_ms: u64,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    code: &'static str,
    severity: Severity,
    message: &'a str,
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<Range>,
}

/// Render a report in JSON format.
pub fn render_json(report: &CheckReport, stdout: &mut impl Write) -> serde_json::Result<()> {
    let output = JsonOutput {
        version: 1,
        path: &report.path,
        valid: report.is_valid(),
        schema: report.schema.as_deref(),
        diagnostics: report
            .diagnostics
            .iter()
            .map(|d| JsonDiagnostic {
                code: d.code.as_str(),
                severity: d.severity,
                message: &d.message,
                source: d.source,
                range: d.range,
            })
            .collect(),
        duration_ms: u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
    };
    let json = serde_json::to_string_pretty(&output)?;
    let _ = writeln!(stdout, "{json}");
    Ok(())
}
