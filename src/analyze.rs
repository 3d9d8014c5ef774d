//! Turns document text into diagnostics.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use jsonschema::ValidationError;
use jsonschema::error::ValidationErrorKind;

use crate::config::ConfigurationProvider;
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::parse;
use crate::pointer::{PathStack, element_bounds};
use crate::position::{PositionEncoding, TextLineMetrics, byte_range_to_range, line_metrics};
use crate::schema::SchemaProvider;

/// Validates documents against the schema named by their `$schema` property.
#[derive(Debug, Clone)]
pub struct Analyzer {
    schemas: Arc<SchemaProvider>,
    config: Arc<ConfigurationProvider>,
}

impl Analyzer {
    pub fn new(schemas: Arc<SchemaProvider>, config: Arc<ConfigurationProvider>) -> Self {
        Self { schemas, config }
    }

    /// Diagnostics for `text` with UTF-16 character offsets.
    pub fn analyze(&self, text: &str) -> Vec<Diagnostic> {
        self.analyze_with_encoding(text, PositionEncoding::Utf16)
    }

    /// Diagnostics for `text`, truncated to the configured maximum.
    ///
    /// Never fails: problems analyzing the document are reported as
    /// diagnostics.
    pub fn analyze_with_encoding(&self, text: &str, encoding: PositionEncoding) -> Vec<Diagnostic> {
        let mut diagnostics =
            match panic::catch_unwind(AssertUnwindSafe(|| self.analyze_unchecked(text, encoding))) {
                Ok(diagnostics) => diagnostics,
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    tracing::error!(%reason, "analysis panicked");
                    vec![Diagnostic::error(
                        DiagnosticCode::UnknownError,
                        format!("Unexpected error while validating: {reason}"),
                    )]
                }
            };
        self.config.current().clip(&mut diagnostics);
        diagnostics
    }

    fn analyze_unchecked(&self, text: &str, encoding: PositionEncoding) -> Vec<Diagnostic> {
        let value = match parse::parse_jsonc(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "document does not parse, skipping validation");
                return vec![];
            }
        };
        let Some(url) = parse::extract_schema_field(&value) else {
            return vec![];
        };
        match self.schemas.resolve(url) {
            Ok(validator) => validation_diagnostics(&validator, &value, text, encoding),
            Err(e) => {
                tracing::warn!(url, error = %e, "could not resolve schema");
                vec![Diagnostic::error(
                    DiagnosticCode::SchemaUnresolved,
                    format!("Could not resolve schema '{url}': {e}"),
                )]
            }
        }
    }
}

/// One diagnostic per leaf validation error of `instance`, located in `text`.
///
/// `anyOf` and `oneOf` failures are replaced by the failures of their
/// branches, depth-first and in branch order. An error whose location cannot
/// be found in `text` becomes a processing error without affecting the others.
pub fn validation_diagnostics(
    validator: &jsonschema::Validator,
    instance: &serde_json::Value,
    text: &str,
    encoding: PositionEncoding,
) -> Vec<Diagnostic> {
    let metrics = line_metrics(text);
    let mut diagnostics = Vec::new();
    for err in validator.iter_errors(instance) {
        collect_leaves(&err, &mut |leaf| {
            diagnostics.push(leaf_diagnostic(leaf, text, &metrics, encoding));
        });
    }
    diagnostics
}

fn collect_leaves(err: &ValidationError<'_>, visit: &mut impl FnMut(&ValidationError<'_>)) {
    match err.kind() {
        ValidationErrorKind::AnyOf { context } | ValidationErrorKind::OneOfNotValid { context }
            if context.iter().any(|branch| !branch.is_empty()) =>
        {
            for nested in context.iter().flatten() {
                collect_leaves(nested, visit);
            }
        }
        _ => visit(err),
    }
}

fn leaf_diagnostic(
    err: &ValidationError<'_>,
    text: &str,
    metrics: &[TextLineMetrics<'_>],
    encoding: PositionEncoding,
) -> Diagnostic {
    let pointer: PathStack = err.instance_path().iter().collect();
    match element_bounds(text, &pointer) {
        Ok((start, end)) => {
            let range = byte_range_to_range(metrics, start, end, encoding);
            Diagnostic::error(DiagnosticCode::ValidationError, err.to_string())
                .with_location(start..end, range)
        }
        Err(e) => {
            tracing::warn!(%pointer, error = %e, "could not locate validation error");
            Diagnostic::error(
                DiagnosticCode::ResultProcessing,
                format!("Could not locate '{pointer}' in the document: {e}"),
            )
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
