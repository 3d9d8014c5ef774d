use jsonc_parser::ParseOptions;
use jsonc_parser::parse_to_ast;
use std::ops::Range;

/// Standard parse options: comments + trailing commas allowed.
pub fn parse_options() -> ParseOptions {
    ParseOptions {
        allow_comments: true,
        allow_trailing_commas: true,
        allow_loose_object_property_names: false,
        allow_single_quoted_strings: false,
        allow_hexadecimal_numbers: false,
        allow_missing_commas: false,
        allow_unary_plus_numbers: false,
    }
}

/// Strip UTF-8 BOM if present.
pub fn strip_bom(source: &str) -> &str {
    source.strip_prefix('\u{FEFF}').unwrap_or(source)
}

/// A parse error with an optional source range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub range: Option<Range<usize>>,
}

/// Parse JSONC source into a `serde_json::Value`.
pub fn parse_jsonc(source: &str) -> Result<serde_json::Value, ParseError> {
    let source = strip_bom(source);
    match parse_to_ast(source, &Default::default(), &parse_options()) {
        Ok(result) => match result.value {
            Some(ast) => Ok(ast.into()),
            None => Err(ParseError {
                message: "File contains no JSON value".into(),
                range: None,
            }),
        },
        Err(err) => {
            let range = err.range();
            Err(ParseError {
                message: err.to_string(),
                range: Some(range.start..range.end),
            })
        }
    }
}

/// Parse a fetched schema body. Bodies must be UTF-8; comments are tolerated.
pub fn parse_schema_bytes(bytes: &[u8]) -> Result<serde_json::Value, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError {
        message: format!("schema is not valid UTF-8: {e}"),
        range: None,
    })?;
    parse_jsonc(text)
}

/// Extract the `$schema` field from a parsed JSON value.
pub fn extract_schema_field(value: &serde_json::Value) -> Option<&str> {
    value
        .as_object()
        .and_then(|obj| obj.get("$schema"))
        .and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jsonc_with_comments() {
        let source = r#"{
  // comment
  "key": "value",
}"#;
        let value = parse_jsonc(source).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_parse_jsonc_with_bom() {
        let value = parse_jsonc("\u{FEFF}[1, 2]").unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
    }

    #[test]
    fn test_parse_jsonc_error_has_range() {
        let err = parse_jsonc("{\"a\": }").unwrap_err();
        assert!(err.range.is_some());
    }

    #[test]
    fn test_parse_jsonc_empty() {
        let err = parse_jsonc("   ").unwrap_err();
        assert_eq!(err.range, None);
    }

    #[test]
    fn test_parse_schema_bytes_rejects_invalid_utf8() {
        assert!(parse_schema_bytes(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_extract_schema_field() {
        let v: serde_json::Value =
            serde_json::json!({"$schema": "https://example.com/schema.json", "key": "val"});
        assert_eq!(
            extract_schema_field(&v),
            Some("https://example.com/schema.json")
        );
    }

    #[test]
    fn test_extract_schema_field_missing() {
        let v: serde_json::Value = serde_json::json!({"key": "val"});
        assert_eq!(extract_schema_field(&v), None);
    }

    #[test]
    fn test_extract_schema_field_not_a_string() {
        let v: serde_json::Value = serde_json::json!({"$schema": 3});
        assert_eq!(extract_schema_field(&v), None);
        assert_eq!(extract_schema_field(&serde_json::json!([1])), None);
    }
}
