mod common;

use common::{check_json, fixture, jsls, local_schema_args};

#[test]
fn valid_file() {
    let output = jsls()
        .args(["check", &fixture("valid.json")])
        .args(local_schema_args())
        .output()
        .expect("failed to run jsls");

    assert!(
        output.status.success(),
        "Expected exit code 0, got {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn invalid_file() {
    let (_, code) = check_json(&fixture("invalid.jsonc"), &[]);
    assert_eq!(code, 1);
}

#[test]
fn no_schema_is_not_an_error() {
    let (_, code) = check_json(&fixture("no-schema.json"), &[]);
    assert_eq!(code, 0);
}

#[test]
fn unresolved_schema_is_tool_error() {
    let (_, code) = check_json(&fixture("unresolved.json"), &[]);
    assert_eq!(code, 2);
}

#[test]
fn missing_file_is_tool_error() {
    let output = jsls()
        .args(["check", &fixture("does-not-exist.json")])
        .output()
        .expect("failed to run jsls");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn parse_error_is_tool_error() {
    let output = jsls()
        .env("NO_COLOR", "1")
        .args(["check", &fixture("broken.json")])
        .output()
        .expect("failed to run jsls");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse error"), "stderr: {stderr}");
}
