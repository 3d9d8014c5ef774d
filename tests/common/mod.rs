pub mod lsp_client;

use std::process::Command;

#[allow(dead_code)]
pub fn jsls() -> Command {
    Command::new(env!("CARGO_BIN_EXE_jsls"))
}

#[allow(dead_code)]
pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"))
}

/// Arguments that resolve `https://schemas.example.com/<name>` to
/// `tests/fixtures/schemas/<name>`.
#[allow(dead_code)]
pub fn local_schema_args() -> Vec<String> {
    vec![
        "--search-path".to_string(),
        fixture("schemas"),
        "--search-glob".to_string(),
        "$1".to_string(),
        "--url-pattern".to_string(),
        r"^https://schemas\.example\.com/(.+)$".to_string(),
    ]
}

/// Run `jsls check --format json` and parse the output.
#[allow(dead_code)]
pub fn check_json(file: &str, extra: &[&str]) -> (serde_json::Value, i32) {
    let output = jsls()
        .args(["check", file, "--format", "json"])
        .args(local_schema_args())
        .args(extra)
        .output()
        .expect("failed to run jsls");
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap_or_else(|e| {
        panic!(
            "invalid JSON: {e}\nstdout: {stdout}\nstderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    });
    (json, code)
}

/// Run `jsls check` with NO_COLOR=1 and return (stderr, exit_code).
#[allow(dead_code)]
pub fn check_human(file: &str) -> (String, i32) {
    let output = jsls()
        .env("NO_COLOR", "1")
        .args(["check", file])
        .args(local_schema_args())
        .output()
        .expect("failed to run jsls");
    let code = output.status.code().unwrap_or(-1);
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    (stderr, code)
}
