mod common;

use common::lsp_client::{TestClient, WIDGET_SCHEMA, WIDGET_URL, file_uri};

const LOCAL_URL: &str = "https://local.example.com/thing.json";

fn doc_uri() -> String {
    file_uri("/tmp/jsls-test/config.json")
}

fn local_settings(dir: &std::path::Path) -> serde_json::Value {
    serde_json::json!({
        "schemaSearchPaths": dir.display().to_string(),
        "schemaSearchGlobs": "$1",
        "schemaSearchUrlPattern": r"^https://local\.example\.com/(.+)$",
    })
}

fn count(params: &serde_json::Value) -> usize {
    params["diagnostics"].as_array().unwrap().len()
}

/// A configuration change re-validates the active document.
#[tokio::test]
async fn max_problems_applies_to_active_document() {
    let mut client = TestClient::new();
    client.initialize().await;

    let text = format!(r#"{{"$schema": "{WIDGET_URL}", "name": 3, "size": 0, "tags": [7]}}"#);
    client.did_open(&doc_uri(), &text).await;
    assert_eq!(count(&client.recv_diagnostics().await), 3);

    client
        .did_change_configuration(serde_json::json!({"maxNumberOfProblems": 1}))
        .await;
    let params = client.recv_diagnostics().await;
    assert_eq!(params["uri"], doc_uri());
    assert_eq!(count(&params), 1);

    // Negative means unlimited.
    client
        .did_change_configuration(serde_json::json!({"maxNumberOfProblems": -1}))
        .await;
    assert_eq!(count(&client.recv_diagnostics().await), 3);
}

/// Keys are case-insensitive and may be wrapped in a section object.
#[tokio::test]
async fn section_wrapper_and_key_case() {
    let mut client = TestClient::new();
    client.initialize().await;

    let text = format!(r#"{{"$schema": "{WIDGET_URL}", "name": 3, "size": 0}}"#);
    client.did_open(&doc_uri(), &text).await;
    assert_eq!(count(&client.recv_diagnostics().await), 2);

    client
        .did_change_configuration(serde_json::json!({
            "jsonSchemaLanguageServer": {"MAXNUMBEROFPROBLEMS": 1}
        }))
        .await;
    assert_eq!(count(&client.recv_diagnostics().await), 1);
    assert_eq!(
        client.services.config.current().max_number_of_problems,
        Some(1)
    );
}

/// Search paths let a schema that is unreachable over the network resolve
/// from disk once configured.
#[tokio::test]
async fn local_override_resolves_after_configuration() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("thing.json"), WIDGET_SCHEMA).unwrap();

    let mut client = TestClient::new();
    client.initialize().await;

    let text = format!(r#"{{"$schema": "{LOCAL_URL}", "name": 3}}"#);
    client.did_open(&doc_uri(), &text).await;
    let params = client.recv_diagnostics().await;
    assert_eq!(params["diagnostics"][0]["code"], "JSLS-101");

    client
        .did_change_configuration(local_settings(dir.path()))
        .await;
    let params = client.recv_diagnostics().await;
    assert_eq!(count(&params), 1);
    assert_eq!(params["diagnostics"][0]["code"], "JSLS-1000");
    assert_eq!(client.services.file_cache.len(), 1);
}

/// Changing configuration drops cached schemas so new search paths apply.
#[tokio::test]
async fn configuration_change_clears_caches() {
    let first = tempfile::tempdir().unwrap();
    std::fs::write(first.path().join("thing.json"), r#"{"type": "object"}"#).unwrap();
    let second = tempfile::tempdir().unwrap();
    std::fs::write(second.path().join("thing.json"), r#"{"type": "array"}"#).unwrap();

    let mut client = TestClient::new();
    client.initialize().await;
    client
        .did_change_configuration(local_settings(first.path()))
        .await;

    let text = format!(r#"{{"$schema": "{LOCAL_URL}"}}"#);
    client.did_open(&doc_uri(), &text).await;
    assert_eq!(count(&client.recv_diagnostics().await), 0);

    client
        .did_change_configuration(local_settings(second.path()))
        .await;
    let params = client.recv_diagnostics().await;
    assert_eq!(count(&params), 1);
    assert_eq!(params["diagnostics"][0]["code"], "JSLS-1000");
}

/// A settings payload that is not an object is ignored.
#[tokio::test]
async fn malformed_settings_ignored() {
    let mut client = TestClient::new();
    client.initialize().await;

    client.did_change_configuration(serde_json::json!(42)).await;
    client
        .did_change_configuration(serde_json::json!({"maxNumberOfProblems": "many"}))
        .await;

    let text = format!(r#"{{"$schema": "{WIDGET_URL}", "name": 3, "size": 0}}"#);
    client.did_open(&doc_uri(), &text).await;
    assert_eq!(count(&client.recv_diagnostics().await), 2);
    assert_eq!(
        client.services.config.current().max_number_of_problems,
        None
    );
}
