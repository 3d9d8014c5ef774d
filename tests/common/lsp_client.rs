#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

use jsls::config::Configuration;
use jsls::fetch::{Fetch, StaticFetch};
use jsls::lsp::{self, Session};
use jsls::services::Services;

pub const WIDGET_URL: &str = "https://schemas.example.com/widget.json";
pub const ARRAY_URL: &str = "https://schemas.example.com/array.json";

/// Requires `{name: string, size: integer >= 1, tags: [string]}`.
pub const WIDGET_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "name": {"type": "string"},
        "size": {"type": "integer", "minimum": 1},
        "tags": {"type": "array", "items": {"type": "string"}}
    }
}"#;

/// Schemas served in place of the network.
pub fn static_fetch() -> StaticFetch {
    StaticFetch::new()
        .with(WIDGET_URL, WIDGET_SCHEMA)
        .with(ARRAY_URL, r#"{"type": "array"}"#)
}

/// In-process LSP test client backed by `tokio::io::duplex`.
///
/// The server runs in a background task on the same tokio runtime.
pub struct TestClient {
    write: tokio::io::DuplexStream,
    read: BufReader<tokio::io::DuplexStream>,
    _server: tokio::task::JoinHandle<()>,
    next_id: AtomicI64,
    pub session: Session,
    pub services: Services,
}

impl TestClient {
    pub fn new() -> Self {
        Self::with_fetch(static_fetch())
    }

    pub fn with_fetch(fetch: StaticFetch) -> Self {
        let fetch: Arc<dyn Fetch> = Arc::new(fetch);
        let services = Services::new(fetch, Configuration::default()).unwrap();
        Self::with_services(services)
    }

    pub fn with_services(services: Services) -> Self {
        // Two duplex pairs: (client→server) and (server→client).
        let (client_write, server_read) = tokio::io::duplex(65536);
        let (server_write, client_read) = tokio::io::duplex(65536);

        let session = Session::new();
        let server_handle = tokio::spawn(lsp::serve(
            server_read,
            server_write,
            services.clone(),
            session.clone(),
        ));

        Self {
            write: client_write,
            read: BufReader::new(client_read),
            _server: server_handle,
            next_id: AtomicI64::new(1),
            session,
            services,
        }
    }

    /// Send a raw JSON-RPC message (request or notification) with LSP framing.
    pub async fn send(&mut self, msg: serde_json::Value) {
        let json = serde_json::to_string(&msg).unwrap();
        let header = format!("Content-Length: {}\r\n\r\n", json.len());
        self.write.write_all(header.as_bytes()).await.unwrap();
        self.write.write_all(json.as_bytes()).await.unwrap();
        self.write.flush().await.unwrap();
    }

    /// Receive the next LSP-framed JSON-RPC message.
    pub async fn recv(&mut self) -> serde_json::Value {
        let mut content_length: usize = 0;
        loop {
            let mut line = String::new();
            self.read.read_line(&mut line).await.unwrap();
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            if let Some(len_str) = line.strip_prefix("Content-Length: ") {
                content_length = len_str.trim().parse().unwrap();
            }
        }
        let mut body = vec![0u8; content_length];
        self.read.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Receive messages, discarding everything except the first message with the
    /// given `method` field. Returns the full message.
    pub async fn recv_notification(&mut self, method: &str) -> serde_json::Value {
        loop {
            let msg = self.recv().await;
            if msg["method"].as_str() == Some(method) {
                return msg;
            }
        }
    }

    /// Next `publishDiagnostics` notification's params.
    pub async fn recv_diagnostics(&mut self) -> serde_json::Value {
        self.recv_notification("textDocument/publishDiagnostics")
            .await["params"]
            .clone()
    }

    /// Receive the response to request `id`, skipping notifications.
    async fn recv_response(&mut self, id: i64) -> serde_json::Value {
        loop {
            let msg = self.recv().await;
            if msg.get("id") == Some(&serde_json::json!(id)) && msg.get("method").is_none() {
                return msg;
            }
        }
    }

    /// Send `initialize` request and `initialized` notification; return the
    /// `InitializeResult` from the response.
    pub async fn initialize(&mut self) -> serde_json::Value {
        self.initialize_with_params(serde_json::json!({})).await
    }

    /// Like `initialize` but allows custom client capabilities.
    pub async fn initialize_with_params(
        &mut self,
        capabilities: serde_json::Value,
    ) -> serde_json::Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "capabilities": capabilities,
                "processId": null,
                "rootUri": null
            }
        }))
        .await;

        let response = self.recv_response(id).await;

        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "initialized",
            "params": {}
        }))
        .await;

        response["result"].clone()
    }

    /// Send `textDocument/didOpen`.
    pub async fn did_open(&mut self, uri: &str, text: &str) {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didOpen",
            "params": {
                "textDocument": {
                    "uri": uri,
                    "languageId": "json",
                    "version": 1,
                    "text": text
                }
            }
        }))
        .await;
    }

    /// Send `textDocument/didChange` (FULL sync).
    pub async fn did_change(&mut self, uri: &str, version: i32, text: &str) {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "textDocument/didChange",
            "params": {
                "textDocument": {
                    "uri": uri,
                    "version": version
                },
                "contentChanges": [{"text": text}]
            }
        }))
        .await;
    }

    /// Send `workspace/didChangeConfiguration`.
    pub async fn did_change_configuration(&mut self, settings: serde_json::Value) {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "workspace/didChangeConfiguration",
            "params": { "settings": settings }
        }))
        .await;
    }

    /// Send `textDocument/completion` request and return the result.
    pub async fn completion(&mut self, uri: &str, line: u32, character: u32) -> serde_json::Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "textDocument/completion",
            "params": {
                "textDocument": { "uri": uri },
                "position": { "line": line, "character": character }
            }
        }))
        .await;

        self.recv_response(id).await["result"].clone()
    }

    /// Send `shutdown` request and wait for its response.
    pub async fn shutdown(&mut self) -> serde_json::Value {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "shutdown",
            "params": null
        }))
        .await;
        self.recv_response(id).await
    }

    /// Send `exit` and close the transport. Returns the session handle.
    pub async fn exit(mut self) -> Session {
        self.send(serde_json::json!({
            "jsonrpc": "2.0",
            "method": "exit",
            "params": null
        }))
        .await;
        self.session.clone()
    }
}

/// Convenience: build a `file://` URI from an absolute path string.
pub fn file_uri(path: &str) -> String {
    format!("file://{path}")
}
