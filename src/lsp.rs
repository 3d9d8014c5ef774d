use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::*;
use tower_lsp_server::{Client, LanguageServer, LspService, Server};

use crate::config::Configuration;
use crate::diagnostic::{self as diag, DiagnosticCode, Severity};
use crate::position::PositionEncoding;
use crate::services::Services;

/// Lifecycle of a protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    ShuttingDown,
    Exited,
}

/// Shared view of the session lifecycle. `Exited` is terminal.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn transition(&self, to: SessionState) {
        self.state.send_modify(|state| {
            if *state != SessionState::Exited {
                tracing::debug!(from = ?*state, ?to, "session state");
                *state = to;
            }
        });
    }

    /// Resolves once the session has exited.
    pub async fn wait_for_exit(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == SessionState::Exited).await;
    }
}

/// The document most recently opened.
#[derive(Debug, Clone)]
struct Document {
    uri: Uri,
    text: Arc<String>,
}

/// LSP server backend.
#[derive(Clone)]
pub struct Backend {
    client: Client,
    services: Services,
    session: Session,
    active: Arc<Mutex<Option<Document>>>,
    /// True if the client negotiated UTF-8 position encoding; false = UTF-16 (default).
    utf8_positions: Arc<AtomicBool>,
    /// Serializes document and configuration handlers so each one finishes,
    /// publish included, before the next starts.
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("state", &self.session.state())
            .finish()
    }
}

impl Backend {
    pub fn new(client: Client, services: Services, session: Session) -> Self {
        Self {
            client,
            services,
            session,
            active: Arc::new(Mutex::new(None)),
            utf8_positions: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn encoding(&self) -> PositionEncoding {
        if self.utf8_positions.load(Ordering::Relaxed) {
            PositionEncoding::Utf8
        } else {
            PositionEncoding::Utf16
        }
    }

    fn active_document(&self) -> Option<Document> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Validate `text` on the blocking pool and publish the result for `uri`.
    async fn validate_and_publish(&self, uri: Uri, text: Arc<String>) {
        let analyzer = self.services.analyzer.clone();
        let encoding = self.encoding();
        let result =
            tokio::task::spawn_blocking(move || analyzer.analyze_with_encoding(&text, encoding))
                .await;

        let diagnostics = match result {
            Ok(d) => d,
            Err(e) => {
                self.client
                    .log_message(
                        MessageType::ERROR,
                        format!("jsls: validation task failed: {e}"),
                    )
                    .await;
                vec![diag::Diagnostic::error(
                    DiagnosticCode::UnknownError,
                    format!("Unexpected error while validating: {e}"),
                )]
            }
        };

        tracing::debug!(uri = uri.as_str(), count = diagnostics.len(), "publishing diagnostics");
        let diagnostics = diagnostics.iter().map(to_lsp_diagnostic).collect();
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }
}

impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        // Negotiate positionEncoding: prefer UTF-8 if the client advertises it.
        let utf8 = params
            .capabilities
            .general
            .as_ref()
            .and_then(|g| g.position_encodings.as_ref())
            .and_then(|encs| {
                encs.iter()
                    .find(|e| e.as_str() == PositionEncodingKind::UTF8.as_str())
            })
            .is_some();

        self.utf8_positions.store(utf8, Ordering::Relaxed);

        let position_encoding = if utf8 {
            PositionEncodingKind::UTF8
        } else {
            PositionEncodingKind::UTF16
        };

        self.session.transition(SessionState::Initialized);

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "jsls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                position_encoding: Some(position_encoding),
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![",".to_string(), ".".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            offset_encoding: None,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        tracing::info!("client initialized");
        self.client
            .log_message(MessageType::INFO, "jsls: server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.session.transition(SessionState::ShuttingDown);
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let _gate = self.gate.lock().await;
        let document = Document {
            uri: params.text_document.uri,
            text: Arc::new(params.text_document.text),
        };
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(document.clone());
        self.validate_and_publish(document.uri, document.text).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let _gate = self.gate.lock().await;
        let uri = params.text_document.uri;

        // FULL sync: take the first content change.
        let Some(text) = params
            .content_changes
            .into_iter()
            .next()
            .map(|c| Arc::new(c.text))
        else {
            return;
        };

        {
            let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(doc) = active.as_mut()
                && doc.uri == uri
            {
                doc.text = Arc::clone(&text);
            }
        }

        self.validate_and_publish(uri, text).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let _gate = self.gate.lock().await;
        let config = match Configuration::from_settings(&params.settings) {
            Ok(c) => c,
            Err(e) => {
                self.client
                    .log_message(
                        MessageType::WARNING,
                        format!("jsls: ignoring settings ({e})"),
                    )
                    .await;
                return;
            }
        };

        // Observers clear the file and schema caches before `update` returns.
        if !self.services.config.update(config) {
            return;
        }

        if let Some(doc) = self.active_document() {
            self.validate_and_publish(doc.uri, doc.text).await;
        }
    }

    async fn completion(&self, _: CompletionParams) -> Result<Option<CompletionResponse>> {
        Ok(Some(CompletionResponse::Array(vec![CompletionItem {
            label: "$schema".to_string(),
            kind: Some(CompletionItemKind::PROPERTY),
            detail: Some("URL of the JSON Schema for this document".to_string()),
            ..Default::default()
        }])))
    }
}

/// Convert a diagnostic to its protocol form. Diagnostics without a location
/// are reported at the start of the document.
fn to_lsp_diagnostic(d: &diag::Diagnostic) -> Diagnostic {
    let range = d
        .range
        .map(|r| {
            Range::new(
                Position::new(r.start.line, r.start.character),
                Position::new(r.end.line, r.end.character),
            )
        })
        .unwrap_or_default();

    let severity = match d.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
    };

    Diagnostic {
        range,
        severity: Some(severity),
        code: Some(NumberOrString::String(d.code.as_str().to_string())),
        source: Some(d.source.to_string()),
        message: d.message.clone(),
        ..Default::default()
    }
}

/// Serve one session over the given streams until the client exits or
/// disconnects.
pub async fn serve<I, O>(input: I, output: O, services: Services, session: Session)
where
    I: AsyncRead + Unpin,
    O: AsyncWrite,
{
    let backend_session = session.clone();
    let (service, socket) =
        LspService::new(move |client| Backend::new(client, services, backend_session));
    Server::new(input, output, socket).serve(service).await;
    session.transition(SessionState::Exited);
    tracing::info!("session exited");
}

/// Start the LSP server over stdio.
pub async fn run_server(services: Services) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    serve(stdin, stdout, services, Session::new()).await;
}
