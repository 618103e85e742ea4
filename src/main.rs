//! Binary entry point: CLI parsing, transport setup, and the `tower`
//! service that wires LSP requests into `LanguageService`.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::lsp_types::{
    Diagnostic, DidChangeTextDocumentParams, DidChangeWatchedFilesParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, DocumentSymbolParams, DocumentSymbolResponse,
    FileChangeType, GotoDefinitionParams, GotoDefinitionResponse, InitializeParams, InitializeResult,
    PublishDiagnosticsParams, ServerCapabilities, ServerInfo, TextDocumentSyncCapability,
    TextDocumentSyncKind, Url,
};
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::server::LifecycleLayer;
use async_lsp::tracing::TracingLayer;
use async_lsp::{ClientSocket, LanguageClient, ResponseError};
use clap::Parser;
use futures::future::BoxFuture;
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};
use tower::ServiceBuilder;

use slangd_rs::cli::Args;
use slangd_rs::logging;
use slangd_rs::services::{FileChangeKind, LanguageService};

struct ServerState {
    client: ClientSocket,
    service: Arc<LanguageService>,
    shutdown_received: Arc<AtomicBool>,
}

fn tick_diagnostics(client: ClientSocket, uri: Url, version: i32, diagnostics: Vec<Diagnostic>) {
    let _ = client.publish_diagnostics(PublishDiagnosticsParams {
        uri,
        diagnostics,
        version: Some(version),
    });
}

fn wait_for_gdb() {
    if std::env::var_os("WAIT_FOR_GDB").is_none() {
        return;
    }
    tracing::info!(target: "slangd::transport", pid = std::process::id(), "waiting for debugger to attach");
    let attached = Arc::new(AtomicBool::new(false));
    while !attached.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
        if std::env::var_os("WAIT_FOR_GDB_RELEASE").is_some() {
            attached.store(true, Ordering::SeqCst);
        }
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(target: "slangd::transport", "panic: {info}");
        default_hook(info);
        std::process::abort();
    }));
}

fn build_service(client: ClientSocket) -> impl tower::Service<
    async_lsp::AnyRequest,
    Response = serde_json::Value,
    Error = ResponseError,
    Future = BoxFuture<'static, Result<serde_json::Value, ResponseError>>,
> + Send {
    let shutdown_received = Arc::new(AtomicBool::new(false));
    let service = Arc::new(LanguageService::new());
    {
        let client = client.clone();
        service.set_diagnostics_publisher(Arc::new(move |uri, version, diagnostics| {
            tick_diagnostics(client.clone(), uri, version, diagnostics);
        }));
    }
    let state = ServerState {
        client: client.clone(),
        service,
        shutdown_received,
    };
    let mut router = Router::new(state);

    router
        .request::<async_lsp::lsp_types::request::Initialize, _>(|st, params: InitializeParams| {
            let service = Arc::clone(&st.service);
            async move {
                if let Some(root_uri) = params.root_uri {
                    service.initialize_workspace(&root_uri).await;
                }
                Ok(InitializeResult {
                    capabilities: server_capabilities(),
                    server_info: Some(ServerInfo {
                        name: "slangd-rs".to_string(),
                        version: Some(env!("CARGO_PKG_VERSION").to_string()),
                    }),
                })
            }
        })
        .notification::<async_lsp::lsp_types::notification::Initialized>(|_, _| ControlFlow::Continue(()))
        .request::<async_lsp::lsp_types::request::Shutdown, _>(|st, _| {
            st.shutdown_received.store(true, Ordering::SeqCst);
            async move { Ok(()) }
        })
        .notification::<async_lsp::lsp_types::notification::Exit>(|st, _| {
            let code = if st.shutdown_received.load(Ordering::SeqCst) { 0 } else { 1 };
            tracing::info!(target: "slangd::transport", code, "exiting");
            std::process::exit(code)
        })
        .notification::<async_lsp::lsp_types::notification::DidOpenTextDocument>(|st, params: DidOpenTextDocumentParams| {
            let service = Arc::clone(&st.service);
            let client = st.client.clone();
            tokio::spawn(async move {
                let uri = params.text_document.uri.clone();
                let version = params.text_document.version;
                let content = params.text_document.text;
                service.on_document_opened(uri.clone(), content.clone(), version).await;
                let diagnostics = service.compute_parse_diagnostics(&uri, content).await;
                tick_diagnostics(client, uri, version, diagnostics);
            });
            ControlFlow::Continue(())
        })
        .notification::<async_lsp::lsp_types::notification::DidChangeTextDocument>(|st, params: DidChangeTextDocumentParams| {
            let service = Arc::clone(&st.service);
            let client = st.client.clone();
            tokio::spawn(async move {
                let uri = params.text_document.uri.clone();
                let version = params.text_document.version;
                let Some(content) = params.content_changes.into_iter().next_back().map(|c| c.text) else {
                    return;
                };
                service.on_document_changed(uri.clone(), content.clone(), version).await;
                let diagnostics = service.compute_parse_diagnostics(&uri, content).await;
                tick_diagnostics(client, uri, version, diagnostics);
            });
            ControlFlow::Continue(())
        })
        .notification::<async_lsp::lsp_types::notification::DidSaveTextDocument>(|st, params: DidSaveTextDocumentParams| {
            let service = Arc::clone(&st.service);
            tokio::spawn(async move {
                let uri = params.text_document.uri;
                let content = params.text.unwrap_or_default();
                service.on_document_saved(uri, content).await;
            });
            ControlFlow::Continue(())
        })
        .notification::<async_lsp::lsp_types::notification::DidCloseTextDocument>(|st, params: DidCloseTextDocumentParams| {
            let service = Arc::clone(&st.service);
            tokio::spawn(async move {
                service.on_document_closed(params.text_document.uri).await;
            });
            ControlFlow::Continue(())
        })
        .notification::<async_lsp::lsp_types::notification::DidChangeWatchedFiles>(|st, params: DidChangeWatchedFilesParams| {
            let service = Arc::clone(&st.service);
            tokio::spawn(async move {
                for change in params.changes {
                    let kind = match change.typ {
                        FileChangeType::CREATED => FileChangeKind::Created,
                        FileChangeType::DELETED => FileChangeKind::Deleted,
                        _ => FileChangeKind::Changed,
                    };
                    if let Ok(path) = change.uri.to_file_path() {
                        let canonical = slangd_rs::core::CanonicalPath::from_path(&path);
                        if slangd_rs::core::project_layout_service::is_config_file(path.as_path()) {
                            service.handle_config_file_change(&canonical).await;
                            continue;
                        }
                    }
                    service.handle_source_file_change(kind).await;
                }
            });
            ControlFlow::Continue(())
        })
        .request::<async_lsp::lsp_types::request::DocumentSymbolRequest, _>(|st, params: DocumentSymbolParams| {
            let service = Arc::clone(&st.service);
            async move {
                let symbols = service.get_document_symbols(&params.text_document.uri).await;
                Ok(Some(DocumentSymbolResponse::Nested(symbols)))
            }
        })
        .request::<async_lsp::lsp_types::request::GotoDefinition, _>(|st, params: GotoDefinitionParams| {
            let service = Arc::clone(&st.service);
            async move {
                let locations = service
                    .get_definitions_for_position(
                        &params.text_document_position_params.text_document.uri,
                        params.text_document_position_params.position,
                    )
                    .await;
                Ok(match locations.len() {
                    0 => None,
                    1 => Some(GotoDefinitionResponse::Scalar(locations.into_iter().next().unwrap())),
                    _ => Some(GotoDefinitionResponse::Array(locations)),
                })
            }
        });

    ServiceBuilder::new()
        .layer(TracingLayer::default())
        .layer(LifecycleLayer::default())
        .layer(CatchUnwindLayer::default())
        .layer(ConcurrencyLayer::default())
        .service(router)
}

fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
        document_symbol_provider: Some(async_lsp::lsp_types::OneOf::Left(true)),
        definition_provider: Some(async_lsp::lsp_types::OneOf::Left(true)),
        ..Default::default()
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = Args::parse();
    logging::init(args.verbose);
    install_panic_hook();
    wait_for_gdb();

    let (mainloop, _client) = async_lsp::MainLoop::new_server(|client| build_service(client));

    let result = match args.pipe {
        Some(name) => run_on_pipe(mainloop, &name).await,
        None => {
            let stdin = tokio::io::stdin().compat();
            let stdout = tokio::io::stdout().compat_write();
            mainloop.run_buffered(stdin, stdout).await
        }
    };

    if let Err(err) = result {
        tracing::error!(target: "slangd::transport", %err, "main loop exited with error");
        std::process::exit(1);
    }
}

#[cfg(unix)]
async fn run_on_pipe(mainloop: async_lsp::MainLoop, name: &str) -> Result<(), async_lsp::Error> {
    let stream = tokio::net::UnixStream::connect(name)
        .await
        .unwrap_or_else(|err| panic!("failed to connect to pipe {name}: {err}"));
    let (read, write) = stream.into_split();
    mainloop.run_buffered(read.compat(), write.compat_write()).await
}

#[cfg(not(unix))]
async fn run_on_pipe(_mainloop: async_lsp::MainLoop, _name: &str) -> Result<(), async_lsp::Error> {
    panic!("named pipe transport is only supported on unix targets");
}
