//! Purpose: HTTP/JSONL server exposing the item operation stream.
//! Exports: `ServeConfig`, `serve`, `run`, `validate_config`.
//! Role: Transport shell around `api::dispatch`; axum-based, loopback-first.
//! Invariants: Every response line echoes its request's correlation id.
//! Invariants: Validation and storage failures answer per-request; anything
//! else emits one terminal `stream_error` line and abandons the stream.
//! Notes: Pagination and retries are client concerns; the server holds no
//! per-stream cursor state.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum::routing::{get, post};
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ItemRequest, StreamError, dispatch};
use crate::core::error::{Error, ErrorKind};
use crate::core::store::Store;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    pub max_line_bytes: usize,
}

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    max_line_bytes: usize,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    run(listener, config).await
}

/// Serves on an already-bound listener; split out so tests can bind to an
/// ephemeral port first.
pub async fn run(listener: tokio::net::TcpListener, config: ServeConfig) -> Result<(), Error> {
    init_tracing();

    let db_path = config.db_path.clone();
    let store = task::spawn_blocking(move || Store::open(db_path))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("store open task failed")
                .with_source(err)
        })??;
    let store = Arc::new(store);

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        max_line_bytes: config.max_line_bytes,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/statz", get(statz))
        .route("/v1/items", post(process_items))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "server listening");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = shutdown_rx.await;
    });
    let server = std::future::IntoFuture::into_future(server);
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            info!("shutdown requested, draining in-flight streams");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };

    match Arc::try_unwrap(store) {
        Ok(store) => store.close(),
        Err(_) => warn!("store still referenced at shutdown; releasing on drop"),
    }
    Ok(())
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if config.bind.port() == 0 && !is_loopback(config.bind.ip()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("ephemeral ports are only supported on loopback binds"));
    }

    if config.max_line_bytes == 0 {
        return Err(
            Error::new(ErrorKind::Usage).with_message("--max-line-bytes must be greater than zero")
        );
    }

    if config.db_path.exists() && !config.db_path.is_dir() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "database path {} exists and is not a directory",
                config.db_path.display()
            )));
    }

    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn statz(State(state): State<Arc<AppState>>) -> Response {
    let store = Arc::clone(&state.store);
    let (tables, statistics) =
        match task::spawn_blocking(move || (store.tables(), store.statistics())).await {
            Ok(stats) => stats,
            Err(err) => {
                error!(error = %err, "statistics task failed");
                return json_response(json!({ "tables": [], "statistics": null }));
            }
        };
    json_response(json!({ "tables": tables, "statistics": statistics }))
}

enum LineOutcome {
    Skip,
    Reply(Bytes),
    /// Terminal record; the stream ends and queued requests are abandoned.
    Fatal(Bytes),
}

/// Bidirectional item stream: JSONL requests in, JSONL responses out.
/// Requests on one stream are processed in order; correlation ids let
/// clients match responses when interleaving streams of their own.
async fn process_items(State(state): State<Arc<AppState>>, body: Body) -> Response {
    let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);

    tokio::spawn(async move {
        let mut stream = body.into_data_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(err)) => {
                    let line = stream_error_line("", "Io", &err.to_string());
                    let _ = tx.send(Ok(line)).await;
                    return;
                }
                None => break,
            };
            buffer.extend_from_slice(&chunk);

            // The cap bounds one request line, never the whole body: complete
            // lines are drained and checked individually, then the cap applies
            // to the unterminated remainder.
            while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
                if pos > state.max_line_bytes {
                    let line = stream_error_line("", "Usage", "request line exceeds size limit");
                    let _ = tx.send(Ok(line)).await;
                    return;
                }
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if !forward_line(&state, &tx, &line[..pos]).await {
                    return;
                }
            }

            if buffer.len() > state.max_line_bytes {
                let line = stream_error_line("", "Usage", "request line exceeds size limit");
                let _ = tx.send(Ok(line)).await;
                return;
            }
        }

        // A final request may arrive without a trailing newline.
        if !buffer.is_empty() {
            forward_line(&state, &tx, &buffer).await;
        }
    });

    let stream = ReceiverStream::new(rx);
    let mut response = Response::new(Body::from_stream(stream));
    response
        .headers_mut()
        .insert("content-type", HeaderValue::from_static("application/jsonl"));
    response
        .headers_mut()
        .insert("gravel-version", HeaderValue::from_static("1"));
    response
}

/// Processes one request line and forwards the outcome. Returns false when
/// the stream must terminate.
async fn forward_line(
    state: &AppState,
    tx: &mpsc::Sender<Result<Bytes, std::io::Error>>,
    line: &[u8],
) -> bool {
    match process_line(state, line).await {
        LineOutcome::Skip => true,
        LineOutcome::Reply(bytes) => tx.send(Ok(bytes)).await.is_ok(),
        LineOutcome::Fatal(bytes) => {
            let _ = tx.send(Ok(bytes)).await;
            false
        }
    }
}

async fn process_line(state: &AppState, line: &[u8]) -> LineOutcome {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return LineOutcome::Skip;
    }

    let request: ItemRequest = match serde_json::from_slice(trimmed) {
        Ok(request) => request,
        Err(err) => {
            // Undecodable input cannot be answered per-request; the stream
            // dies carrying whatever correlation id can be salvaged.
            let correlation_id = salvage_correlation_id(trimmed);
            error!(error = %err, "undecodable request line");
            return LineOutcome::Fatal(stream_error_line(
                &correlation_id,
                "RequestDecode",
                &err.to_string(),
            ));
        }
    };

    let correlation_id = request.correlation_id.clone();
    let store = Arc::clone(&state.store);
    let dispatched = task::spawn_blocking(move || dispatch(&store, &request)).await;

    match dispatched {
        Ok(Ok(response)) => match serde_json::to_vec(&response) {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                LineOutcome::Reply(Bytes::from(bytes))
            }
            Err(err) => {
                error!(error = %err, "failed to encode response");
                LineOutcome::Fatal(stream_error_line(
                    &correlation_id,
                    "Internal",
                    "failed to encode response",
                ))
            }
        },
        Ok(Err(err)) => {
            error!(error = %err, %correlation_id, "unexpected failure, aborting stream");
            LineOutcome::Fatal(stream_error_line(
                &correlation_id,
                err.kind().name(),
                &err.wire_message(),
            ))
        }
        Err(err) => {
            error!(error = %err, %correlation_id, "dispatch task failed");
            LineOutcome::Fatal(stream_error_line(
                &correlation_id,
                "Internal",
                "dispatch task failed",
            ))
        }
    }
}

fn salvage_correlation_id(line: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(line)
        .ok()
        .and_then(|value| {
            value
                .get("correlation_id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn stream_error_line(correlation_id: &str, error_type: &str, message: &str) -> Bytes {
    let record = StreamError {
        correlation_id: correlation_id.to_string(),
        error_type: error_type.to_string(),
        message: message.to_string(),
    };
    let mut bytes = serde_json::to_vec(&json!({ "stream_error": record }))
        .unwrap_or_else(|_| b"{\"stream_error\":{}}".to_vec());
    bytes.push(b'\n');
    Bytes::from(bytes)
}

fn json_response(payload: serde_json::Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert("gravel-version", HeaderValue::from_static("1"));
    response
}
