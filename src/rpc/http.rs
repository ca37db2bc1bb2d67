//! HTTP/SSE transport: `POST /mcp`, `GET /mcp` (SSE), `OPTIONS
//! /mcp`, `GET /health`, origin-whitelisted CORS, session tracking, and
//! phased graceful shutdown.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_core::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::pipeline::resource_manager::CancellationSignal;

use super::{dispatch, parse_request, RpcState};

const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2024-10-07", "2024-06-25"];

struct Session {
    last_seen: Instant,
}

struct HttpState {
    rpc: Arc<RpcState>,
    sessions: Mutex<HashMap<String, Session>>,
    session_idle: Duration,
    shutting_down: Arc<AtomicBool>,
    in_flight: Arc<std::sync::atomic::AtomicUsize>,
}

#[derive(Clone)]
struct AppState(Arc<HttpState>);

pub async fn run(rpc: Arc<RpcState>, config: ServerConfig, cancellation: CancellationSignal) -> anyhow::Result<()> {
    let shutting_down = Arc::new(AtomicBool::new(false));
    let state = AppState(Arc::new(HttpState {
        rpc,
        sessions: Mutex::new(HashMap::new()),
        session_idle: Duration::from_secs(config.session_idle_secs),
        shutting_down: shutting_down.clone(),
        in_flight: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
    }));

    let app = Router::new()
        .route("/mcp", post(handle_post).get(handle_sse).options(handle_options))
        .route("/health", get(handle_health))
        .with_state(state);

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "http transport listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation, shutting_down, config.drain_timeout_secs, config.max_shutdown_timeout_secs))
        .await?;

    Ok(())
}

async fn shutdown_signal(cancellation: CancellationSignal, shutting_down: Arc<AtomicBool>, drain_timeout_secs: u64, max_shutdown_timeout_secs: u64) {
    cancellation.cancelled().await;
    shutting_down.store(true, Ordering::SeqCst);
    tracing::info!("shutdown signal received, refusing new connections and draining in-flight requests");

    tokio::time::sleep(Duration::from_secs(drain_timeout_secs)).await;
    tokio::time::sleep(Duration::from_secs(max_shutdown_timeout_secs.saturating_sub(drain_timeout_secs))).await;
}

fn origin_allowed(headers: &HeaderMap) -> bool {
    let Some(origin) = headers.get(axum::http::header::ORIGIN) else {
        return true;
    };
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    ["http://localhost", "https://localhost", "http://127.0.0.1", "https://127.0.0.1"]
        .iter()
        .any(|prefix| origin.starts_with(prefix))
}

fn cors_headers(origin: Option<&HeaderValue>) -> [(axum::http::HeaderName, HeaderValue); 3] {
    let allow_origin = origin.cloned().unwrap_or_else(|| HeaderValue::from_static("*"));
    [
        (axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin),
        (axum::http::header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS")),
        (axum::http::header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("content-type, mcp-session-id, mcp-protocol-version")),
    ]
}

fn validate_protocol_version(headers: &HeaderMap) {
    if let Some(version) = headers.get("mcp-protocol-version").and_then(|v| v.to_str().ok()) {
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
            tracing::warn!(version, "unrecognized mcp-protocol-version header, accepting anyway");
        }
    }
}

fn session_id_of(headers: &HeaderMap) -> String {
    headers
        .get("mcp-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn touch_session(state: &AppState, session_id: &str) {
    let mut sessions = state.0.sessions.lock().expect("session map poisoned");
    sessions.retain(|_, s| s.last_seen.elapsed() < state.0.session_idle);
    sessions.insert(session_id.to_string(), Session { last_seen: Instant::now() });
}

async fn handle_options(headers: HeaderMap) -> Response {
    if !origin_allowed(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let origin = headers.get(axum::http::header::ORIGIN);
    (StatusCode::OK, cors_headers(origin)).into_response()
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "healthy", "transport": "http", "protocol": "mcp" }))
}

async fn handle_post(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !origin_allowed(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    if state.0.shutting_down.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    validate_protocol_version(&headers);

    let session_id = session_id_of(&headers);
    touch_session(&state, &session_id);
    state.0.in_flight.fetch_add(1, Ordering::SeqCst);

    let raw = String::from_utf8_lossy(&body);
    let response = match parse_request(&raw) {
        Ok(request) => dispatch(&state.0.rpc, request).await,
        Err(error_response) => Some(error_response),
    };
    state.0.in_flight.fetch_sub(1, Ordering::SeqCst);

    let origin = headers.get(axum::http::header::ORIGIN);
    let mut response_headers = cors_headers(origin).to_vec();
    response_headers.push((axum::http::HeaderName::from_static("mcp-session-id"), HeaderValue::from_str(&session_id).unwrap_or(HeaderValue::from_static(""))));

    match response {
        Some(body) => (StatusCode::OK, response_headers, Json(body)).into_response(),
        // A notification (no id) yields no JSON-RPC response body.
        None => (StatusCode::NO_CONTENT, response_headers).into_response(),
    }
}

async fn handle_sse(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !origin_allowed(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let session_id = session_id_of(&headers);
    touch_session(&state, &session_id);

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(16);
    let heartbeat_session = session_id.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            let payload = json!({ "type": "heartbeat", "timestamp": chrono_now_rfc3339() });
            if tx.send(Ok(Event::default().event("heartbeat").data(payload.to_string()))).await.is_err() {
                tracing::debug!(session_id = %heartbeat_session, "sse client disconnected");
                break;
            }
        }
    });

    let stream: Box<dyn Stream<Item = Result<Event, Infallible>> + Send> = Box::new(ReceiverStream::new(rx));
    Sse::new(stream).into_response()
}

fn chrono_now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_origins_are_allowed() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, HeaderValue::from_static("http://localhost:5173"));
        assert!(origin_allowed(&headers));
    }

    #[test]
    fn absent_origin_is_allowed() {
        let headers = HeaderMap::new();
        assert!(origin_allowed(&headers));
    }

    #[test]
    fn other_origins_are_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::ORIGIN, HeaderValue::from_static("http://evil.example"));
        assert!(!origin_allowed(&headers));
    }
}
