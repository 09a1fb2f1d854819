use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{LokiMcpError, Result};
use crate::mcp::{parse_message, process_request};
use crate::tools::ToolRegistry;

pub const MCP_PATH: &str = "/mcp";

type Sessions = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<Event>>>>;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    sessions: Sessions,
}

impl AppState {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Unregisters a legacy SSE session when its event stream is dropped.
struct SessionGuard {
    id: String,
    sessions: Sessions,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut s) = self.sessions.write() {
            s.remove(&self.id);
        }
        info!(session_id = %self.id, "legacy SSE session closed");
    }
}

async fn mcp_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let text = String::from_utf8_lossy(&body);
    let req = match parse_message(&text) {
        Ok(req) => req,
        Err(resp) => return (StatusCode::BAD_REQUEST, Json(resp)).into_response(),
    };
    match process_request(&state.registry, req).await {
        Some(resp) => (StatusCode::OK, Json(resp)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let session_id = Uuid::new_v4().to_string();

    let endpoint_url = format!("/message?session_id={session_id}");
    let _ = tx.send(Event::default().event("endpoint").data(endpoint_url));

    if let Ok(mut sessions) = state.sessions.write() {
        sessions.insert(session_id.clone(), tx);
    }
    info!(%session_id, "legacy SSE session opened");

    let guard = SessionGuard {
        id: session_id,
        sessions: state.sessions.clone(),
    };
    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _ = &guard;
        Ok::<_, axum::Error>(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Deserialize)]
struct MessageQuery {
    session_id: String,
}

async fn message_handler(
    State(state): State<AppState>,
    Query(q): Query<MessageQuery>,
    body: Bytes,
) -> StatusCode {
    let sender = state
        .sessions
        .read()
        .ok()
        .and_then(|s| s.get(&q.session_id).cloned());
    let Some(sender) = sender else {
        return StatusCode::NOT_FOUND;
    };

    let text = String::from_utf8_lossy(&body).into_owned();
    let registry = state.registry.clone();
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let resp = match parse_message(&text) {
            Ok(req) => process_request(&registry, req).await,
            Err(resp) => Some(resp),
        };
        let Some(resp) = resp else { return };
        if let Ok(json_str) = serde_json::to_string(&resp) {
            if sender.send(Event::default().event("message").data(json_str)).is_err() {
                warn!(session_id = %q.session_id, "legacy SSE client went away");
                if let Ok(mut s) = sessions.write() {
                    s.remove(&q.session_id);
                }
            }
        }
    });
    StatusCode::ACCEPTED
}

pub fn build_router(registry: Arc<ToolRegistry>, legacy_sse: bool) -> Router {
    let state = AppState::new(registry);
    let mut router = Router::new()
        .route(MCP_PATH, post(mcp_handler))
        .route("/healthz", get(health_handler));
    if legacy_sse {
        router = router
            .route("/sse", get(sse_handler))
            .route("/message", post(message_handler));
    }
    router.with_state(state)
}

/// Serves `router` on an already bound listener until `shutdown` fires.
pub async fn serve(listener: TcpListener, router: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(LokiMcpError::from)
}

pub async fn serve_http(
    config: &ServerConfig,
    registry: Arc<ToolRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let router = build_router(registry, config.legacy_sse);
    let addr = format!("{}:{}", config.http_addr, config.http_port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LokiMcpError::ConfigError(format!("bind {addr} failed: {e}")))?;
    info!("streamable HTTP endpoint: http://{addr}{MCP_PATH}");
    if config.legacy_sse {
        info!("legacy SSE endpoint: http://{addr}/sse");
    }
    serve(listener, router, shutdown).await?;
    info!("HTTP server stopped");
    Ok(())
}
