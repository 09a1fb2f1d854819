use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Result;
use crate::tools::ToolRegistry;

pub const SERVER_NAME: &str = "loki-mcp";
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications. An explicit `null` is kept as `Some(Value::Null)`.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn present_id<'de, D: Deserializer<'de>>(de: D) -> std::result::Result<Option<Value>, D::Error> {
    Value::deserialize(de).map(Some)
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn parse_error(e: impl std::fmt::Display) -> Self {
        Self::error(Value::Null, PARSE_ERROR, format!("parse error: {e}"))
    }
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Handles one JSON-RPC message. Notifications produce no response.
pub async fn process_request(registry: &ToolRegistry, req: RpcRequest) -> Option<RpcResponse> {
    debug!(method = %req.method, "rpc request");
    if req.is_notification() {
        return None;
    }
    let id = req.id.clone().unwrap_or(Value::Null);

    if req.jsonrpc.as_deref() != Some("2.0") {
        return Some(RpcResponse::error(id, INVALID_REQUEST, "jsonrpc must be \"2.0\""));
    }

    let resp = match req.method.as_str() {
        "initialize" => RpcResponse::ok(id, initialize_result(&req.params)),
        "ping" => RpcResponse::ok(id, json!({})),
        "tools/list" => {
            let tools: Vec<Value> = registry.tools().iter().map(|t| t.descriptor()).collect();
            RpcResponse::ok(id, json!({ "tools": tools }))
        }
        "tools/call" => match serde_json::from_value::<CallToolParams>(req.params) {
            Ok(p) => {
                let result = registry.dispatch(&p.name, &p.arguments).await;
                RpcResponse::ok(id, result.to_mcp())
            }
            Err(e) => RpcResponse::error(id, INVALID_PARAMS, format!("invalid params: {e}")),
        },
        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("method not found: {other}")),
    };
    Some(resp)
}

fn initialize_result(params: &Value) -> Value {
    let requested = params.get("protocolVersion").and_then(Value::as_str);
    let version = requested
        .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);
    json!({
        "protocolVersion": version,
        "capabilities": {
            "tools": { "listChanged": false }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Query Grafana Loki. Use loki_label_names and loki_label_values to discover \
                         stream selectors, then loki_query with a LogQL expression."
    })
}

/// Parses one line of input; malformed input yields a ready-made error response.
pub fn parse_message(line: &str) -> std::result::Result<RpcRequest, RpcResponse> {
    serde_json::from_str(line).map_err(RpcResponse::parse_error)
}

/// Newline-delimited JSON-RPC over stdin/stdout.
pub async fn run_stdio(registry: Arc<ToolRegistry>, shutdown: CancellationToken) -> Result<()> {
    info!("serving MCP over stdio");
    serve_lines(
        registry,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown,
    )
    .await
}

/// Line loop behind [`run_stdio`], generic over the streams for testing.
pub async fn serve_lines<R, W>(
    registry: Arc<ToolRegistry>,
    reader: R,
    mut writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = reader;
    let mut buf: Vec<u8> = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read?,
        };
        if read == 0 {
            break;
        }
        // Invalid UTF-8 becomes a parse error for that line, not the end of the session.
        let line = String::from_utf8_lossy(&buf);
        if line.trim().is_empty() {
            continue;
        }

        let resp = match parse_message(&line) {
            Ok(req) => process_request(&registry, req).await,
            Err(resp) => Some(resp),
        };
        if let Some(resp) = resp {
            write_response(&mut writer, &resp).await?;
        }
    }
    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
