mod common;

use std::sync::Arc;

use common::{registry, spawn_loki, test_config, THREE_ENTRIES};
use loki_mcp::http::{build_router, serve, MCP_PATH};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn start_server(loki_url: &str) -> (String, CancellationToken) {
    let reg = Arc::new(registry(&test_config(loki_url)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    tokio::spawn(serve(listener, build_router(reg, false), token.clone()));
    (format!("http://{addr}{MCP_PATH}"), token)
}

async fn rpc(endpoint: &str, body: Value) -> Value {
    reqwest::Client::new()
        .post(endpoint)
        .header("accept", "application/json, text/event-stream")
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_session_over_streamable_http() {
    let (loki_url, rec) = spawn_loki(200, THREE_ENTRIES, 0).await;
    let (endpoint, token) = start_server(&loki_url).await;

    let init = rpc(
        &endpoint,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {"protocolVersion": "2025-03-26", "capabilities": {},
                "clientInfo": {"name": "test", "version": "0"}}}),
    )
    .await;
    assert_eq!(init["result"]["protocolVersion"], "2025-03-26");
    assert!(init["result"]["capabilities"]["tools"].is_object());

    let list = rpc(&endpoint, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();
    assert_eq!(names, vec!["loki_query", "loki_label_names", "loki_label_values"]);

    let call = rpc(
        &endpoint,
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "loki_query", "arguments": {"query": "{app=\"api\"}", "limit": 50}}}),
    )
    .await;
    let result = &call["result"];
    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().unwrap();
    assert_eq!(text.lines().count(), 4);
    assert_eq!(result["structuredContent"]["count"], 3);
    assert_eq!(rec.hits(), 1);

    token.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backend_failure_stays_inside_envelope() {
    let (loki_url, _rec) = spawn_loki(500, "internal error", 0).await;
    let (endpoint, token) = start_server(&loki_url).await;

    let call = rpc(
        &endpoint,
        json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call",
            "params": {"name": "loki_label_names", "arguments": {}}}),
    )
    .await;

    assert!(call.get("error").is_none());
    assert_eq!(call["id"], 9);
    assert_eq!(call["result"]["isError"], true);
    assert!(call["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("HTTP 500"));

    token.cancel();
}

/// Reads SSE chunks until an event named `name` arrives and returns its data.
async fn next_event(resp: &mut reqwest::Response, buf: &mut String, name: &str) -> String {
    loop {
        while let Some(end) = buf.find("\n\n") {
            let block: String = buf.drain(..end + 2).collect();
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(v) = line.strip_prefix("event:") {
                    event = Some(v.trim_start().to_string());
                } else if let Some(v) = line.strip_prefix("data:") {
                    data.push(v.trim_start().to_string());
                }
            }
            if event.as_deref() == Some(name) {
                return data.join("\n");
            }
        }
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), resp.chunk())
            .await
            .expect("timed out waiting for SSE event")
            .unwrap()
            .expect("SSE stream ended");
        buf.push_str(&String::from_utf8_lossy(&chunk));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_legacy_sse_round_trip() {
    let (loki_url, _rec) = spawn_loki(200, THREE_ENTRIES, 0).await;
    let reg = Arc::new(registry(&test_config(&loki_url)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let token = CancellationToken::new();
    tokio::spawn(serve(listener, build_router(reg, true), token.clone()));

    let client = reqwest::Client::new();
    let mut events = client.get(format!("http://{addr}/sse")).send().await.unwrap();
    assert_eq!(events.status(), 200);
    let mut buf = String::new();

    let endpoint = next_event(&mut events, &mut buf, "endpoint").await;
    assert!(endpoint.starts_with("/message?session_id="), "{endpoint}");

    let posted = client
        .post(format!("http://{addr}{endpoint}"))
        .json(&json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 202);

    let message: Value = serde_json::from_str(&next_event(&mut events, &mut buf, "message").await).unwrap();
    assert_eq!(message["id"], 7);
    assert_eq!(message["result"], json!({}));

    let posted = client
        .post(format!("http://{addr}{endpoint}"))
        .json(&json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call",
            "params": {"name": "loki_query", "arguments": {"query": "{app=\"api\"}"}}}))
        .send()
        .await
        .unwrap();
    assert_eq!(posted.status(), 202);
    let message: Value = serde_json::from_str(&next_event(&mut events, &mut buf, "message").await).unwrap();
    assert_eq!(message["id"], 8);
    assert_eq!(message["result"]["structuredContent"]["count"], 3);

    token.cancel();
}
