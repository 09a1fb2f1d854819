#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::RawQuery;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use loki_mcp::client::LokiClient;
use loki_mcp::config::LokiConfig;
use loki_mcp::tools::ToolRegistry;
use tokio::net::TcpListener;

/// What the fake Loki saw on its most recent request.
#[derive(Debug, Clone, Default)]
pub struct Seen {
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    hits: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<Seen>>>,
}

impl Recorder {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Seen {
        self.last.lock().unwrap().clone().expect("no request recorded")
    }

    fn record(&self, uri: &Uri, query: Option<String>, headers: &HeaderMap) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let headers = headers
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        *self.last.lock().unwrap() = Some(Seen {
            path: uri.path().to_string(),
            query: query.unwrap_or_default(),
            headers,
        });
    }
}

/// Fake Loki answering every path with `status`/`body` after `delay_ms`.
pub async fn spawn_loki(status: u16, body: &'static str, delay_ms: u64) -> (String, Recorder) {
    let recorder = Recorder::default();
    let rec = recorder.clone();
    let app = Router::new().fallback(
        move |uri: Uri, RawQuery(query): RawQuery, headers: HeaderMap| {
            let rec = rec.clone();
            async move {
                rec.record(&uri, query, &headers);
                if delay_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                }
                let status = StatusCode::from_u16(status).unwrap();
                (status, [("content-type", "application/json")], body).into_response()
            }
        },
    );
    let addr = serve(app).await;
    (format!("http://{addr}"), recorder)
}

pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn test_config(url: &str) -> LokiConfig {
    LokiConfig {
        url: url.to_string(),
        timeout_ms: 2_000,
        ..LokiConfig::default()
    }
}

pub fn registry(cfg: &LokiConfig) -> ToolRegistry {
    ToolRegistry::new(LokiClient::new(cfg).unwrap())
}

pub const THREE_ENTRIES: &str = r#"{
    "status": "success",
    "data": {
        "resultType": "streams",
        "result": [
            {
                "stream": {"app": "api", "level": "error"},
                "values": [
                    ["1704164647000000000", "GET /users 500"],
                    ["1704164646000000000", "GET /orders 500"]
                ]
            },
            {
                "stream": {"app": "api", "level": "info"},
                "values": [["1704164645000000000", "GET /health 200"]]
            }
        ],
        "stats": {}
    }
}"#;
