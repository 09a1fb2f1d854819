use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One block of a tool result.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(String),
    Structured(Value),
}

/// Uniform envelope returned for every tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text(text.into())],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text(message.into())],
            is_error: true,
        }
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.content.push(ContentBlock::Structured(value));
        self
    }

    /// All text blocks joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.as_str()),
                ContentBlock::Structured(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn structured(&self) -> Option<&Value> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Structured(v) => Some(v),
            ContentBlock::Text(_) => None,
        })
    }

    /// MCP `CallToolResult` shape. Structured blocks are also emitted as JSON
    /// text for clients that ignore `structuredContent`.
    pub fn to_mcp(&self) -> Value {
        let content: Vec<Value> = self
            .content
            .iter()
            .map(|b| match b {
                ContentBlock::Text(t) => json!({"type": "text", "text": t}),
                ContentBlock::Structured(v) => json!({
                    "type": "text",
                    "text": serde_json::to_string_pretty(v).unwrap_or_default(),
                }),
            })
            .collect();
        let mut out = json!({
            "content": content,
            "isError": self.is_error,
        });
        if let Some(v) = self.structured() {
            out["structuredContent"] = v.clone();
        }
        out
    }
}

// ── Loki payloads ──

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub data: Option<QueryData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType")]
    pub result_type: String,
    pub result: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamResult {
    #[serde(default)]
    pub stream: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesResult {
    #[serde(default)]
    pub metric: BTreeMap<String, String>,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
    #[serde(default)]
    pub value: Option<(f64, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub data: Option<Vec<String>>,
}

/// A single log line with the labels of its stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Nanosecond unix timestamp as sent by Loki.
    pub timestamp: String,
    #[serde(skip)]
    pub nanos: i64,
    pub labels: BTreeMap<String, String>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: f64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}
