//! Tool registry: binds tool names to their schema and handler, and runs the
//! validate → query → normalize pipeline for each call.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::LokiClient;
use crate::error::Result;
use crate::model::ToolResult;
use crate::normalize::{normalize_label_names, normalize_label_values, normalize_query};
use crate::params::{validate, LabelNamesParams, LabelValuesParams, ParameterSet, QueryParams};
use crate::schema::{label_names_schema, label_values_schema, query_schema, ToolSchema};

pub const QUERY_TOOL: &str = "loki_query";
pub const LABEL_NAMES_TOOL: &str = "loki_label_names";
pub const LABEL_VALUES_TOOL: &str = "loki_label_values";

/// Receives a parameter set that already satisfies the tool's schema.
pub type ToolHandler =
    Arc<dyn Fn(Arc<LokiClient>, ParameterSet) -> BoxFuture<'static, Result<ToolResult>> + Send + Sync>;

/// Wraps an async closure as a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Arc<LokiClient>, ParameterSet) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolResult>> + Send + 'static,
{
    Arc::new(move |client, set| f(client, set).boxed())
}

#[derive(Clone)]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: ToolSchema,
    handler: ToolHandler,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Tool {
    /// Entry for `tools/list`.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.schema.to_json_schema(),
        })
    }
}

#[derive(Debug)]
pub struct ToolRegistry {
    client: Arc<LokiClient>,
    tools: Vec<Tool>,
}

impl ToolRegistry {
    /// Registry with the Loki query and label tools.
    pub fn new(client: LokiClient) -> Self {
        let mut registry = Self::empty(client);
        registry.register(
            QUERY_TOOL,
            "Run a LogQL query against Loki over a time range and return matching log lines",
            query_schema(),
            handler(|client, set| async move {
                let params = QueryParams::try_from(&set)?;
                let body = client.query_range(&params).await?;
                normalize_query(&body, &params)
            }),
        );
        registry.register(
            LABEL_NAMES_TOOL,
            "List the label names known to Loki",
            label_names_schema(),
            handler(|client, set| async move {
                let params = LabelNamesParams::try_from(&set)?;
                let body = client.label_names(&params).await?;
                normalize_label_names(&body)
            }),
        );
        registry.register(
            LABEL_VALUES_TOOL,
            "List the values Loki has seen for a label",
            label_values_schema(),
            handler(|client, set| async move {
                let params = LabelValuesParams::try_from(&set)?;
                let body = client.label_values(&params).await?;
                normalize_label_values(&body, &params.label)
            }),
        );
        registry
    }

    pub fn empty(client: LokiClient) -> Self {
        Self {
            client: Arc::new(client),
            tools: Vec::new(),
        }
    }

    /// Registering a name twice replaces the earlier entry.
    pub fn register(
        &mut self,
        name: &'static str,
        description: &'static str,
        schema: ToolSchema,
        handler: ToolHandler,
    ) {
        let tool = Tool {
            name,
            description,
            schema,
            handler,
        };
        match self.tools.iter_mut().find(|t| t.name == name) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Never fails: every error becomes an error-flagged result.
    pub async fn dispatch(&self, name: &str, arguments: &Value) -> ToolResult {
        let started = Instant::now();
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "call to unknown tool");
            return ToolResult::error(format!("unknown tool: {name}"));
        };

        let outcome = match validate(&tool.schema, arguments) {
            Ok(set) => (tool.handler)(self.client.clone(), set).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                info!(tool = name, elapsed_ms, "tool call succeeded");
                result
            }
            Err(e) => {
                warn!(tool = name, elapsed_ms, kind = e.kind(), error = %e, "tool call failed");
                ToolResult::error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LokiConfig;

    fn registry() -> ToolRegistry {
        ToolRegistry::new(LokiClient::new(&LokiConfig::default()).unwrap())
    }

    #[test]
    fn registers_three_tools_in_order() {
        let names: Vec<_> = registry().tools().iter().map(|t| t.name).collect();
        assert_eq!(names, vec![QUERY_TOOL, LABEL_NAMES_TOOL, LABEL_VALUES_TOOL]);
    }

    #[test]
    fn descriptor_carries_input_schema() {
        let reg = registry();
        let d = reg.get(LABEL_VALUES_TOOL).unwrap().descriptor();
        assert_eq!(d["name"], LABEL_VALUES_TOOL);
        assert_eq!(d["inputSchema"]["required"], json!(["label"]));
    }

    #[test]
    fn re_registering_replaces() {
        let mut reg = registry();
        reg.register(
            QUERY_TOOL,
            "stub",
            ToolSchema::new(vec![]),
            handler(|_, _| async { Ok::<_, crate::error::LokiMcpError>(ToolResult::text("stub")) }),
        );
        assert_eq!(reg.tools().len(), 3);
        assert_eq!(reg.get(QUERY_TOOL).unwrap().description, "stub");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_result() {
        let res = registry().dispatch("loki_delete_everything", &json!({})).await;
        assert!(res.is_error);
        assert!(res.joined_text().contains("unknown tool"));
    }

    #[tokio::test]
    async fn validation_failure_is_error_result() {
        let res = registry().dispatch(LABEL_VALUES_TOOL, &json!({})).await;
        assert!(res.is_error);
        assert!(res.joined_text().contains("`label`"));
    }
}
