//! Declarative parameter schemas for the exposed tools.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer { min: Option<i64>, max: Option<i64> },
    /// Absolute or relative point in time, see [`crate::timeparse`].
    Timestamp,
    Duration,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Integer(i64),
    Str(&'static str),
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub description: &'static str,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            description,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            description,
        }
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    fn json_schema(&self) -> Value {
        let mut prop = Map::new();
        match &self.kind {
            ParamKind::String => {
                prop.insert("type".into(), json!("string"));
            }
            ParamKind::Integer { min, max } => {
                prop.insert("type".into(), json!("integer"));
                if let Some(min) = min {
                    prop.insert("minimum".into(), json!(min));
                }
                if let Some(max) = max {
                    prop.insert("maximum".into(), json!(max));
                }
            }
            ParamKind::Timestamp | ParamKind::Duration => {
                prop.insert("type".into(), json!("string"));
            }
            ParamKind::Enum(values) => {
                prop.insert("type".into(), json!("string"));
                prop.insert("enum".into(), json!(values));
            }
        }
        prop.insert("description".into(), json!(self.description));
        match &self.default {
            Some(DefaultValue::Integer(n)) => {
                prop.insert("default".into(), json!(n));
            }
            Some(DefaultValue::Str(s)) => {
                prop.insert("default".into(), json!(s));
            }
            None => {}
        }
        Value::Object(prop)
    }
}

#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// JSON Schema object advertised as the tool's `inputSchema`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            properties.insert(p.name.to_string(), p.json_schema());
            if p.required {
                required.push(p.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

pub const DIRECTIONS: &[&str] = &["forward", "backward"];
pub const FORMATS: &[&str] = &["text", "json", "raw"];

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 5000;

fn common_params() -> Vec<ParamSpec> {
    vec![
        ParamSpec::optional(
            "start",
            ParamKind::Timestamp,
            "Start of the time range: RFC3339, unix epoch, `now` or relative like `-1h`",
        ),
        ParamSpec::optional(
            "end",
            ParamKind::Timestamp,
            "End of the time range: RFC3339, unix epoch, `now` or relative like `-5m`",
        ),
        ParamSpec::optional("org", ParamKind::String, "Tenant sent as X-Scope-OrgID"),
        ParamSpec::optional("url", ParamKind::String, "Loki base URL overriding the server default"),
    ]
}

pub fn query_schema() -> ToolSchema {
    let mut params = vec![
        ParamSpec::required("query", ParamKind::String, "LogQL query, e.g. {app=\"api\"} |= \"error\""),
        ParamSpec::optional(
            "limit",
            ParamKind::Integer {
                min: Some(1),
                max: Some(MAX_LIMIT),
            },
            "Maximum number of entries to return",
        )
        .with_default(DefaultValue::Integer(DEFAULT_LIMIT)),
    ];
    params.extend(common_params());
    params.push(ParamSpec::optional(
        "since",
        ParamKind::Duration,
        "Look back this far from `end` when `start` is omitted, e.g. 15m",
    ));
    params.push(
        ParamSpec::optional("direction", ParamKind::Enum(DIRECTIONS), "Sort order of entries")
            .with_default(DefaultValue::Str("backward")),
    );
    params.push(
        ParamSpec::optional(
            "format",
            ParamKind::Enum(FORMATS),
            "Output format: text lines, structured json, or the raw Loki body",
        )
        .with_default(DefaultValue::Str("text")),
    );
    ToolSchema::new(params)
}

pub fn label_names_schema() -> ToolSchema {
    ToolSchema::new(common_params())
}

pub fn label_values_schema() -> ToolSchema {
    let mut params = vec![ParamSpec::required(
        "label",
        ParamKind::String,
        "Label name whose values to list, e.g. app",
    )];
    params.extend(common_params());
    ToolSchema::new(params)
}
