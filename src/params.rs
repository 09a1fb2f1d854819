//! Turns raw tool-call arguments into validated, typed parameters.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::{LokiMcpError, Result};
use crate::schema::{DefaultValue, ParamKind, ParamSpec, ToolSchema};
use crate::timeparse::{parse_duration, parse_timestamp};

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
    Duration(Duration),
    Enum(String),
}

/// Parameters of one call, already coerced to the schema's types.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    values: HashMap<String, ParamValue>,
}

impl ParameterSet {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::String(s)) | Some(ParamValue::Enum(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        match self.values.get(name) {
            Some(ParamValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn duration(&self, name: &str) -> Option<Duration> {
        match self.values.get(name) {
            Some(ParamValue::Duration(d)) => Some(*d),
            _ => None,
        }
    }

    /// Fetches a field the schema marks as required.
    fn require_string(&self, name: &str) -> Result<String> {
        self.string(name)
            .map(str::to_string)
            .ok_or_else(|| LokiMcpError::validation(name, "missing required field"))
    }
}

pub fn validate(schema: &ToolSchema, raw: &Value) -> Result<ParameterSet> {
    validate_at(schema, raw, Utc::now())
}

/// Validation against a fixed clock, so relative timestamps are deterministic.
pub fn validate_at(schema: &ToolSchema, raw: &Value, now: DateTime<Utc>) -> Result<ParameterSet> {
    let empty = serde_json::Map::new();
    let obj = match raw {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(LokiMcpError::validation(
                "arguments",
                format!("expected an object, got {}", json_type(other)),
            ))
        }
    };

    let mut set = ParameterSet::default();
    for spec in &schema.params {
        let value = obj.get(spec.name).filter(|v| !v.is_null());
        match value {
            Some(v) => {
                let coerced = coerce(spec, v, now)?;
                set.values.insert(spec.name.to_string(), coerced);
            }
            None if spec.required => {
                return Err(LokiMcpError::validation(spec.name, "missing required field"));
            }
            None => {
                if let Some(default) = &spec.default {
                    set.values
                        .insert(spec.name.to_string(), default_value(spec, default));
                }
            }
        }
    }
    Ok(set)
}

fn default_value(spec: &ParamSpec, default: &DefaultValue) -> ParamValue {
    match (default, &spec.kind) {
        (DefaultValue::Integer(n), _) => ParamValue::Integer(*n),
        (DefaultValue::Str(s), ParamKind::Enum(_)) => ParamValue::Enum(s.to_string()),
        (DefaultValue::Str(s), _) => ParamValue::String(s.to_string()),
    }
}

fn coerce(spec: &ParamSpec, v: &Value, now: DateTime<Utc>) -> Result<ParamValue> {
    let field = spec.name;
    match &spec.kind {
        ParamKind::String => {
            let s = v.as_str().ok_or_else(|| {
                LokiMcpError::validation(field, format!("expected a string, got {}", json_type(v)))
            })?;
            if spec.required && s.trim().is_empty() {
                return Err(LokiMcpError::validation(field, "must not be empty"));
            }
            Ok(ParamValue::String(s.to_string()))
        }
        ParamKind::Integer { min, max } => {
            let n = match v {
                Value::Number(num) => num.as_i64().or_else(|| {
                    num.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                }),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            }
            .ok_or_else(|| {
                LokiMcpError::validation(field, format!("expected an integer, got {v}"))
            })?;
            if let Some(min) = min {
                if n < *min {
                    return Err(LokiMcpError::validation(field, format!("must be >= {min}")));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(LokiMcpError::validation(field, format!("must be <= {max}")));
                }
            }
            Ok(ParamValue::Integer(n))
        }
        ParamKind::Timestamp => {
            let parsed = match v {
                Value::String(s) => parse_timestamp(s, now),
                Value::Number(num) => match num.as_i64() {
                    Some(n) => crate::timeparse::from_epoch(n),
                    None => Err(format!("invalid epoch {num}")),
                },
                other => Err(format!("expected a timestamp, got {}", json_type(other))),
            };
            parsed
                .map(ParamValue::Timestamp)
                .map_err(|reason| LokiMcpError::validation(field, reason))
        }
        ParamKind::Duration => {
            let parsed = match v {
                Value::String(s) => parse_duration(s),
                Value::Number(num) => num
                    .as_u64()
                    .map(Duration::from_secs)
                    .ok_or_else(|| format!("invalid duration {num}")),
                other => Err(format!("expected a duration, got {}", json_type(other))),
            };
            parsed
                .map(ParamValue::Duration)
                .map_err(|reason| LokiMcpError::validation(field, reason))
        }
        ParamKind::Enum(allowed) => {
            let s = v
                .as_str()
                .map(|s| s.trim().to_ascii_lowercase())
                .ok_or_else(|| {
                    LokiMcpError::validation(field, format!("expected a string, got {}", json_type(v)))
                })?;
            if allowed.contains(&s.as_str()) {
                Ok(ParamValue::Enum(s))
            } else {
                Err(LokiMcpError::validation(
                    field,
                    format!("{s:?} is not one of: {}", allowed.join(", ")),
                ))
            }
        }
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── typed parameters ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Raw,
}

/// Tenant, endpoint and time window shared by all tools.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub org: Option<String>,
    pub url: Option<String>,
}

impl Scope {
    fn from_set(set: &ParameterSet) -> Result<Self> {
        let start = set.timestamp("start");
        let end = set.timestamp("end");
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(LokiMcpError::validation("end", "must not be before start"));
            }
        }
        let url = set.string("url").map(|u| u.trim().trim_end_matches('/').to_string());
        if let Some(u) = &url {
            if !(u.starts_with("http://") || u.starts_with("https://")) {
                return Err(LokiMcpError::validation("url", "must start with http:// or https://"));
            }
        }
        Ok(Self {
            start,
            end,
            org: set.string("org").map(str::to_string),
            url,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    pub query: String,
    pub limit: u32,
    pub since: Option<Duration>,
    pub direction: Direction,
    pub format: OutputFormat,
    pub scope: Scope,
}

impl TryFrom<&ParameterSet> for QueryParams {
    type Error = LokiMcpError;

    fn try_from(set: &ParameterSet) -> Result<Self> {
        let direction = match set.string("direction") {
            Some("forward") => Direction::Forward,
            _ => Direction::Backward,
        };
        let format = match set.string("format") {
            Some("json") => OutputFormat::Json,
            Some("raw") => OutputFormat::Raw,
            _ => OutputFormat::Text,
        };
        let limit = set.integer("limit").unwrap_or(crate::schema::DEFAULT_LIMIT);
        let limit = u32::try_from(limit)
            .ok()
            .filter(|l| (1..=crate::schema::MAX_LIMIT).contains(&i64::from(*l)))
            .ok_or_else(|| {
                LokiMcpError::validation(
                    "limit",
                    format!("must be between 1 and {}", crate::schema::MAX_LIMIT),
                )
            })?;
        Ok(Self {
            query: set.require_string("query")?,
            limit,
            since: set.duration("since"),
            direction,
            format,
            scope: Scope::from_set(set)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelNamesParams {
    pub scope: Scope,
}

impl TryFrom<&ParameterSet> for LabelNamesParams {
    type Error = LokiMcpError;

    fn try_from(set: &ParameterSet) -> Result<Self> {
        Ok(Self {
            scope: Scope::from_set(set)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelValuesParams {
    pub label: String,
    pub scope: Scope,
}

fn label_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("static regex"))
}

impl TryFrom<&ParameterSet> for LabelValuesParams {
    type Error = LokiMcpError;

    fn try_from(set: &ParameterSet) -> Result<Self> {
        let label = set.require_string("label")?.trim().to_string();
        if !label_name_re().is_match(&label) {
            return Err(LokiMcpError::validation(
                "label",
                format!("{label:?} is not a valid label name"),
            ));
        }
        Ok(Self {
            label,
            scope: Scope::from_set(set)?,
        })
    }
}
