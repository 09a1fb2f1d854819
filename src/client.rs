use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::config::LokiConfig;
use crate::error::{LokiMcpError, Result};
use crate::params::{LabelNamesParams, LabelValuesParams, QueryParams, Scope};
use crate::timeparse::to_nanos_string;

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
const LABELS_PATH: &str = "/loki/api/v1/labels";
const MAX_ERROR_BODY: usize = 2048;
const ORG_HEADER: HeaderName = HeaderName::from_static("x-scope-orgid");

/// HTTP client for the Loki query and label APIs. One attempt per call.
#[derive(Debug, Clone)]
pub struct LokiClient {
    http: reqwest::Client,
    base_url: String,
    org_id: Option<String>,
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
    max_response_bytes: usize,
}

impl LokiClient {
    pub fn new(config: &LokiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout().min(Duration::from_secs(10)))
            .build()
            .map_err(|e| LokiMcpError::ConfigError(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim().trim_end_matches('/').to_string(),
            org_id: config.org_id.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            token: config.token.clone(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn query_range(&self, params: &QueryParams) -> Result<String> {
        let mut query: Vec<(&str, String)> = vec![
            ("query", params.query.clone()),
            ("limit", params.limit.to_string()),
            ("direction", params.direction.as_str().to_string()),
        ];
        push_range(&mut query, &params.scope);
        if let Some(since) = params.since {
            query.push(("since", format!("{}ms", since.as_millis())));
        }
        self.get(&params.scope, QUERY_RANGE_PATH, &query).await
    }

    pub async fn label_names(&self, params: &LabelNamesParams) -> Result<String> {
        let mut query = Vec::new();
        push_range(&mut query, &params.scope);
        self.get(&params.scope, LABELS_PATH, &query).await
    }

    pub async fn label_values(&self, params: &LabelValuesParams) -> Result<String> {
        let path = format!(
            "/loki/api/v1/label/{}/values",
            urlencoding::encode(&params.label)
        );
        let mut query = Vec::new();
        push_range(&mut query, &params.scope);
        self.get(&params.scope, &path, &query).await
    }

    fn headers(&self, scope: &Scope) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(org) = scope.org.as_ref().or(self.org_id.as_ref()) {
            let value = HeaderValue::from_str(org)
                .map_err(|_| LokiMcpError::validation("org", "contains characters not allowed in a header"))?;
            headers.insert(ORG_HEADER, value);
        }
        Ok(headers)
    }

    async fn get(&self, scope: &Scope, path: &str, query: &[(&str, String)]) -> Result<String> {
        let base = scope.url.as_deref().unwrap_or(&self.base_url);
        let url = format!("{base}{path}");
        debug!(%url, "loki request");

        let mut req = self.http.get(&url).headers(self.headers(scope)?).query(query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        } else if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_deref());
        }

        let mut resp = req.send().await.map_err(describe_reqwest_error)?;
        let status = resp.status();

        if !status.is_success() {
            // Only the head of an error body is kept, so the size cap does not apply.
            let mut head: Vec<u8> = Vec::new();
            while head.len() < MAX_ERROR_BODY {
                match resp.chunk().await {
                    Ok(Some(chunk)) => head.extend_from_slice(&chunk),
                    _ => break,
                }
            }
            let text = String::from_utf8_lossy(&head);
            return Err(LokiMcpError::Backend {
                status: status.as_u16(),
                body: truncate(text.trim(), MAX_ERROR_BODY),
            });
        }

        if let Some(len) = resp.content_length() {
            if len as usize > self.max_response_bytes {
                return Err(LokiMcpError::transport(format!(
                    "response of {len} bytes exceeds limit of {} bytes",
                    self.max_response_bytes
                )));
            }
        }

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(describe_reqwest_error)? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(LokiMcpError::transport(format!(
                    "response exceeds limit of {} bytes",
                    self.max_response_bytes
                )));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn push_range(query: &mut Vec<(&str, String)>, scope: &Scope) {
    if let Some(start) = &scope.start {
        query.push(("start", to_nanos_string(start)));
    }
    if let Some(end) = &scope.end {
        query.push(("end", to_nanos_string(end)));
    }
}

fn describe_reqwest_error(e: reqwest::Error) -> LokiMcpError {
    if e.is_timeout() {
        LokiMcpError::transport(format!("timed out: {e}"))
    } else if e.is_connect() {
        LokiMcpError::transport(format!("connection failed: {e}"))
    } else {
        LokiMcpError::transport(e)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
