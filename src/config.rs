use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LokiMcpError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    #[default]
    Http,
    Stdio,
    Both,
}

impl ServerMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "stdio" => Some(Self::Stdio),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn serves_http(self) -> bool {
        matches!(self, Self::Http | Self::Both)
    }

    pub fn serves_stdio(self) -> bool {
        matches!(self, Self::Stdio | Self::Both)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub mode: ServerMode,
    pub http_addr: String,
    pub http_port: u16,
    /// Also mount the `/sse` + `/message` endpoints for older clients.
    pub legacy_sse: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: ServerMode::Http,
            http_addr: "0.0.0.0".to_string(),
            http_port: DEFAULT_PORT,
            legacy_sse: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LokiConfig {
    pub url: String,
    pub org_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub timeout_ms: u64,
    pub max_response_bytes: usize,
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_LOKI_URL.to_string(),
            org_id: None,
            username: None,
            password: None,
            token: None,
            timeout_ms: 30_000,
            max_response_bytes: 16 * 1024 * 1024,
        }
    }
}

impl LokiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub loki: LokiConfig,
}

impl Config {
    /// Reads a YAML or JSON config file; the format follows the extension.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LokiMcpError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let cfg: Config = if is_json {
            serde_json::from_str(&raw)
                .map_err(|e| LokiMcpError::ConfigError(format!("{}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|e| LokiMcpError::ConfigError(format!("{}: {e}", path.display())))?
        };
        Ok(cfg)
    }

    /// Loads the optional file, then layers process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::load_from_path(p)?,
            None => Self::default(),
        };
        cfg.apply_env_with(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.http_port = port
                .trim()
                .parse()
                .map_err(|_| LokiMcpError::ConfigError(format!("PORT is not a valid port: {port}")))?;
        }
        if let Some(host) = get("HOST") {
            self.server.http_addr = host;
        }
        if let Some(mode) = get("MCP_TRANSPORT") {
            self.server.mode = ServerMode::parse(&mode).ok_or_else(|| {
                LokiMcpError::ConfigError(format!("MCP_TRANSPORT must be http, stdio or both, got {mode}"))
            })?;
        }
        if let Some(url) = get("LOKI_URL") {
            self.loki.url = url;
        }
        if let Some(org) = get("LOKI_ORG_ID") {
            self.loki.org_id = Some(org);
        }
        if let Some(user) = get("LOKI_USERNAME") {
            self.loki.username = Some(user);
        }
        if let Some(pass) = get("LOKI_PASSWORD") {
            self.loki.password = Some(pass);
        }
        if let Some(token) = get("LOKI_TOKEN") {
            self.loki.token = Some(token);
        }
        if let Some(ms) = get("LOKI_TIMEOUT_MS") {
            self.loki.timeout_ms = ms.trim().parse().map_err(|_| {
                LokiMcpError::ConfigError(format!("LOKI_TIMEOUT_MS is not a number: {ms}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.loki.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LokiMcpError::ConfigError(format!(
                "loki.url must start with http:// or https://, got {url:?}"
            )));
        }
        if self.loki.timeout_ms == 0 {
            return Err(LokiMcpError::ConfigError("loki.timeout_ms must be > 0".into()));
        }
        if self.loki.max_response_bytes == 0 {
            return Err(LokiMcpError::ConfigError("loki.max_response_bytes must be > 0".into()));
        }
        Ok(())
    }
}
