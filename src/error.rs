use thiserror::Error;

pub type Result<T> = std::result::Result<T, LokiMcpError>;

#[derive(Debug, Error)]
pub enum LokiMcpError {
    #[error("invalid parameter `{field}`: {reason}")]
    Validation { field: String, reason: String },

    #[error("loki returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("request to loki failed: {cause}")]
    Transport { cause: String },

    #[error("unexpected loki response: {0}")]
    Normalization(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LokiMcpError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            cause: cause.to_string(),
        }
    }

    /// Short machine-readable tag, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Backend { .. } => "backend",
            Self::Transport { .. } => "transport",
            Self::Normalization(_) => "normalization",
            Self::ConfigError(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
