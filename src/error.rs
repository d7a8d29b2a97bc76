//! Top-level error types for Chatter.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    /// A startup precondition failed. Nothing has been sent.
    #[error("startup check failed: {0}")]
    Startup(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Completion service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("provider returned {status}: {message}")]
    ProviderStatus { status: u16, message: String },

    #[error("empty response from provider")]
    EmptyResponse,

    #[error("completion failed: {0}")]
    CompletionFailed(String),
}

/// Chat platform errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessagingError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

impl LlmError {
    /// HTTP status attached to the failure, when the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::ProviderStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
