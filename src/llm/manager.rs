//! LLM manager: HTTP client, credentials, and the model allow-list.

use crate::config::LlmConfig;
use crate::error::Result;
use anyhow::Context as _;
use std::time::Duration;

/// Owns the provider connection details shared by every completion call.
pub struct LlmManager {
    config: LlmConfig,
    /// HTTP client for making requests.
    http_client: reqwest::Client,
}

impl LlmManager {
    /// Create a new LLM manager with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Get the HTTP client.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub fn api_key(&self) -> &str {
        &self.config.api_key
    }

    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Whether `model` is on the configured allow-list.
    pub fn is_allowed_model(&self, model: &str) -> bool {
        self.config.models.iter().any(|allowed| allowed.trim() == model)
    }
}
