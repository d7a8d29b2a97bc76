//! Completion model trait and the OpenAI-compatible chat completions client.

use crate::error::LlmError;
use crate::llm::manager::LlmManager;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Longest response body echoed into an error.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A fully specified completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Anything that can turn a [`CompletionRequest`] into text.
pub trait CompletionModel: Send + Sync + 'static {
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;
}

/// Chat completions over HTTP, routed through the [`LlmManager`].
#[derive(Clone)]
pub struct ChatCompletionModel {
    llm_manager: Arc<LlmManager>,
}

impl ChatCompletionModel {
    pub fn new(llm_manager: Arc<LlmManager>) -> Self {
        Self { llm_manager }
    }
}

impl CompletionModel for ChatCompletionModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if !self.llm_manager.is_allowed_model(&request.model) {
            return Err(LlmError::UnknownModel(request.model.clone()));
        }

        let response = self
            .llm_manager
            .http_client()
            .post(self.llm_manager.chat_completions_url())
            .header(
                "authorization",
                format!("Bearer {}", self.llm_manager.api_key()),
            )
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::ProviderRequest(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::ProviderRequest(format!("failed to read response body: {e}")))?;

        let response_body: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|e| {
                LlmError::CompletionFailed(format!(
                    "response ({status}) is not valid JSON: {e}\nBody: {}",
                    truncate_body(&response_text)
                ))
            })?;

        if !status.is_success() {
            let message = response_body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(LlmError::ProviderStatus {
                status: status.as_u16(),
                message: message.to_string(),
            });
        }

        parse_chat_completion(&response_body)
    }
}

/// Pull `choices[0].message.content` out of a chat completions response.
pub fn parse_chat_completion(body: &serde_json::Value) -> Result<String, LlmError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| LlmError::CompletionFailed("response has no choices".into()))?;

    match choice["message"]["content"].as_str() {
        Some(content) => Ok(content.to_string()),
        None => Err(LlmError::EmptyResponse),
    }
}

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((byte_index, _)) => &body[..byte_index],
        None => body,
    }
}
