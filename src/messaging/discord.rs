//! Discord REST adapter.
//!
//! Talks to the v9 HTTP API directly: one channel, one credential, no
//! gateway connection. Every call is a single request with no retries.

use crate::config::DiscordConfig;
use crate::error::{MessagingError, Result};
use crate::messaging::traits::ChatPlatform;
use crate::{BotIdentity, ChatMessage, OutboundMessage};

use anyhow::Context as _;
use serde::Deserialize;
use std::time::Duration;

/// Discord serves at most 100 messages per history page.
pub const MAX_FETCH_LIMIT: u32 = 100;

/// Longest response body echoed into an error.
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Discord adapter state.
pub struct DiscordAdapter {
    http: reqwest::Client,
    api_base: String,
    channel_id: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    author: DiscordUser,
}

#[derive(Debug, Deserialize)]
struct DiscordUser {
    #[serde(default)]
    id: String,
    #[serde(default = "unknown_username")]
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

impl Default for DiscordUser {
    fn default() -> Self {
        Self {
            id: String::new(),
            username: unknown_username(),
            discriminator: None,
        }
    }
}

fn unknown_username() -> String {
    "someone".into()
}

impl From<DiscordMessage> for ChatMessage {
    fn from(message: DiscordMessage) -> Self {
        let author_id = (!message.author.id.is_empty()).then_some(message.author.id);
        ChatMessage {
            id: message.id,
            author: message.author.username,
            author_id,
            text: message.content,
        }
    }
}

impl DiscordAdapter {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .with_context(|| "failed to build HTTP client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            channel_id: config.channel_id.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn messages_path(&self) -> String {
        format!("channels/{}/messages", self.channel_id)
    }

    /// Send a prepared request and return the body of a successful response.
    async fn execute(&self, endpoint: &str, request: reqwest::RequestBuilder) -> Result<String> {
        let response = request
            .header("authorization", &self.token)
            .send()
            .await
            .map_err(|error| MessagingError::Transport {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| MessagingError::Transport {
            endpoint: endpoint.to_string(),
            message: format!("failed to read response body: {error}"),
        })?;

        if !status.is_success() {
            return Err(MessagingError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            }
            .into());
        }

        Ok(body)
    }

    fn decode<T: serde::de::DeserializeOwned>(endpoint: &str, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|error| {
            MessagingError::Decode {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
            .into()
        })
    }
}

impl ChatPlatform for DiscordAdapter {
    fn name(&self) -> &str {
        "discord"
    }

    fn max_fetch_limit(&self) -> u32 {
        MAX_FETCH_LIMIT
    }

    async fn identity(&self) -> Result<BotIdentity> {
        let endpoint = "users/@me";
        let body = self.execute(endpoint, self.http.get(self.url(endpoint))).await?;
        let user: DiscordUser = Self::decode(endpoint, &body)?;

        tracing::info!(
            username = %user.username,
            discriminator = user.discriminator.as_deref().unwrap_or("0"),
            user_id = %user.id,
            "discord credential verified"
        );

        Ok(BotIdentity {
            id: user.id,
            username: user.username,
        })
    }

    async fn recent_messages(&self, limit: u32) -> Result<Vec<ChatMessage>> {
        let endpoint = self.messages_path();
        let limit = limit.clamp(1, MAX_FETCH_LIMIT);
        let request = self.http.get(self.url(&endpoint)).query(&[("limit", limit)]);

        let body = self.execute(&endpoint, request).await?;
        let messages: Vec<DiscordMessage> = Self::decode(&endpoint, &body)?;

        Ok(messages.into_iter().map(ChatMessage::from).collect())
    }

    async fn post(&self, message: &OutboundMessage) -> Result<()> {
        let endpoint = self.messages_path();

        let mut payload = serde_json::json!({ "content": message.text });
        if let Some(reply_to) = &message.reply_to {
            payload["message_reference"] = serde_json::json!({ "message_id": reply_to });
        }

        let request = self.http.post(self.url(&endpoint)).json(&payload);
        self.execute(&endpoint, request).await?;
        Ok(())
    }
}

fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((byte_index, _)) => format!("{}...", &body[..byte_index]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_without_author_falls_back_to_placeholder() {
        let raw = r#"[{"id": "1", "content": "hi"}]"#;
        let parsed: Vec<DiscordMessage> = serde_json::from_str(raw).unwrap();
        let message = ChatMessage::from(parsed.into_iter().next().unwrap());

        assert_eq!(message.author, "someone");
        assert_eq!(message.author_id, None);
        assert_eq!(message.text, "hi");
    }

    #[test]
    fn message_without_content_decodes_as_empty_text() {
        let raw = r#"[{"id": "9", "author": {"id": "42", "username": "alice"}, "embeds": []}]"#;
        let parsed: Vec<DiscordMessage> = serde_json::from_str(raw).unwrap();
        let message = ChatMessage::from(parsed.into_iter().next().unwrap());

        assert_eq!(message.text, "");
        assert_eq!(message.author, "alice");
        assert_eq!(message.author_id.as_deref(), Some("42"));
    }

    #[test]
    fn long_error_bodies_are_cut() {
        let body = "x".repeat(1000);
        let truncated = truncate_body(&body);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn api_base_trailing_slash_is_ignored() {
        let adapter = DiscordAdapter::new(&DiscordConfig {
            api_base: "https://example.test/api/v9/".into(),
            channel_id: "55".into(),
            token: "t".into(),
        })
        .unwrap();

        assert_eq!(
            adapter.url(&adapter.messages_path()),
            "https://example.test/api/v9/channels/55/messages"
        );
    }
}
