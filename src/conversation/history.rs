//! Channel history: fetch the latest messages and normalize them into a
//! chronological window.

use crate::ChatMessage;
use crate::error::Result;
use crate::messaging::traits::ChatPlatformDyn;
use std::sync::Arc;

/// The most recent channel messages, oldest first. Rebuilt every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryWindow {
    messages: Vec<ChatMessage>,
}

impl HistoryWindow {
    /// Build a window from messages already in chronological order.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Normalize a platform page (newest first): trim text, drop empty
    /// messages, and flip to oldest first.
    pub fn from_newest_first(messages: Vec<ChatMessage>) -> Self {
        let mut messages: Vec<ChatMessage> = messages
            .into_iter()
            .filter_map(|mut message| {
                let trimmed = message.text.trim();
                if trimmed.is_empty() {
                    return None;
                }
                if trimmed.len() != message.text.len() {
                    message.text = trimmed.to_string();
                }
                Some(message)
            })
            .collect();
        messages.reverse();
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The trailing `count` messages, still oldest first.
    pub fn last(&self, count: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }
}

/// Reads the target channel through the platform adapter.
pub struct HistoryFetcher {
    platform: Arc<dyn ChatPlatformDyn>,
    excluded_author_id: Option<String>,
}

impl HistoryFetcher {
    pub fn new(platform: Arc<dyn ChatPlatformDyn>) -> Self {
        Self {
            platform,
            excluded_author_id: None,
        }
    }

    /// Drop messages by this author id from every window (our own posts).
    pub fn exclude_author(&mut self, author_id: impl Into<String>) {
        self.excluded_author_id = Some(author_id.into());
    }

    /// Fetch up to `limit` recent messages. `limit` is clamped to what the
    /// platform serves. Errors are returned as-is; the caller decides to
    /// carry on with an empty window.
    pub async fn fetch(&self, limit: u32) -> Result<HistoryWindow> {
        let limit = limit.clamp(1, self.platform.max_fetch_limit().max(1));
        let mut page = self.platform.recent_messages(limit).await?;

        if let Some(excluded) = &self.excluded_author_id {
            page.retain(|message| message.author_id.as_deref() != Some(excluded.as_str()));
        }

        let window = HistoryWindow::from_newest_first(page);
        tracing::debug!(limit, fetched = window.len(), "channel history fetched");
        Ok(window)
    }
}
