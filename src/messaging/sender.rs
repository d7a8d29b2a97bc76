//! Outbound delivery of generated messages.

use crate::OutboundMessage;
use crate::error::Result;
use crate::messaging::traits::ChatPlatformDyn;
use std::sync::Arc;

/// What happened to a message handed to the [`Sender`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Posted,
    /// Dry-run mode: logged, not posted.
    Logged,
}

/// Posts generated text to the channel. One call, one post, no retries.
pub struct Sender {
    platform: Arc<dyn ChatPlatformDyn>,
    dry_run: bool,
}

impl Sender {
    pub fn new(platform: Arc<dyn ChatPlatformDyn>) -> Self {
        Self {
            platform,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Post `text`, as a reply to `reply_to` when given.
    pub async fn send(&self, text: &str, reply_to: Option<&str>) -> Result<Delivery> {
        let message = OutboundMessage {
            text: text.to_string(),
            reply_to: reply_to.map(str::to_string),
        };

        if self.dry_run {
            tracing::info!(
                text = %message.text,
                reply_to = message.reply_to.as_deref(),
                "dry run, not posting"
            );
            return Ok(Delivery::Logged);
        }

        self.platform.post(&message).await?;

        tracing::info!(
            adapter = self.platform.name(),
            text = %message.text,
            reply_to = message.reply_to.as_deref(),
            "message sent"
        );
        Ok(Delivery::Posted)
    }
}
