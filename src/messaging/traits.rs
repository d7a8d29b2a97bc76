//! Chat platform trait and dynamic dispatch companion.

use crate::error::Result;
use crate::{BotIdentity, ChatMessage, OutboundMessage};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`ChatPlatformDyn`] methods.
pub type PlatformFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Static trait for chat platform adapters.
/// Use this for type-safe implementations.
pub trait ChatPlatform: Send + Sync + 'static {
    /// Unique name for this adapter.
    fn name(&self) -> &str;

    /// Largest page the platform serves for a single history read.
    fn max_fetch_limit(&self) -> u32 {
        100
    }

    /// Resolve the identity behind the configured credential.
    fn identity(&self) -> impl Future<Output = Result<BotIdentity>> + Send;

    /// Most recent messages in the target channel, in the platform's native
    /// order (newest first). Not filtered.
    fn recent_messages(&self, limit: u32) -> impl Future<Output = Result<Vec<ChatMessage>>> + Send;

    /// Post a message to the target channel.
    fn post(&self, message: &OutboundMessage) -> impl Future<Output = Result<()>> + Send;
}

/// Dynamic trait for runtime polymorphism.
/// Use this when you need `Arc<dyn ChatPlatformDyn>` shared between the
/// history fetcher, the sender and the startup check.
pub trait ChatPlatformDyn: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn max_fetch_limit(&self) -> u32;

    fn identity<'a>(&'a self) -> PlatformFuture<'a, BotIdentity>;

    fn recent_messages<'a>(&'a self, limit: u32) -> PlatformFuture<'a, Vec<ChatMessage>>;

    fn post<'a>(&'a self, message: &'a OutboundMessage) -> PlatformFuture<'a, ()>;
}

/// Blanket implementation: any type implementing ChatPlatform automatically implements ChatPlatformDyn.
impl<T: ChatPlatform> ChatPlatformDyn for T {
    fn name(&self) -> &str {
        ChatPlatform::name(self)
    }

    fn max_fetch_limit(&self) -> u32 {
        ChatPlatform::max_fetch_limit(self)
    }

    fn identity<'a>(&'a self) -> PlatformFuture<'a, BotIdentity> {
        Box::pin(ChatPlatform::identity(self))
    }

    fn recent_messages<'a>(&'a self, limit: u32) -> PlatformFuture<'a, Vec<ChatMessage>> {
        Box::pin(ChatPlatform::recent_messages(self, limit))
    }

    fn post<'a>(&'a self, message: &'a OutboundMessage) -> PlatformFuture<'a, ()> {
        Box::pin(ChatPlatform::post(self, message))
    }
}
