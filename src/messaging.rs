//! Chat platform access: the adapter trait, the Discord adapter, and the sender.

pub mod discord;
pub mod sender;
pub mod traits;

pub use discord::DiscordAdapter;
pub use sender::{Delivery, Sender};
pub use traits::{ChatPlatform, ChatPlatformDyn};
