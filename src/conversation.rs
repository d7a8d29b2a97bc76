//! Conversation context: channel history and prompt assembly.

pub mod history;
pub mod prompt;

pub use history::{HistoryFetcher, HistoryWindow};
pub use prompt::{GenerationRequest, PromptBuilder};
