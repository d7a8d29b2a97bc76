//! Completion service access and per-attempt sampling.

pub mod manager;
pub mod model;
pub mod routing;

pub use manager::LlmManager;
pub use model::{ChatCompletionModel, CompletionModel, CompletionRequest};
pub use routing::{SamplingPlan, SamplingRanges, is_retriable};
