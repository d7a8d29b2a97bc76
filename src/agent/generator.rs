//! Message generation: the retry loop around the completion call, the
//! anti-repetition gate, and length limits.

use crate::MessageId;
use crate::agent::mention::resolve_reply_target;
use crate::config::{Config, GenerationConfig};
use crate::conversation::history::HistoryWindow;
use crate::conversation::prompt::PromptBuilder;
use crate::error::LlmError;
use crate::llm::model::{CompletionModel, CompletionRequest};
use crate::llm::routing::{SamplingRanges, is_retriable};
use rand::Rng;
use std::collections::HashSet;

/// Appended to messages cut at the length cap.
pub const TRUNCATION_MARKER: &str = "...";

/// A message ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    pub reply_target: Option<MessageId>,
}

/// Why a single attempt did not produce an acceptable message.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Service(#[from] LlmError),

    #[error("completion was empty")]
    Empty,

    #[error("completion too similar to a recent message (similarity {score:.2})")]
    TooSimilar { score: f64 },
}

/// Every attempt of a cycle was used up.
#[derive(Debug, thiserror::Error)]
#[error("no message after {attempts} attempt(s): {last_reason}")]
pub struct GenerationFailure {
    pub attempts: u32,
    pub last_reason: AttemptError,
}

/// Bounded FIFO of our own recently sent texts.
#[derive(Debug, Clone)]
pub struct RecentOutputLog {
    entries: Vec<String>,
    capacity: usize,
}

impl RecentOutputLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record `text`, returning the evicted oldest entry if the log was full.
    pub fn push(&mut self, text: impl Into<String>) -> Option<String> {
        self.entries.push(text.into());
        (self.entries.len() > self.capacity).then(|| self.entries.remove(0))
    }

    /// Entries, oldest first.
    pub fn as_slice(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest similarity between `candidate` and any logged entry.
    pub fn max_similarity(&self, candidate: &str) -> f64 {
        self.entries
            .iter()
            .map(|entry| jaccard_similarity(candidate, entry))
            .fold(0.0, f64::max)
    }
}

/// Word-set Jaccard similarity. Case-insensitive, whitespace-tokenized.
/// Zero when either side has no words.
pub fn jaccard_similarity(left: &str, right: &str) -> f64 {
    let left_lower = left.to_lowercase();
    let right_lower = right.to_lowercase();
    let left: HashSet<&str> = left_lower.split_whitespace().collect();
    let right: HashSet<&str> = right_lower.split_whitespace().collect();

    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let intersection = left.intersection(&right).count();
    let union = left.union(&right).count();
    intersection as f64 / union as f64
}

/// Remove one layer of matching double or single quotes wrapping the whole text.
pub fn strip_enclosing_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Cap `text` at `max_chars` characters. A cut message ends with
/// [`TRUNCATION_MARKER`] and is exactly `max_chars` long.
pub fn truncate_message(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = text.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Produces one message per cycle and remembers what it already said.
pub struct Generator<M> {
    model: M,
    prompt_builder: PromptBuilder,
    sampling: SamplingRanges,
    settings: GenerationConfig,
    recent_outputs: RecentOutputLog,
}

impl<M: CompletionModel> Generator<M> {
    pub fn new(
        model: M,
        prompt_builder: PromptBuilder,
        sampling: SamplingRanges,
        settings: GenerationConfig,
    ) -> Self {
        Self {
            model,
            prompt_builder,
            sampling,
            recent_outputs: RecentOutputLog::new(settings.recent_output_capacity),
            settings,
        }
    }

    /// Wire a generator from the loaded configuration.
    pub fn from_config(model: M, config: &Config) -> Self {
        let prompt_builder = PromptBuilder::new(
            config.persona.system_prompt.clone(),
            config.persona.quiet_topics.clone(),
            config.generation.context_messages,
            config.generation.avoid_repeat_count,
        );
        Self::new(
            model,
            prompt_builder,
            SamplingRanges::from_config(&config.llm),
            config.generation,
        )
    }

    pub fn recent_outputs(&self) -> &RecentOutputLog {
        &self.recent_outputs
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Generate a message for the current `history`.
    ///
    /// Service errors, empty completions and repeats each use up one
    /// attempt. Only service errors wait `retry_delay` before the next one.
    pub async fn generate<R: Rng + ?Sized>(
        &mut self,
        history: &HistoryWindow,
        rng: &mut R,
    ) -> Result<GenerationResult, GenerationFailure> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_reason = AttemptError::Empty;

        for attempt in 1..=max_attempts {
            let request = self
                .prompt_builder
                .build(history, self.recent_outputs.as_slice(), rng);
            let Some(plan) = self.sampling.draw(rng) else {
                return Err(GenerationFailure {
                    attempts: attempt,
                    last_reason: LlmError::CompletionFailed("no models configured".into()).into(),
                });
            };

            let completion = CompletionRequest {
                model: plan.model,
                messages: request.to_messages(),
                temperature: plan.temperature,
                max_tokens: plan.max_tokens,
            };

            tracing::debug!(
                attempt,
                model = %completion.model,
                temperature = completion.temperature,
                max_tokens = completion.max_tokens,
                "requesting completion"
            );

            let raw = match self.model.complete(&completion).await {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        model = %completion.model,
                        retriable = is_retriable(&error),
                        %error,
                        "completion failed"
                    );
                    last_reason = AttemptError::Service(error);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.settings.retry_delay()).await;
                    }
                    continue;
                }
            };

            match self.accept(&raw, history) {
                Ok(result) => return Ok(result),
                Err(reason) => {
                    tracing::info!(
                        attempt,
                        max_attempts,
                        %reason,
                        "completion rejected, regenerating"
                    );
                    last_reason = reason;
                }
            }
        }

        tracing::warn!(attempts = max_attempts, reason = %last_reason, "giving up on this cycle");
        Err(GenerationFailure {
            attempts: max_attempts,
            last_reason,
        })
    }

    /// Clean up a raw completion and run it through the acceptance gate.
    /// Records the text in the output log on success.
    fn accept(
        &mut self,
        raw: &str,
        history: &HistoryWindow,
    ) -> Result<GenerationResult, AttemptError> {
        let candidate = strip_enclosing_quotes(raw.trim()).trim();
        if candidate.is_empty() {
            return Err(AttemptError::Empty);
        }

        let score = self.recent_outputs.max_similarity(candidate);
        if score > self.settings.similarity_threshold {
            return Err(AttemptError::TooSimilar { score });
        }

        let text = truncate_message(candidate, self.settings.max_message_chars);
        if let Some(evicted) = self.recent_outputs.push(text.clone()) {
            tracing::trace!(%evicted, "recent output evicted");
        }

        // Mentions are checked on the full text, before any truncation.
        let reply_target =
            resolve_reply_target(candidate, history.last(self.settings.mention_window));

        Ok(GenerationResult { text, reply_target })
    }
}
