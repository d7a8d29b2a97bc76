//! Prompt assembly: persona block plus channel context or a quiet-chat topic,
//! plus a reminder of what we already said.

use crate::conversation::history::HistoryWindow;
use crate::llm::model::{Role, Turn};
use indoc::indoc;
use rand::Rng;
use rand::seq::IndexedRandom as _;

/// Built-in persona block, used when `[persona] system_prompt` is not set.
pub const DEFAULT_PERSONA: &str = indoc! {"
    You're a regular in a Discord server for an idle clicker game. You type like
    you're texting a friend: casual, relaxed, lowercase, lazy grammar is fine.

    About you:
    - You grind eggs and rebirths most days and run a couple of alt accounts
    - You've pulled a few secret pets and your skill tree is mostly done
    - You think the current event is pretty good

    Things you talk about: hatching eggs, rebirths, secret pets, the skill tree,
    the event, gamepasses, alts, grinding, lucky or unlucky pulls.

    Rules:
    - Only say things that make sense in context
    - When people are chatting, react to what they actually said
    - Keep it SHORT, around 20 to 60 characters
    - Casual slang is fine: rn, fr, ngl, tbh, lol, yeah, nah
    - No hashtags, no emojis spam, no quotes around your message
"};

/// Header of the reactive context turn.
pub const CONTEXT_HEADER: &str = "Recent chat messages:";

const REACT_INSTRUCTION: &str = "React naturally to what people are saying, casually. \
    If you mention someone by name, you're replying to them. \
    Don't repeat what they said back and don't ask what they're talking about, just respond to it. \
    Don't make up numbers or details that aren't in the conversation.";

/// Built-in quiet-chat topics, used when `[persona] quiet_topics` is not set.
pub fn default_quiet_topics() -> Vec<String> {
    [
        "Drop a super casual message about hatching eggs or playing the game",
        "Write a quick casual message about the event or your progress",
        "Type a brief casual comment about rebirths or the game, super relaxed",
        "Write a short casual message about what you're doing in game rn",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// A completion request before sampling parameters are chosen.
///
/// Constructed once per attempt and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    context_block: String,
    turns: Vec<Turn>,
}

impl GenerationRequest {
    /// The persona/system block.
    pub fn context_block(&self) -> &str {
        &self.context_block
    }

    /// Context turns following the persona block.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Full conversation for the provider: system turn first.
    pub fn to_messages(&self) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(Turn::new(Role::System, self.context_block.clone()));
        messages.extend(self.turns.iter().cloned());
        messages
    }
}

/// Builds [`GenerationRequest`]s from channel history and our recent output.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    quiet_topics: Vec<String>,
    context_messages: usize,
    avoid_repeat_count: usize,
}

impl PromptBuilder {
    pub fn new(
        persona: impl Into<String>,
        quiet_topics: Vec<String>,
        context_messages: usize,
        avoid_repeat_count: usize,
    ) -> Self {
        Self {
            persona: persona.into(),
            quiet_topics,
            context_messages,
            avoid_repeat_count,
        }
    }

    /// Assemble a request. `rng` is only drawn from when `history` is empty.
    pub fn build<R: Rng + ?Sized>(
        &self,
        history: &HistoryWindow,
        recent_outputs: &[String],
        rng: &mut R,
    ) -> GenerationRequest {
        let mut turns = Vec::with_capacity(2);

        if history.is_empty() {
            turns.push(Turn::new(Role::User, self.quiet_turn(rng)));
        } else {
            let transcript = history
                .last(self.context_messages)
                .iter()
                .map(|message| message.transcript_line())
                .collect::<Vec<_>>()
                .join("\n");
            turns.push(Turn::new(
                Role::User,
                format!("{CONTEXT_HEADER}\n{transcript}\n\n{REACT_INSTRUCTION}"),
            ));
        }

        if !recent_outputs.is_empty() && self.avoid_repeat_count > 0 {
            let start = recent_outputs.len().saturating_sub(self.avoid_repeat_count);
            let listed = recent_outputs[start..]
                .iter()
                .map(|text| format!("- {text}"))
                .collect::<Vec<_>>()
                .join("\n");
            turns.push(Turn::new(
                Role::User,
                format!(
                    "Don't repeat these messages you just sent:\n{listed}\nWrite something different."
                ),
            ));
        }

        GenerationRequest {
            context_block: self.persona.clone(),
            turns,
        }
    }

    fn quiet_turn<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let topic = self
            .quiet_topics
            .choose(rng)
            .map(String::as_str)
            .unwrap_or("Say something casual about the game");
        format!(
            "Chat is quiet. {topic}. Keep it super casual and short. \
             Don't ask questions, just make a casual comment."
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_PERSONA, default_quiet_topics(), 5, 3)
    }
}
