//! Reply detection: naming someone from the recent history makes the
//! message a reply to their latest message.

use crate::{ChatMessage, MessageId};
use regex::Regex;

/// Find the message the generated `text` is addressed to.
///
/// `recent` is the tail of the history window, oldest first. Candidates are
/// checked newest first and the first author whose name appears as a whole
/// word (case-insensitive) wins.
pub fn resolve_reply_target(text: &str, recent: &[ChatMessage]) -> Option<MessageId> {
    recent
        .iter()
        .rev()
        .find(|message| mentions_author(text, &message.author))
        .map(|message| {
            tracing::debug!(
                author = %message.author,
                message_id = %message.id,
                "mention detected, replying"
            );
            message.id.clone()
        })
}

/// Whether `author` appears in `text` as a standalone word.
///
/// The name is escaped, so punctuation in usernames is matched literally.
/// Boundaries are "start/end of text or a non-word character", which also
/// works for names that begin or end with punctuation.
pub fn mentions_author(text: &str, author: &str) -> bool {
    let author = author.trim();
    if author.is_empty() {
        return false;
    }

    let pattern = format!(r"(?i)(?:^|\W){}(?:\W|$)", regex::escape(author));
    match Regex::new(&pattern) {
        Ok(regex) => regex.is_match(text),
        Err(error) => {
            tracing::warn!(%author, %error, "could not build mention pattern");
            false
        }
    }
}
