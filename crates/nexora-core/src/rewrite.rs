//! History-aware query rewrite for follow-up questions.
//!
//! A follow-up such as "When was it created?" carries no subject of its own. When the
//! question refers back through a pronoun or is very short, the most recent user
//! questions are prepended so retrieval sees the subject as well. Questions that stand
//! on their own are left alone.

use nexora_memory::{ChatMessage, MessageRole};

const ANAPHORS: &[&str] = &[
    "it", "its", "they", "them", "their", "theirs", "this", "that", "these", "those", "he",
    "him", "his", "she", "her", "hers", "there", "one", "ones",
];

/// Questions with at most this many words count as elliptical ("and pricing?").
const SHORT_QUESTION_WORDS: usize = 3;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn needs_context(question: &str) -> bool {
    let mut count = 0;
    for word in words(question) {
        if ANAPHORS.contains(&word.as_str()) {
            return true;
        }
        count += 1;
    }
    count <= SHORT_QUESTION_WORDS
}

/// Rewrite `question` using up to `max_turns` prior user questions from `history`.
///
/// Returns `None` when no rewrite applies.
#[must_use]
pub fn rewrite_query(question: &str, history: &[ChatMessage], max_turns: usize) -> Option<String> {
    if max_turns == 0 || !needs_context(question) {
        return None;
    }
    let mut previous: Vec<&str> = history
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty())
        .take(max_turns)
        .collect();
    if previous.is_empty() {
        return None;
    }
    previous.reverse();
    Some(format!("{} {}", previous.join(" "), question.trim()))
}
