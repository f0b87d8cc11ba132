//! Token-budget trimming of conversation history.
//!
//! Retention priority is fixed: the last two messages always stay, then
//! "important" older messages are filled newest-to-oldest, then ordinary
//! ones in the same order. A candidate that does not fit is skipped and the
//! fill continues with older (possibly smaller) messages. The selection is
//! returned sorted by creation time.

use std::collections::BTreeSet;

use hearth_core::message::Message;
use serde::Serialize;
use tracing::debug;

use super::token::{estimate_token_count, tokens_for};

/// Trailing messages kept regardless of budget.
pub const ALWAYS_KEEP: usize = 2;

/// Messages longer than this (in characters) are important.
pub const LONG_MESSAGE_CHARS: usize = 100;

/// Interrogative and request words, English and Russian.
const IMPORTANT_KEYWORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "please", "remind", "remember",
    "help", "need", "что", "как", "почему", "зачем", "когда", "где", "кто", "какой", "какая",
    "какие", "сколько", "пожалуйста", "напомни", "запомни", "помоги", "нужно", "надо",
];

/// What trimming did, for debug logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    pub kept: usize,
    pub dropped: usize,
    pub important_kept: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Whether a message deserves priority over ordinary history.
pub fn is_important(message: &Message) -> bool {
    let content = &message.content;
    if content.contains('?') || content.chars().count() > LONG_MESSAGE_CHARS {
        return true;
    }
    let lower = content.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| IMPORTANT_KEYWORDS.contains(&word))
}

/// Trim `messages` to fit `max_tokens`.
pub fn trim_context_by_tokens(messages: &[Message], max_tokens: usize) -> Vec<Message> {
    trim_with_report(messages, max_tokens).0
}

/// Trim `messages` to fit `max_tokens`, reporting what was kept.
pub fn trim_with_report(messages: &[Message], max_tokens: usize) -> (Vec<Message>, TrimReport) {
    let tokens_before = estimate_token_count(messages);
    if tokens_before <= max_tokens || messages.len() <= ALWAYS_KEEP {
        let report = TrimReport {
            kept: messages.len(),
            tokens_before,
            tokens_after: tokens_before,
            ..Default::default()
        };
        return (messages.to_vec(), report);
    }

    let tail_start = messages.len() - ALWAYS_KEEP;
    let mut selected: BTreeSet<usize> = (tail_start..messages.len()).collect();
    let mut chars: usize = messages[tail_start..]
        .iter()
        .map(|m| m.content.chars().count())
        .sum();

    let mut important_kept = 0;
    if tokens_for(chars, selected.len()) < max_tokens {
        let older = 0..tail_start;

        for idx in older.clone().rev().filter(|&i| is_important(&messages[i])) {
            let len = messages[idx].content.chars().count();
            if tokens_for(chars + len, selected.len() + 1) <= max_tokens {
                selected.insert(idx);
                chars += len;
                important_kept += 1;
            }
        }

        for idx in older.rev() {
            if selected.contains(&idx) {
                continue;
            }
            let len = messages[idx].content.chars().count();
            if tokens_for(chars + len, selected.len() + 1) <= max_tokens {
                selected.insert(idx);
                chars += len;
            }
        }
    }

    let mut kept: Vec<Message> = selected.into_iter().map(|i| messages[i].clone()).collect();
    kept.sort_by_key(|m| m.created_at);

    let report = TrimReport {
        kept: kept.len(),
        dropped: messages.len() - kept.len(),
        important_kept,
        tokens_before,
        tokens_after: estimate_token_count(&kept),
    };
    debug!(
        kept = report.kept,
        dropped = report.dropped,
        important = report.important_kept,
        tokens_before = report.tokens_before,
        tokens_after = report.tokens_after,
        "Trimmed conversation history"
    );
    (kept, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use hearth_core::message::Role;

    fn history(contents: &[&str]) -> Vec<Message> {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                Message::new(role, *c).at(base + Duration::minutes(i as i64))
            })
            .collect()
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn within_budget_is_unchanged() {
        let msgs = history(&["one", "two", "three"]);
        let budget = estimate_token_count(&msgs);
        let out = trim_context_by_tokens(&msgs, budget);
        assert_eq!(contents(&out), contents(&msgs));
    }

    #[test]
    fn last_two_survive_a_tiny_budget() {
        let msgs = history(&["old", "older answer", "latest question", "latest answer"]);
        let (out, report) = trim_with_report(&msgs, 1);
        assert_eq!(contents(&out), vec!["latest question", "latest answer"]);
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn important_messages_beat_newer_ordinary_ones() {
        let msgs = history(&["ok", "what did I spend on food?", "fine", "sure", "thanks", "bye"]);
        // Room for the tail plus exactly one more short message.
        let budget = tokens_for("thanks".len() + "bye".len() + "what did I spend on food?".len(), 3);
        let out = trim_context_by_tokens(&msgs, budget);
        assert_eq!(contents(&out), vec!["what did I spend on food?", "thanks", "bye"]);
    }

    #[test]
    fn ordinary_fill_goes_newest_first() {
        let msgs = history(&["aaaa", "bbbb", "cccc", "dddd", "eeee", "ffff"]);
        let budget = tokens_for(16, 4);
        let out = trim_context_by_tokens(&msgs, budget);
        assert_eq!(contents(&out), vec!["cccc", "dddd", "eeee", "ffff"]);
    }

    #[test]
    fn oversized_candidates_are_skipped_not_terminal() {
        let long = "x".repeat(400);
        let msgs = history(&["tiny", long.as_str(), "last one", "last two"]);
        let budget = tokens_for("tiny".len() + "last one".len() + "last two".len(), 3);
        let out = trim_context_by_tokens(&msgs, budget);
        assert_eq!(contents(&out), vec!["tiny", "last one", "last two"]);
    }

    #[test]
    fn output_is_chronological_even_for_unsorted_input() {
        let mut msgs = history(&["a?", "b", "c?", "d", "e", "f"]);
        msgs.swap(0, 2);
        let out = trim_context_by_tokens(&msgs, tokens_for(6, 5));
        assert!(out.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        assert!(contents(&out).contains(&"e"));
        assert!(contents(&out).contains(&"f"));
    }

    #[test]
    fn russian_keywords_are_important() {
        assert!(is_important(&Message::user("напомни купить молоко")));
        assert!(is_important(&Message::user("Сколько стоит")));
        assert!(is_important(&Message::user("ok?")));
        assert!(!is_important(&Message::user("купил хлеб")));
        assert!(!is_important(&Message::user("whatever")));
    }
}
