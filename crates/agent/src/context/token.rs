//! Token estimation utilities.
//!
//! Character heuristic: 4 characters per token, plus a fixed 50 synthetic
//! characters per message for role and framing metadata. Counts Unicode
//! scalar values, so Cyrillic text is not over-counted.

use hearth_config::ContextConfig;
use hearth_core::message::Message;

/// Synthetic characters charged per message.
pub const MESSAGE_OVERHEAD_CHARS: usize = 50;

pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token cost of a message sequence.
///
/// `ceil((total_chars + messages.len() * 50) / 4)`
pub fn estimate_token_count(messages: &[Message]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    tokens_for(chars, messages.len())
}

/// Same formula over pre-summed counts.
pub(crate) fn tokens_for(total_chars: usize, message_count: usize) -> usize {
    (total_chars + message_count * MESSAGE_OVERHEAD_CHARS).div_ceil(CHARS_PER_TOKEN)
}

/// History budgets chosen by input shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudgets {
    /// Inputs shorter than this (in characters) count as conversational
    pub short_message_chars: usize,
    /// Budget for questions and short conversational turns
    pub conversational: usize,
    /// Budget for long declarative input (event statements)
    pub declarative: usize,
}

impl Default for TokenBudgets {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for TokenBudgets {
    fn from(config: &ContextConfig) -> Self {
        Self {
            short_message_chars: config.short_message_chars,
            conversational: config.conversational_budget,
            declarative: config.declarative_budget,
        }
    }
}

/// Pick the history budget for an input.
///
/// Questions and short turns benefit from more history; long statements
/// carry their own context and get the smaller budget.
pub fn determine_max_tokens(text: &str, budgets: &TokenBudgets) -> usize {
    if text.contains('?') || text.chars().count() < budgets.short_message_chars {
        budgets.conversational
    } else {
        budgets.declarative
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sequence_is_zero() {
        assert_eq!(estimate_token_count(&[]), 0);
    }

    #[test]
    fn overhead_is_charged_per_message() {
        // (4 + 50) / 4 = 13.5 -> 14
        assert_eq!(estimate_token_count(&[Message::user("test")]), 14);
        // (8 + 100) / 4 = 27
        assert_eq!(
            estimate_token_count(&[Message::user("test"), Message::assistant("test")]),
            27
        );
    }

    #[test]
    fn cyrillic_counts_characters_not_bytes() {
        // "хлеб" is 8 bytes but 4 characters
        assert_eq!(
            estimate_token_count(&[Message::user("хлеб")]),
            estimate_token_count(&[Message::user("test")])
        );
    }

    #[test]
    fn questions_get_the_conversational_budget() {
        let budgets = TokenBudgets::default();
        let long_question = format!("{}?", "a".repeat(200));
        assert_eq!(determine_max_tokens(&long_question, &budgets), budgets.conversational);
        assert_eq!(determine_max_tokens("hi", &budgets), budgets.conversational);
    }

    #[test]
    fn long_statements_get_the_declarative_budget() {
        let budgets = TokenBudgets::default();
        let statement = "Купил продукты на неделю: хлеб, молоко, сыр, яйца и овощи";
        assert!(statement.chars().count() >= budgets.short_message_chars);
        assert_eq!(determine_max_tokens(statement, &budgets), budgets.declarative);
        assert!(budgets.conversational > budgets.declarative);
    }
}
