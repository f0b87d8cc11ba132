//! The concrete agents and the standard routing order.
//!
//! | Order | Agent | Claims |
//! |-------|-------|--------|
//! | 1 | [`AnalyticsAgent`] | statistics and spending totals |
//! | 2 | [`DataQueryAgent`] | "show / list what I logged" |
//! | 3 | [`ReminderAgent`] | reminders (keywords, else AI check on time phrases) |
//! | 4 | [`EventCreationAgent`] | purchases, income, tasks, meetings, notes |
//! | fallback | [`GeneralAgent`] | everything else |

pub mod analytics;
pub mod data_query;
pub mod event_creation;
pub mod extraction;
pub mod general;
pub mod query;
pub mod reminder;
pub mod temporal;

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use hearth_config::AgentsConfig;
use hearth_core::store::EntityStore;
use tracing::warn;

pub use analytics::AnalyticsAgent;
pub use data_query::DataQueryAgent;
pub use event_creation::EventCreationAgent;
pub use general::GeneralAgent;
pub use reminder::ReminderAgent;

use crate::generation::Generator;
use crate::registry::AgentRegistry;

/// Settings shared by the concrete agents.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub min_extraction_confidence: f32,
    /// The users' local offset for temporal phrases and prompts
    pub utc_offset: FixedOffset,
    /// Temperature for free-text replies
    pub reply_temperature: f32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AgentsConfig::default(), 0.7)
    }
}

impl AgentSettings {
    pub fn from_config(config: &AgentsConfig, reply_temperature: f32) -> Self {
        let utc_offset = FixedOffset::east_opt(config.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| {
            warn!(minutes = config.utc_offset_minutes, "Invalid UTC offset, using UTC");
            Utc.fix()
        });
        Self {
            min_extraction_confidence: config.min_extraction_confidence,
            utc_offset,
            reply_temperature,
        }
    }
}

/// Reply language, from the script of the user's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Ru,
    En,
}

impl Lang {
    pub fn detect(text: &str) -> Self {
        if text
            .chars()
            .any(|c| matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё'))
        {
            Lang::Ru
        } else {
            Lang::En
        }
    }

    pub fn pick<'a>(self, ru: &'a str, en: &'a str) -> &'a str {
        match self {
            Lang::Ru => ru,
            Lang::En => en,
        }
    }
}

/// Whether any of `needles` occurs in the (already lowercased) input.
///
/// Needles match whole words, and multi-word needles match consecutive
/// words. A trailing `*` turns the last word into a stem, so `"расход*"`
/// matches "расходы" and "расходов" while `"show"` never matches "shower".
pub(crate) fn mentions_any(lower: &str, needles: &[&str]) -> bool {
    let words = split_words(lower);
    needles.iter().any(|needle| {
        let (needle, stem) = match needle.strip_suffix('*') {
            Some(n) => (n, true),
            None => (*needle, false),
        };
        let parts = split_words(needle);
        if parts.is_empty() || parts.len() > words.len() {
            return false;
        }
        let last = parts.len() - 1;
        words.windows(parts.len()).any(|window| {
            window.iter().zip(&parts).enumerate().all(|(i, (word, part))| {
                if stem && i == last {
                    word.starts_with(part)
                } else {
                    word == part
                }
            })
        })
    })
}

fn split_words(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .collect()
}

/// The standard agent set in routing order, general agent as fallback.
pub fn standard_registry(
    generator: Generator,
    entities: Arc<dyn EntityStore>,
    settings: AgentSettings,
) -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(AnalyticsAgent::new(generator.clone(), entities.clone(), settings)));
    registry.register(Arc::new(DataQueryAgent::new(generator.clone(), entities.clone(), settings)));
    registry.register(Arc::new(ReminderAgent::new(generator.clone(), entities.clone(), settings)));
    registry.register(Arc::new(EventCreationAgent::new(generator.clone(), entities, settings)));
    registry.set_fallback(Arc::new(GeneralAgent::new(generator, settings)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use hearth_core::task::{AgentTask, TaskContext};
    use hearth_store::InMemoryStore;

    fn registry() -> AgentRegistry {
        let generator = Generator::new(Arc::new(SequentialMockProvider::silent()), "m");
        standard_registry(generator, Arc::new(InMemoryStore::new()), AgentSettings::default())
    }

    async fn routed_to(text: &str) -> String {
        let task = AgentTask::new(text, TaskContext::default());
        registry().route(&task).await.unwrap().agent.name().to_string()
    }

    #[test]
    fn keywords_match_whole_words() {
        assert!(mentions_any("show my purchases", &["show"]));
        assert!(!mentions_any("bought a shower curtain", &["show"]));
        assert!(!mentions_any("new playlist", &["list"]));
        assert!(!mentions_any("no findings yet", &["find"]));
        assert!(mentions_any("what did i buy today?", &["what did i buy"]));
        assert!(!mentions_any("what did you buy", &["what did i buy"]));
        assert!(mentions_any("don't forget the keys", &["don't forget"]));
    }

    #[test]
    fn starred_keywords_match_word_stems() {
        assert!(mentions_any("мои расходы за месяц", &["расход*"]));
        assert!(mentions_any("сколько я потратила вчера", &["сколько я потратил*"]));
        assert!(!mentions_any("перерасход", &["расход*"]));
    }

    #[tokio::test]
    async fn expense_mentioning_lookalike_words_is_logged() {
        assert_eq!(routed_to("Bought a shower curtain for 30 dollars").await, "event_creation");
        assert_eq!(routed_to("Paid 12 dollars for a playlist subscription").await, "event_creation");
        assert_eq!(routed_to("Купил хлеб за 45 рублей").await, "event_creation");
    }

    #[tokio::test]
    async fn keyword_routes_follow_registration_order() {
        assert_eq!(routed_to("Show my purchases").await, "data_query");
        assert_eq!(routed_to("Сколько я потратил в этом месяце?").await, "analytics");
        assert_eq!(routed_to("Remind me to call mom").await, "reminder");
        assert_eq!(routed_to("What should I read?").await, "general");
    }

    #[tokio::test]
    async fn absurd_relative_time_routes_without_panicking() {
        assert_eq!(routed_to("call mom in 99999999999999 hours").await, "general");
    }

    #[test]
    fn language_detection() {
        assert_eq!(Lang::detect("Купил хлеб"), Lang::Ru);
        assert_eq!(Lang::detect("bought bread"), Lang::En);
        assert_eq!(Lang::Ru.pick("да", "yes"), "да");
    }

    #[test]
    fn offset_comes_from_minutes() {
        let config = AgentsConfig {
            utc_offset_minutes: 180,
            ..Default::default()
        };
        let settings = AgentSettings::from_config(&config, 0.5);
        assert_eq!(settings.utc_offset.local_minus_utc(), 3 * 3600);
        assert_eq!(settings.reply_temperature, 0.5);
    }

    #[test]
    fn standard_order() {
        let generator = Generator::new(Arc::new(SequentialMockProvider::silent()), "m");
        let registry = standard_registry(generator, Arc::new(InMemoryStore::new()), AgentSettings::default());
        let names: Vec<_> = registry.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["analytics", "data_query", "reminder", "event_creation", "general"]);
    }
}
