//! Context assembly: loads the recent history of a conversation from the
//! store and fits it to the input's token budget.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hearth_config::ContextConfig;
use hearth_core::error::StoreError;
use hearth_core::message::{ConversationContext, ConversationId, Message, Role};
use hearth_core::store::ConversationStore;
use tracing::debug;

use super::token::{TokenBudgets, determine_max_tokens};
use super::trim::{TrimReport, trim_with_report};

/// How much history to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextOptions {
    pub max_messages: usize,
    pub include_system: bool,
    /// `None` disables the age filter
    pub max_age_hours: Option<u32>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for ContextOptions {
    fn from(config: &ContextConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            include_system: config.include_system,
            max_age_hours: (config.max_age_hours > 0).then_some(config.max_age_hours),
        }
    }
}

/// Loads conversation history for prompt construction.
pub struct ContextAssembler {
    store: Arc<dyn ConversationStore>,
    options: ContextOptions,
    budgets: TokenBudgets,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn ConversationStore>, options: ContextOptions, budgets: TokenBudgets) -> Self {
        Self {
            store,
            options,
            budgets,
        }
    }

    pub fn from_config(store: Arc<dyn ConversationStore>, config: &ContextConfig) -> Self {
        Self::new(store, ContextOptions::from(config), TokenBudgets::from(config))
    }

    /// Recent history of a conversation, oldest first.
    ///
    /// Fetches one message more than `max_messages` to learn whether older
    /// history exists.
    pub async fn get_context(
        &self,
        conversation_id: &ConversationId,
        options: &ContextOptions,
    ) -> Result<ConversationContext, StoreError> {
        self.get_context_at(conversation_id, options, Utc::now()).await
    }

    pub async fn get_context_at(
        &self,
        conversation_id: &ConversationId,
        options: &ContextOptions,
        now: DateTime<Utc>,
    ) -> Result<ConversationContext, StoreError> {
        if options.max_messages == 0 {
            return Ok(ConversationContext::empty(conversation_id.clone()));
        }

        let mut newest_first = self
            .store
            .list_recent_messages(conversation_id, options.max_messages + 1)
            .await?;
        let has_more = newest_first.len() > options.max_messages;
        newest_first.truncate(options.max_messages);

        let cutoff = options
            .max_age_hours
            .map(|hours| now - Duration::hours(i64::from(hours)));

        let mut messages: Vec<Message> = newest_first
            .into_iter()
            .filter(|m| options.include_system || m.role != Role::System)
            .filter(|m| cutoff.is_none_or(|c| m.created_at >= c))
            .collect();
        messages.reverse();

        debug!(
            conversation = %conversation_id,
            loaded = messages.len(),
            has_more,
            "Loaded conversation context"
        );

        Ok(ConversationContext {
            conversation_id: conversation_id.clone(),
            messages,
            has_more,
        })
    }

    /// History for generating a reply to `input`: loaded with the configured
    /// options, then trimmed to the budget the input's shape calls for.
    pub async fn history_for(
        &self,
        conversation_id: &ConversationId,
        input: &str,
    ) -> Result<(ConversationContext, TrimReport), StoreError> {
        let mut context = self.get_context(conversation_id, &self.options).await?;
        let budget = determine_max_tokens(input, &self.budgets);
        let (trimmed, report) = trim_with_report(&context.messages, budget);
        context.messages = trimmed;
        Ok((context, report))
    }
}
