//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use hearth_core::entity::{Entity, EntityQuery, NewEntity};
use hearth_core::error::StoreError;
use hearth_core::message::{ConversationId, Message, Role};
use hearth_core::store::{ConversationStore, EntityStore, StoreResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    /// (identity, channel, chat key) → conversation
    conversations: HashMap<(String, String, String), ConversationId>,
    /// Messages per conversation, in append order
    messages: HashMap<ConversationId, Vec<Message>>,
    last_activity: HashMap<ConversationId, chrono::DateTime<Utc>>,
    entities: Vec<Entity>,
}

/// An in-memory conversation and entity store. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed message (keeps its id and timestamp).
    pub async fn push_message(&self, conversation_id: &ConversationId, message: Message) {
        self.state
            .write()
            .await
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message);
    }

    /// Total number of stored entities.
    pub async fn entity_count(&self) -> usize {
        self.state.read().await.entities.len()
    }

    /// Last-activity time of a conversation, if it was ever touched.
    pub async fn last_activity(&self, conversation_id: &ConversationId) -> Option<chrono::DateTime<Utc>> {
        self.state.read().await.last_activity.get(conversation_id).copied()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find_or_create_conversation(
        &self,
        identity: &str,
        channel: &str,
        chat_id: Option<&str>,
    ) -> StoreResult<ConversationId> {
        let key = (
            identity.to_string(),
            channel.to_string(),
            chat_id.unwrap_or_default().to_string(),
        );
        let mut state = self.state.write().await;
        let id = state
            .conversations
            .entry(key)
            .or_insert_with(ConversationId::new)
            .clone();
        Ok(id)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        let state = self.state.read().await;
        let messages: Vec<Message> = state
            .messages
            .get(conversation_id)
            .map(|msgs| msgs.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(messages)
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        model: Option<&str>,
    ) -> StoreResult<String> {
        let mut state = self.state.write().await;
        if !state.conversations.values().any(|c| c == conversation_id) {
            return Err(StoreError::NotFound(format!("conversation {conversation_id}")));
        }

        let mut message = Message::new(role, content);
        if let Some(m) = model {
            message = message.with_model(m);
        }
        let id = message.id.clone();
        state
            .messages
            .entry(conversation_id.clone())
            .or_default()
            .push(message);
        Ok(id)
    }

    async fn touch_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()> {
        self.state
            .write()
            .await
            .last_activity
            .insert(conversation_id.clone(), Utc::now());
        Ok(())
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn create_entity(&self, fields: NewEntity) -> StoreResult<Entity> {
        let entity = fields.into_entity(Uuid::new_v4().to_string(), Utc::now());
        self.state.write().await.entities.push(entity.clone());
        Ok(entity)
    }

    async fn list_entities(&self, query: &EntityQuery) -> StoreResult<Vec<Entity>> {
        let state = self.state.read().await;
        let mut results: Vec<Entity> = state
            .entities
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(query.limit)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }
}
