//! Durable store traits.
//!
//! The pipeline reads and writes conversations through [`ConversationStore`]
//! and persists extracted entities through [`EntityStore`]. Implementations
//! (in-memory, SQLite) live in the store crate and are expected to make each
//! call individually atomic.

use async_trait::async_trait;

use crate::entity::{Entity, EntityQuery, NewEntity};
use crate::error::StoreError;
use crate::message::{ConversationId, Message, Role};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Backend name for logs ("memory", "sqlite").
    fn name(&self) -> &str;

    /// Return the conversation for `(identity, channel, chat_id)`, creating
    /// it on first contact.
    async fn find_or_create_conversation(
        &self,
        identity: &str,
        channel: &str,
        chat_id: Option<&str>,
    ) -> StoreResult<ConversationId>;

    /// The `limit` most recent messages, **newest first**.
    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<Message>>;

    /// Append a message and return its id.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        model: Option<&str>,
    ) -> StoreResult<String>;

    /// Bump the conversation's last-activity time.
    async fn touch_conversation(&self, conversation_id: &ConversationId) -> StoreResult<()>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persist a new entity; the store assigns id and creation time.
    async fn create_entity(&self, fields: NewEntity) -> StoreResult<Entity>;

    /// Entities matching `query`, newest first, at most `query.limit`.
    async fn list_entities(&self, query: &EntityQuery) -> StoreResult<Vec<Entity>>;
}
