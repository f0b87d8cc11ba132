//! Channel trait — the abstraction over chat platforms.
//!
//! A Channel delivers inbound user messages into the orchestrator and sends
//! the reply text back. Audio is transcribed before a message reaches the
//! pipeline; the only thing the core cares about an attachment is whether its
//! declared size is acceptable to download at all.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Default ceiling for declared attachment sizes (20 MiB).
pub const DEFAULT_ATTACHMENT_LIMIT_BYTES: u64 = 20 * 1024 * 1024;

/// A message delivered by a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Channel name ("telegram", "web", "cli", ...)
    pub channel: String,

    /// The (already transcribed) text
    pub text: String,

    /// Platform-specific user id
    pub sender_id: String,

    /// Chat / group / DM identifier within the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,

    /// Platform message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Household / tenant the sender belongs to, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn new(channel: impl Into<String>, sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            sender_id: sender_id.into(),
            chat_id: None,
            message_id: None,
            household_id: None,
            attachments: Vec::new(),
        }
    }

    pub fn in_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn in_household(mut self, household_id: impl Into<String>) -> Self {
        self.household_id = Some(household_id.into());
        self
    }

    /// Chat id, falling back to the sender id for direct messages.
    pub fn chat_key(&self) -> &str {
        self.chat_id.as_deref().unwrap_or(&self.sender_id)
    }
}

/// What the orchestrator hands back for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub text: String,
}

impl OutboundReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// An attachment in an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,

    /// URL or platform file id
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Size as declared by the platform, before download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
    Audio,
    Voice,
    Other,
}

impl Attachment {
    /// Reject the attachment before download if its declared size exceeds
    /// `limit_bytes`. Unknown sizes pass; the fetch timeout bounds those.
    pub fn check_size(&self, limit_bytes: u64) -> std::result::Result<(), ChannelError> {
        match self.size_bytes {
            Some(size) if size > limit_bytes => Err(ChannelError::AttachmentTooLarge {
                size_bytes: size,
                limit_bytes,
            }),
            _ => Ok(()),
        }
    }
}

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name (e.g., "telegram", "cli").
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<InboundMessage, ChannelError>>,
        ChannelError,
    >;

    /// Deliver a reply to a chat.
    async fn send(&self, chat_id: &str, reply: &OutboundReply) -> std::result::Result<(), ChannelError>;

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(size: Option<u64>) -> Attachment {
        Attachment {
            kind: AttachmentKind::Voice,
            url: "file-id".into(),
            mime_type: Some("audio/ogg".into()),
            size_bytes: size,
        }
    }

    #[test]
    fn oversized_attachment_is_rejected() {
        let err = voice(Some(30 * 1024 * 1024))
            .check_size(DEFAULT_ATTACHMENT_LIMIT_BYTES)
            .unwrap_err();
        assert!(matches!(err, ChannelError::AttachmentTooLarge { .. }));
    }

    #[test]
    fn small_or_undeclared_attachment_passes() {
        assert!(voice(Some(1024)).check_size(DEFAULT_ATTACHMENT_LIMIT_BYTES).is_ok());
        assert!(voice(None).check_size(DEFAULT_ATTACHMENT_LIMIT_BYTES).is_ok());
    }

    #[test]
    fn chat_key_falls_back_to_sender() {
        let dm = InboundMessage::new("telegram", "42", "hi");
        assert_eq!(dm.chat_key(), "42");
        let group = dm.in_chat("-100");
        assert_eq!(group.chat_key(), "-100");
    }
}
