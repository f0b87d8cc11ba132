//! Message classification: what kind of message this is, and whether it is
//! relevant to the assistant's domain at all.
//!
//! Produced once per task by the classifier. Advisory: callers treat a
//! low-confidence classification as a hint, not a decision.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Asks for information ("how much did I spend this week?")
    Question,
    /// States something that should be recorded ("bought bread for 45")
    Event,
    /// Small talk
    Chat,
    /// Off-topic for a household assistant
    Irrelevant,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Question => "question",
            MessageKind::Event => "event",
            MessageKind::Chat => "chat",
            MessageKind::Irrelevant => "irrelevant",
        }
    }
}

/// Type half of a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageType {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[schemars(range(min = 0, max = 1))]
    pub confidence: f32,
    /// Whether the message should produce a persisted entity
    #[serde(default)]
    pub need_logging: bool,
}

/// Relevance half of a classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Relevance {
    pub relevant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 1))]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// The full classification tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub message_type: MessageType,
    pub relevance: Relevance,
}

impl Classification {
    /// The safe default used whenever classification fails: a
    /// zero-confidence chat message that is not relevant.
    pub fn fallback() -> Self {
        Self {
            message_type: MessageType {
                kind: MessageKind::Chat,
                subtype: None,
                confidence: 0.0,
                need_logging: false,
            },
            relevance: Relevance {
                relevant: false,
                score: Some(0.0),
                category: None,
            },
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.message_type.kind
    }

    /// Whether the classification is confident enough to act on.
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.message_type.confidence >= threshold
    }

    /// Whether this is a confidently-classified event that should be logged.
    pub fn wants_logging(&self, threshold: f32) -> bool {
        self.message_type.kind == MessageKind::Event
            && self.message_type.need_logging
            && self.is_confident(threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_not_relevant() {
        let c = Classification::fallback();
        assert!(!c.relevance.relevant);
        assert_eq!(c.relevance.score, Some(0.0));
        assert_eq!(c.message_type.confidence, 0.0);
        assert!(!c.is_confident(0.5));
    }

    #[test]
    fn message_type_wire_names() {
        let t = MessageType {
            kind: MessageKind::Event,
            subtype: Some("purchase".into()),
            confidence: 0.9,
            need_logging: true,
        };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["needLogging"], true);
    }

    #[test]
    fn wants_logging_requires_confidence() {
        let mut c = Classification::fallback();
        c.message_type.kind = MessageKind::Event;
        c.message_type.need_logging = true;
        c.message_type.confidence = 0.4;
        assert!(!c.wants_logging(0.5));
        c.message_type.confidence = 0.8;
        assert!(c.wants_logging(0.5));
    }
}
