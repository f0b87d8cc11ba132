//! Agent tasks — the immutable unit of work handed to exactly one agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classification::Classification;
use crate::message::Message;

/// A unit of work for an agent.
///
/// Built once by the orchestrator; never mutated afterwards. A quality
/// revision produces a *new* task via [`AgentTask::for_revision`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    /// The raw user text
    pub input: String,
    pub context: TaskContext,
    pub created_at: DateTime<Utc>,
}

/// Everything an agent may need besides the input text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskContext {
    /// Sender identity
    pub user_id: String,
    /// Channel name ("telegram", "web", "cli", ...)
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Household / tenant identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Trimmed recent history, oldest first, for prompt construction
    #[serde(default)]
    pub message_history: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Present when this task asks an agent to improve a prior answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<RevisionRequest>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Prior output plus reviewer feedback, for a quality revision pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRequest {
    pub previous_output: String,
    pub feedback: String,
    /// 1-based revision number
    pub attempt: u32,
}

impl AgentTask {
    pub fn new(input: impl Into<String>, context: TaskContext) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input: input.into(),
            context,
            created_at: Utc::now(),
        }
    }

    /// Lowercased input, as used by keyword predicates.
    pub fn input_lower(&self) -> String {
        self.input.to_lowercase()
    }

    /// Derive a follow-up task carrying the previous output and feedback.
    ///
    /// Keeps the original id so logs tie all passes to one request.
    pub fn for_revision(&self, revision: RevisionRequest) -> Self {
        let mut context = self.context.clone();
        context.revision = Some(revision);
        Self {
            id: self.id.clone(),
            input: self.input.clone(),
            context,
            created_at: Utc::now(),
        }
    }

    /// Render the revision hint (if any) as a prompt section.
    pub fn revision_prompt(&self) -> Option<String> {
        self.context.revision.as_ref().map(|r| {
            format!(
                "\n\nYour previous answer was:\n{}\n\nReviewer feedback:\n{}\n\nWrite an improved answer.",
                r.previous_output, r.feedback
            )
        })
    }
}
