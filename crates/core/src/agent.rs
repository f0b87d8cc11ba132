//! Agent trait and result types.
//!
//! An agent is a capability-specific handler: it decides whether it can take
//! a task (`can_handle`) and, if routed the task, produces exactly one
//! [`AgentResult`] (`process`). Routing lives in the agent crate; this module
//! only defines the contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::task::AgentTask;

/// Declarative metadata an agent exposes for introspection and statistics.
///
/// Not used for routing math; routing asks the agent's own `can_handle`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
    pub category: String,
    pub confidence: f32,
}

impl AgentCapability {
    pub fn new(name: &str, description: &str, category: &str, confidence: f32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            confidence,
        }
    }
}

/// The outcome of one agent pass over one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    /// Structured payload (created entity, query rows, statistics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Natural-language reply for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AgentResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// A failed pass. `message` is what the user sees; `error` is for logs.
    pub fn failure(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Reply text, or an empty string if the agent produced none.
    pub fn reply(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// The core Agent trait.
///
/// Implementations must be cheap to share (`Arc<dyn Agent>`); per-request
/// state belongs in the task, not the agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable agent name, used in logs, statistics and routing traces.
    fn name(&self) -> &str;

    /// Capabilities for introspection (`GET /v1/agents`).
    fn capabilities(&self) -> Vec<AgentCapability>;

    /// Whether this agent wants the task.
    ///
    /// Keyword agents answer from the lowercased input; fuzzy domains may
    /// consult the generation service. Must not fail: an internal error
    /// means "no".
    async fn can_handle(&self, task: &AgentTask) -> bool;

    /// Process a task this agent was routed.
    ///
    /// Expected failures (low-confidence extraction, nothing found) come back
    /// as `Ok(AgentResult { success: false, .. })`; `Err` is reserved for
    /// collaborator failures that should abort the request.
    async fn process(&self, task: &AgentTask) -> Result<AgentResult>;

    /// Whether re-running `process` with reviewer feedback is safe.
    ///
    /// Agents that persist entities must answer `false` so a quality pass
    /// never writes the same entity twice.
    fn refinable(&self) -> bool {
        false
    }
}
