//! Request orchestration — the heart of hearth.
//!
//! Every inbound message follows one pipeline:
//!
//! 1. **Validate and rate-limit** per chat
//! 2. **Fast path**: trivial messages (greetings, thanks) are answered at once
//! 3. **Assemble context**: recent history, trimmed to a token budget
//! 4. **Classify** the message (advisory, never fails)
//! 5. **Route** to the first agent that claims the task, or the general agent
//! 6. **Process**: the agent extracts, persists, queries or replies
//! 7. **Quality control** for free-text replies, bounded revisions
//! 8. **Persist** the exchange and reply
//!
//! Collaborators (generation service, stores) are traits from `hearth-core`.

pub mod agents;
pub mod classifier;
pub mod context;
pub mod fast_response;
pub mod generation;
pub mod orchestrator;
pub mod quality;
pub mod rate_limit;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agents::{AgentSettings, standard_registry};
pub use classifier::Classifier;
pub use context::{ContextAssembler, ContextOptions, TokenBudgets, TrimReport, trim_context_by_tokens};
pub use fast_response::{FastDecision, FastPathSettings, FastPathStats, FastResponseCache};
pub use generation::Generator;
pub use orchestrator::{Orchestrator, OrchestratorParts, Reply};
pub use quality::{LlmJudge, QualityController, QualityJudge, QualityOutcome, QualityScore};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use registry::{AgentRegistry, AgentSummary, Route};
