//! Quality control: score an agent's reply and, while it falls short of the
//! target, ask the same agent for a revised one.
//!
//! Bounded by `max_iterations` revision passes. Stops early when a result
//! reaches the target, when the agent fails, or when the judge cannot score.
//! The best-scoring result seen is returned, never a worse one.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_config::QualityConfig;
use hearth_core::agent::{Agent, AgentResult};
use hearth_core::error::Result;
use hearth_core::structured::schema_for;
use hearth_core::task::{AgentTask, RevisionRequest};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::generation::Generator;

/// A judge's verdict on one reply.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct QualityScore {
    #[schemars(range(min = 0, max = 1))]
    pub score: f32,
    #[serde(default)]
    pub feedback: String,
}

/// Scores agent replies.
#[async_trait]
pub trait QualityJudge: Send + Sync {
    async fn score(&self, task: &AgentTask, result: &AgentResult) -> Result<QualityScore>;
}

const JUDGE_PROMPT: &str = "You review replies of a household assistant. Rate how well the reply \
answers the user's message: correct, specific, brief, in the user's language. Respond with a single \
JSON object and nothing else: {\"score\": number from 0 to 1, \"feedback\": what to improve}";

/// A judge backed by the generation service.
pub struct LlmJudge {
    generator: Generator,
}

impl LlmJudge {
    pub fn new(generator: Generator) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl QualityJudge for LlmJudge {
    async fn score(&self, task: &AgentTask, result: &AgentResult) -> Result<QualityScore> {
        let user = format!("User message:\n{}\n\nAssistant reply:\n{}", task.input, result.reply());
        let value = self.generator.object(JUDGE_PROMPT, &user, &schema_for::<QualityScore>(), 0.0).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// What quality control settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityOutcome {
    pub result: AgentResult,
    /// Score of `result`, if it was scored
    pub score: Option<f32>,
    /// Revision passes requested from the agent
    pub iterations: u32,
}

impl QualityOutcome {
    fn unscored(result: AgentResult) -> Self {
        Self {
            result,
            score: None,
            iterations: 0,
        }
    }
}

pub struct QualityController {
    judge: Arc<dyn QualityJudge>,
    enabled: bool,
    target: f32,
    max_iterations: u32,
}

impl QualityController {
    pub fn new(judge: Arc<dyn QualityJudge>, config: &QualityConfig) -> Self {
        Self {
            judge,
            enabled: config.enabled,
            target: config.target_quality,
            max_iterations: config.max_iterations,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Refine `initial`, produced by `agent` for `task`.
    ///
    /// Results that failed, carry no reply, or come from an agent that cannot
    /// safely re-run are returned untouched.
    pub async fn refine(&self, agent: &dyn Agent, task: &AgentTask, initial: AgentResult) -> QualityOutcome {
        if !self.enabled || !agent.refinable() || !initial.success || initial.reply().is_empty() {
            return QualityOutcome::unscored(initial);
        }

        let verdict = match self.judge.score(task, &initial).await {
            Ok(v) => v,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Quality judge failed, keeping reply");
                return QualityOutcome::unscored(initial);
            }
        };

        let mut best = initial;
        let mut best_score = verdict.score;
        let mut latest_reply = best.reply().to_string();
        let mut latest_feedback = verdict.feedback;
        let mut iterations = 0;

        while best_score < self.target && iterations < self.max_iterations {
            iterations += 1;
            let revised_task = task.for_revision(RevisionRequest {
                previous_output: latest_reply.clone(),
                feedback: latest_feedback.clone(),
                attempt: iterations,
            });

            let revised = match agent.process(&revised_task).await {
                Ok(r) if r.success && !r.reply().is_empty() => r,
                Ok(_) => {
                    debug!(task_id = %task.id, iterations, "Revision failed, keeping best result");
                    break;
                }
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Revision errored, keeping best result");
                    break;
                }
            };

            let verdict = match self.judge.score(&revised_task, &revised).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "Quality judge failed during revision");
                    break;
                }
            };
            debug!(task_id = %task.id, iterations, score = verdict.score, best = best_score, "Revision scored");

            latest_reply = revised.reply().to_string();
            latest_feedback = verdict.feedback;
            if verdict.score > best_score {
                best = revised;
                best_score = verdict.score;
            }
        }

        QualityOutcome {
            result: best,
            score: Some(best_score),
            iterations,
        }
    }
}
