//! Conversational fallback agent.

use async_trait::async_trait;
use hearth_core::agent::{Agent, AgentCapability, AgentResult};
use hearth_core::error::Result;
use hearth_core::task::AgentTask;

use super::{AgentSettings, Lang};
use crate::generation::Generator;

const SYSTEM_PROMPT: &str = "You are Hearth, a friendly household assistant. You help a family keep \
track of purchases, income, tasks, reminders and notes, and you chat about everyday matters. \
Answer briefly and in the language of the user's last message. If the user seems to want something \
recorded, ask them to state it plainly (for example \"Bought bread for 45 rubles\").";

pub struct GeneralAgent {
    generator: Generator,
    settings: AgentSettings,
}

impl GeneralAgent {
    pub fn new(generator: Generator, settings: AgentSettings) -> Self {
        Self { generator, settings }
    }
}

#[async_trait]
impl Agent for GeneralAgent {
    fn name(&self) -> &str {
        "general"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "conversation",
            "Small talk and general questions, using recent history",
            "conversation",
            0.6,
        )]
    }

    async fn can_handle(&self, _task: &AgentTask) -> bool {
        true
    }

    async fn process(&self, task: &AgentTask) -> Result<AgentResult> {
        let prompt = match task.revision_prompt() {
            Some(revision) => format!("{}{revision}", task.input),
            None => task.input.clone(),
        };

        let reply = self
            .generator
            .text_with_history(
                SYSTEM_PROMPT,
                &task.context.message_history,
                &prompt,
                self.settings.reply_temperature,
            )
            .await?;

        if reply.is_empty() {
            let lang = Lang::detect(&task.input);
            return Ok(AgentResult::failure(
                "empty reply from generation service",
                lang.pick("Не получилось ответить. Попробуйте ещё раз.", "I couldn't come up with an answer. Please try again."),
            ));
        }
        Ok(AgentResult::success(reply))
    }

    fn refinable(&self) -> bool {
        true
    }
}
