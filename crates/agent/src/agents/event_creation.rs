//! Event creation: purchases, income, tasks, meetings and notes.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::agent::{Agent, AgentCapability, AgentResult};
use hearth_core::entity::{Entity, EventKind};
use hearth_core::error::Result;
use hearth_core::store::EntityStore;
use hearth_core::task::AgentTask;
use serde_json::json;
use tracing::info;

use super::extraction::{self, Extraction, ExtractedEntity, Extractor, TEMPORAL_RULES};
use super::{AgentSettings, Lang, mentions_any};
use crate::generation::Generator;

/// Minimum classifier confidence for an event to be logged without keywords.
const CLASSIFIER_THRESHOLD: f32 = 0.5;

const KEYWORDS: &[&str] = &[
    "купил*", "потратил*", "заплатил*", "оплатил*", "получил*", "зарплат*", "задача", "добавь",
    "запиши", "заметк*", "встреч*", "bought", "spent", "paid", "purchased", "earned", "received",
    "salary", "todo", "add task", "add a task", "new task", "note to self", "meeting",
];

const PROMPT: &str = "You extract one household record from a user's message. \
Types: purchase (money spent), income (money received), task, reminder, meeting, note, other. \
Use the amount and currency exactly as stated; use ISO currency codes (RUB, USD, EUR). \
Title is a short noun phrase in the user's language. Priority is one of low, medium, high, urgent. \
Set needsConfirmation when something essential is missing or ambiguous.";

pub struct EventCreationAgent {
    extractor: Extractor,
    entities: Arc<dyn EntityStore>,
    settings: AgentSettings,
}

impl EventCreationAgent {
    pub fn new(generator: Generator, entities: Arc<dyn EntityStore>, settings: AgentSettings) -> Self {
        Self {
            extractor: Extractor::new(generator, settings.min_extraction_confidence),
            entities,
            settings,
        }
    }
}

#[async_trait]
impl Agent for EventCreationAgent {
    fn name(&self) -> &str {
        "event_creation"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![
            AgentCapability::new("log_purchase", "Record money spent", "finance", 0.9),
            AgentCapability::new("log_income", "Record money received", "finance", 0.85),
            AgentCapability::new("create_task", "Add tasks, meetings and notes", "planning", 0.8),
        ]
    }

    async fn can_handle(&self, task: &AgentTask) -> bool {
        let wants_logging = task
            .context
            .classification
            .as_ref()
            .is_some_and(|c| c.wants_logging(CLASSIFIER_THRESHOLD));
        wants_logging || mentions_any(&task.input_lower(), KEYWORDS)
    }

    async fn process(&self, task: &AgentTask) -> Result<AgentResult> {
        let lang = Lang::detect(&task.input);
        let now = extraction::local_now(self.settings.utc_offset);
        let system = format!(
            "{PROMPT}\n{TEMPORAL_RULES}\n{}\nRespond with a single JSON object matching this schema: {}",
            extraction::current_time_line(now),
            extraction::entity_schema()
        );

        let (value, confidence) = match self.extractor.extract(&system, &task.input, &extraction::entity_schema()).await? {
            Extraction::Accepted { value, confidence } => (value, confidence),
            Extraction::Rejected { confidence } => {
                return Ok(AgentResult::failure(
                    format!("extraction confidence {confidence:.2} below {:.2}", self.extractor.min_confidence()),
                    lang.pick(
                        "Не уверен, что правильно понял. Уточните, пожалуйста, что записать?",
                        "I'm not sure I understood. Could you clarify what to record?",
                    ),
                )
                .with_confidence(confidence));
            }
        };

        let extracted: ExtractedEntity = serde_json::from_value(value)?;
        let entity = self.entities.create_entity(extracted.into_new_entity(task, now)).await?;
        info!(
            task_id = %task.id,
            entity_id = %entity.id,
            kind = entity.kind.as_str(),
            "Entity created"
        );

        Ok(AgentResult::success(acknowledgement(&entity, lang, self.settings))
            .with_data(json!({ "entity": entity }))
            .with_confidence(confidence))
    }
}

fn acknowledgement(entity: &Entity, lang: Lang, settings: AgentSettings) -> String {
    let what = match (lang, entity.kind) {
        (Lang::Ru, EventKind::Purchase) => "покупку",
        (Lang::Ru, EventKind::Income) => "доход",
        (Lang::Ru, EventKind::Task) => "задачу",
        (Lang::Ru, EventKind::Reminder) => "напоминание",
        (Lang::Ru, EventKind::Meeting) => "встречу",
        (Lang::Ru, EventKind::Note) => "заметку",
        (Lang::Ru, EventKind::Other) => "запись",
        (Lang::En, kind) => kind.as_str(),
    };

    let mut reply = match lang {
        Lang::Ru => format!("Записал {what} «{}»", entity.title),
        Lang::En => format!("Logged {what} \"{}\"", entity.title),
    };
    if let Some(amount) = entity.amount {
        reply.push_str(": ");
        reply.push_str(&format_amount(amount));
        if let Some(currency) = &entity.currency {
            reply.push(' ');
            reply.push_str(currency);
        }
    }
    if let Some(at) = entity.scheduled_at {
        let local = at.with_timezone(&settings.utc_offset);
        reply.push_str(&match lang {
            Lang::Ru => format!(", {}", local.format("%d.%m.%Y %H:%M")),
            Lang::En => format!(", {}", local.format("%Y-%m-%d %H:%M")),
        });
    }
    reply.push('.');
    if entity.needs_confirmation {
        reply.push(' ');
        reply.push_str(lang.pick("Проверьте, всё ли верно.", "Please check that this is right."));
    }
    reply
}

/// `45` rather than `45.0`, `45.5` kept.
pub(crate) fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{amount:.0}")
    } else {
        format!("{amount:.2}")
    }
}
