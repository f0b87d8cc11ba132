//! Reminders.
//!
//! Explicit reminder words claim the task outright. Otherwise, when the
//! message mentions a time, the generation service decides whether it is a
//! reminder; any failure there means "not mine".

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::agent::{Agent, AgentCapability, AgentResult};
use hearth_core::classification::MessageKind;
use hearth_core::entity::EventKind;
use hearth_core::error::{ProviderError, Result};
use hearth_core::store::EntityStore;
use hearth_core::structured::schema_for;
use hearth_core::task::AgentTask;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use super::extraction::{self, ExtractedEntity, Extraction, Extractor, TEMPORAL_RULES};
use super::{AgentSettings, Lang, mentions_any, temporal};
use crate::generation::Generator;

const KEYWORDS: &[&str] = &[
    "напомни*", "напоминани*", "не забыть", "не забудь", "remind*", "don't forget", "dont forget",
];

const DETECT_PROMPT: &str = "Decide whether the user is asking to be reminded about something at a \
particular time. Respond with a single JSON object and nothing else: \
{\"isReminder\": boolean, \"confidence\": number from 0 to 1}";

const PROMPT: &str = "You turn a user's request into a reminder. \
Title is what to remind about, as a short phrase in the user's language. \
Priority is one of low, medium, high, urgent. Always set type to \"reminder\". \
Put the moment to remind at in datetime.";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ReminderCheck {
    is_reminder: bool,
    #[schemars(range(min = 0, max = 1))]
    confidence: f32,
}

pub struct ReminderAgent {
    generator: Generator,
    extractor: Extractor,
    entities: Arc<dyn EntityStore>,
    settings: AgentSettings,
}

impl ReminderAgent {
    pub fn new(generator: Generator, entities: Arc<dyn EntityStore>, settings: AgentSettings) -> Self {
        Self {
            extractor: Extractor::new(generator.clone(), settings.min_extraction_confidence),
            generator,
            entities,
            settings,
        }
    }

    async fn looks_like_reminder(&self, task: &AgentTask) -> bool {
        let schema = schema_for::<ReminderCheck>();
        let check = self
            .generator
            .object(DETECT_PROMPT, &task.input, &schema, 0.0)
            .await
            .and_then(|value| {
                serde_json::from_value::<ReminderCheck>(value).map_err(|e| ProviderError::InvalidOutput(e.to_string()))
            });
        match check {
            Ok(ReminderCheck { is_reminder, confidence }) => {
                debug!(task_id = %task.id, is_reminder, confidence, "Reminder check");
                is_reminder && confidence >= self.settings.min_extraction_confidence
            }
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Reminder check failed, declining task");
                false
            }
        }
    }
}

#[async_trait]
impl Agent for ReminderAgent {
    fn name(&self) -> &str {
        "reminder"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "schedule_reminder",
            "Remember something and remind at a given time",
            "planning",
            0.85,
        )]
    }

    async fn can_handle(&self, task: &AgentTask) -> bool {
        if mentions_any(&task.input_lower(), KEYWORDS) {
            return true;
        }

        let classified_reminder = task.context.classification.as_ref().is_some_and(|c| {
            c.kind() == MessageKind::Event && c.message_type.subtype.as_deref() == Some("reminder")
        });
        if classified_reminder {
            return true;
        }

        let now = extraction::local_now(self.settings.utc_offset);
        temporal::mentions_time(&task.input, now) && self.looks_like_reminder(task).await
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
                        "Не понял, о чём напомнить. Сформулируйте, пожалуйста, иначе.",
                        "I didn't get what to remind you about. Could you rephrase?",
                    ),
                )
                .with_confidence(confidence));
            }
        };

        let mut extracted: ExtractedEntity = serde_json::from_value(value)?;
        extracted.kind = EventKind::Reminder.as_str().into();
        let fields = extracted.into_new_entity(task, now);

        let Some(at) = fields.scheduled_at else {
            return Ok(AgentResult::failure(
                "reminder has no resolvable time",
                lang.pick("Когда напомнить?", "When should I remind you?"),
            )
            .with_confidence(confidence));
        };

        let entity = self.entities.create_entity(fields).await?;
        info!(task_id = %task.id, entity_id = %entity.id, at = %at, "Reminder scheduled");

        let local = at.with_timezone(&self.settings.utc_offset);
        let reply = match lang {
            Lang::Ru => format!("Напомню: «{}» — {}.", entity.title, local.format("%d.%m.%Y %H:%M")),
            Lang::En => format!("I'll remind you: \"{}\" at {}.", entity.title, local.format("%Y-%m-%d %H:%M")),
        };

        Ok(AgentResult::success(reply)
            .with_data(json!({ "entity": entity }))
            .with_confidence(confidence))
    }
}
