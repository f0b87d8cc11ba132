//! Retrieval of logged records ("show my purchases this week").

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::agent::{Agent, AgentCapability, AgentResult};
use hearth_core::classification::MessageKind;
use hearth_core::entity::{Entity, EventKind};
use hearth_core::error::Result;
use hearth_core::store::EntityStore;
use hearth_core::task::AgentTask;
use serde_json::json;
use tracing::debug;

use super::event_creation::format_amount;
use super::extraction::{self, Extraction, Extractor};
use super::query::{QUERY_INSTRUCTIONS, QuerySpec, query_schema};
use super::{AgentSettings, Lang, mentions_any};
use crate::generation::Generator;

const DEFAULT_LIMIT: usize = 20;

const KEYWORDS: &[&str] = &[
    "покажи", "список", "что я купил*", "что я покупал*", "мои задачи", "мои покупки",
    "мои напоминания", "какие задачи", "какие покупки", "найди", "show", "list", "what did i buy",
    "my tasks", "my purchases", "my reminders", "find",
];

/// Classified subtypes that name a kind of stored record.
const RECORD_SUBTYPES: &[&str] = &["purchase", "income", "task", "reminder", "meeting", "note"];

pub struct DataQueryAgent {
    extractor: Extractor,
    entities: Arc<dyn EntityStore>,
    settings: AgentSettings,
}

impl DataQueryAgent {
    pub fn new(generator: Generator, entities: Arc<dyn EntityStore>, settings: AgentSettings) -> Self {
        Self {
            extractor: Extractor::new(generator, settings.min_extraction_confidence),
            entities,
            settings,
        }
    }
}

#[async_trait]
impl Agent for DataQueryAgent {
    fn name(&self) -> &str {
        "data_query"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![AgentCapability::new(
            "list_records",
            "Find and list logged purchases, tasks, reminders and notes",
            "retrieval",
            0.8,
        )]
    }

    async fn can_handle(&self, task: &AgentTask) -> bool {
        if mentions_any(&task.input_lower(), KEYWORDS) {
            return true;
        }
        task.context.classification.as_ref().is_some_and(|c| {
            c.kind() == MessageKind::Question
                && c.relevance.relevant
                && c.is_confident(0.7)
                && c.message_type
                    .subtype
                    .as_deref()
                    .is_some_and(|s| RECORD_SUBTYPES.contains(&s))
        })
    }

    async fn process(&self, task: &AgentTask) -> Result<AgentResult> {
        let lang = Lang::detect(&task.input);
        let now = extraction::local_now(self.settings.utc_offset);
        let system = format!("{QUERY_INSTRUCTIONS}\n{}", extraction::current_time_line(now));

        let (value, confidence) = match self.extractor.extract(&system, &task.input, &query_schema()).await? {
            Extraction::Accepted { value, confidence } => (value, confidence),
            Extraction::Rejected { confidence } => {
                return Ok(AgentResult::failure(
                    format!("query confidence {confidence:.2} below {:.2}", self.extractor.min_confidence()),
                    lang.pick(
                        "Не понял, что именно показать. Уточните, пожалуйста.",
                        "I'm not sure what to look up. Could you be more specific?",
                    ),
                )
                .with_confidence(confidence));
            }
        };

        let spec: QuerySpec = serde_json::from_value(value)?;
        let query = spec.to_entity_query(task, now, DEFAULT_LIMIT);
        let found = self.entities.list_entities(&query).await?;
        debug!(task_id = %task.id, period = spec.period.as_str(), found = found.len(), "Entities listed");

        let reply = if found.is_empty() {
            lang.pick("Ничего не нашлось за этот период.", "Nothing found for that period.")
                .to_string()
        } else {
            let header = match lang {
                Lang::Ru => format!("Нашлось записей: {}", found.len()),
                Lang::En => format!("Found {} record(s)", found.len()),
            };
            let lines: Vec<String> = found.iter().map(|e| describe(e, self.settings)).collect();
            format!("{header}\n{}", lines.join("\n"))
        };

        Ok(AgentResult::success(reply)
            .with_data(json!({ "count": found.len(), "entities": found }))
            .with_confidence(confidence))
    }
}

/// One listing line: `• 17.10 Хлеб: 45 RUB [purchase]`.
fn describe(entity: &Entity, settings: AgentSettings) -> String {
    let when = entity
        .scheduled_at
        .unwrap_or(entity.created_at)
        .with_timezone(&settings.utc_offset);
    let mut line = format!("• {} {}", when.format("%d.%m %H:%M"), entity.title);
    if let Some(amount) = entity.amount {
        line.push_str(&format!(": {}", format_amount(amount)));
        if let Some(currency) = &entity.currency {
            line.push(' ');
            line.push_str(currency);
        }
    }
    if entity.kind != EventKind::Other {
        line.push_str(&format!(" [{}]", entity.kind.as_str()));
    }
    line
}
