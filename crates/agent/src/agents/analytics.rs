//! Spending and activity statistics.
//!
//! Totals are computed locally from stored entities; the generation service
//! only turns them into prose.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::agent::{Agent, AgentCapability, AgentResult};
use hearth_core::entity::{Entity, EventKind};
use hearth_core::error::Result;
use hearth_core::store::EntityStore;
use hearth_core::task::AgentTask;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::event_creation::format_amount;
use super::extraction::{self, Extraction, Extractor};
use super::query::{Period, QUERY_INSTRUCTIONS, QuerySpec, query_schema};
use super::{AgentSettings, Lang, mentions_any};
use crate::generation::Generator;

const SCAN_LIMIT: usize = 1000;
const TOP_CATEGORIES: usize = 5;

const KEYWORDS: &[&str] = &[
    "статистик*", "аналитик*", "сколько потратил*", "сколько я потратил*", "сколько ушло",
    "сколько заработал*", "итого", "отчёт*", "отчет*", "расход*", "траты", "statistics", "stats",
    "how much did i spend", "how much have i spent", "spending", "summary", "report", "breakdown",
];

const NARRATIVE_PROMPT: &str = "You are a household finance assistant. Answer the user's question \
using only the statistics provided. Be brief (two to four sentences), mention concrete numbers with \
their currencies, and answer in the language of the question.";

/// Money spent per category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub currency: String,
    pub amount: f64,
}

/// Aggregates over a set of entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub period: String,
    pub entity_count: usize,
    pub by_kind: BTreeMap<String, usize>,
    /// Purchases per currency
    pub spending: BTreeMap<String, f64>,
    /// Income per currency
    pub income: BTreeMap<String, f64>,
    pub top_categories: Vec<CategoryTotal>,
}

impl Summary {
    pub fn compute(period: Period, entities: &[Entity]) -> Self {
        let mut summary = Summary {
            period: period.as_str().into(),
            entity_count: entities.len(),
            ..Default::default()
        };
        let mut categories: BTreeMap<(String, String), f64> = BTreeMap::new();

        for entity in entities {
            *summary.by_kind.entry(entity.kind.as_str().into()).or_default() += 1;

            let Some(amount) = entity.amount else { continue };
            let currency = entity.currency.clone().unwrap_or_else(|| "?".into());
            match entity.kind {
                EventKind::Purchase => {
                    *summary.spending.entry(currency.clone()).or_default() += amount;
                    let category = entity.category.clone().unwrap_or_else(|| "other".into());
                    *categories.entry((category, currency)).or_default() += amount;
                }
                EventKind::Income => *summary.income.entry(currency).or_default() += amount,
                _ => {}
            }
        }

        let mut top: Vec<CategoryTotal> = categories
            .into_iter()
            .map(|((category, currency), amount)| CategoryTotal {
                category,
                currency,
                amount,
            })
            .collect();
        top.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        top.truncate(TOP_CATEGORIES);
        summary.top_categories = top;
        summary
    }

    /// Plain-text rendering used when no narrative is available.
    pub fn describe(&self, lang: Lang) -> String {
        if self.entity_count == 0 {
            return lang
                .pick("За этот период записей нет.", "No records for that period.")
                .into();
        }
        let money = |totals: &BTreeMap<String, f64>| {
            totals
                .iter()
                .map(|(currency, amount)| format!("{} {currency}", format_amount(*amount)))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut parts = vec![match lang {
            Lang::Ru => format!("Записей: {}", self.entity_count),
            Lang::En => format!("Records: {}", self.entity_count),
        }];
        if !self.spending.is_empty() {
            parts.push(format!("{}: {}", lang.pick("Расходы", "Spent"), money(&self.spending)));
        }
        if !self.income.is_empty() {
            parts.push(format!("{}: {}", lang.pick("Доходы", "Income"), money(&self.income)));
        }
        if let Some(top) = self.top_categories.first() {
            parts.push(format!(
                "{}: {} ({} {})",
                lang.pick("Больше всего", "Top category"),
                top.category,
                format_amount(top.amount),
                top.currency
            ));
        }
        parts.join(". ") + "."
    }
}

pub struct AnalyticsAgent {
    generator: Generator,
    extractor: Extractor,
    entities: Arc<dyn EntityStore>,
    settings: AgentSettings,
}

impl AnalyticsAgent {
    pub fn new(generator: Generator, entities: Arc<dyn EntityStore>, settings: AgentSettings) -> Self {
        Self {
            extractor: Extractor::new(generator.clone(), settings.min_extraction_confidence),
            generator,
            entities,
            settings,
        }
    }
}

#[async_trait]
impl Agent for AnalyticsAgent {
    fn name(&self) -> &str {
        "analytics"
    }

    fn capabilities(&self) -> Vec<AgentCapability> {
        vec![
            AgentCapability::new("spending_summary", "Totals of spending and income by period", "finance", 0.85),
            AgentCapability::new("category_breakdown", "Where the money went, by category", "finance", 0.75),
        ]
    }

    async fn can_handle(&self, task: &AgentTask) -> bool {
        mentions_any(&task.input_lower(), KEYWORDS)
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
                        "Уточните, пожалуйста, за какой период и что посчитать.",
                        "Which period and what exactly should I count?",
                    ),
                )
                .with_confidence(confidence));
            }
        };

        let spec: QuerySpec = serde_json::from_value(value)?;
        let entities = self
            .entities
            .list_entities(&spec.to_entity_query(task, now, SCAN_LIMIT))
            .await?;
        let summary = Summary::compute(spec.period, &entities);
        debug!(task_id = %task.id, period = %summary.period, entities = summary.entity_count, "Statistics computed");

        let user = format!(
            "Question: {}\nStatistics (JSON): {}{}",
            task.input,
            serde_json::to_string(&summary)?,
            task.revision_prompt().unwrap_or_default()
        );
        let narrative = self
            .generator
            .text(NARRATIVE_PROMPT, &user, self.settings.reply_temperature)
            .await?;
        let reply = if narrative.is_empty() {
            summary.describe(lang)
        } else {
            narrative
        };

        Ok(AgentResult::success(reply)
            .with_data(json!({ "summary": summary }))
            .with_confidence(confidence))
    }

    fn refinable(&self) -> bool {
        true
    }
}
