//! Structured extraction shared by the entity and query agents.
//!
//! Each agent sends its own prompt and schema; every schema carries a
//! `confidence` in [0, 1], and anything below the configured minimum is
//! rejected rather than persisted.

use chrono::{DateTime, FixedOffset, Utc};
use hearth_core::entity::{EventKind, NewEntity, map_priority};
use hearth_core::error::ProviderError;
use hearth_core::structured::schema_for;
use hearth_core::task::AgentTask;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::temporal;
use crate::generation::Generator;

/// Temporal rules given to every extraction prompt.
pub const TEMPORAL_RULES: &str = "Temporal rules: \"tomorrow\" means the next calendar day at 09:00 local time; \
\"today\" without an explicit time means today at 18:00 local time; \
\"in an hour\" means now plus one hour; \
a bare weekday name means the nearest upcoming occurrence of that weekday at 09:00. \
Write timestamps as ISO 8601 local date-time without offset (YYYY-MM-DDTHH:MM:SS).";

const EXTRACTION_TEMPERATURE: f32 = 0.1;

/// The outcome of one extraction call.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Accepted { value: Value, confidence: f32 },
    Rejected { confidence: f32 },
}

#[derive(Clone)]
pub struct Extractor {
    generator: Generator,
    min_confidence: f32,
}

impl Extractor {
    pub fn new(generator: Generator, min_confidence: f32) -> Self {
        Self {
            generator,
            min_confidence,
        }
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Run one extraction. Generation failures propagate.
    pub async fn extract(&self, system: &str, user: &str, schema: &Value) -> Result<Extraction, ProviderError> {
        let value = self
            .generator
            .object(system, user, schema, EXTRACTION_TEMPERATURE)
            .await?;
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as f32;

        if confidence < self.min_confidence {
            debug!(confidence, min = self.min_confidence, "Extraction rejected");
            Ok(Extraction::Rejected { confidence })
        } else {
            Ok(Extraction::Accepted { value, confidence })
        }
    }
}

/// Schema for an extracted household entity.
pub fn entity_schema() -> Value {
    schema_for::<ExtractedEntity>()
}

/// Extracted entity fields, as the generation service returns them.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntity {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Kind name; `expense` is read as `purchase`
    #[serde(rename = "type")]
    #[schemars(extend("enum" = ["purchase", "expense", "income", "task", "reminder", "meeting", "note", "other"]))]
    pub kind: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    #[schemars(range(min = 0))]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[schemars(range(min = 0, max = 1))]
    pub confidence: f32,
    #[serde(default)]
    pub needs_confirmation: bool,
}

impl ExtractedEntity {
    /// Normalize into store fields for the task's user.
    ///
    /// A missing or unparseable timestamp falls back to the temporal rules
    /// applied to the raw input.
    pub fn into_new_entity(self, task: &AgentTask, now: DateTime<FixedOffset>) -> NewEntity {
        let kind = EventKind::parse(&self.kind);
        let scheduled_at = match kind {
            EventKind::Purchase | EventKind::Income | EventKind::Note => self
                .datetime
                .as_deref()
                .and_then(|raw| temporal::parse_timestamp(raw, *now.offset())),
            _ => temporal::resolve(self.datetime.as_deref(), &task.input, now),
        };

        NewEntity {
            kind,
            title: self.title.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            category: self.category.map(|c| c.trim().to_lowercase()).filter(|c| !c.is_empty()),
            priority: map_priority(self.priority.as_deref().unwrap_or_default()),
            amount: self.amount,
            currency: self.currency.as_deref().and_then(normalize_currency),
            scheduled_at,
            tags: self.tags,
            user_id: task.context.user_id.clone(),
            household_id: task.context.household_id.clone(),
            confidence: self.confidence,
            needs_confirmation: self.needs_confirmation || (kind.is_financial() && self.amount.is_none()),
        }
    }
}

/// Map currency words and symbols to ISO codes.
pub fn normalize_currency(raw: &str) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let code = if lower == "₽" || lower == "р" || lower.starts_with("rub") || lower.starts_with("руб") {
        "RUB"
    } else if lower == "$" || lower.starts_with("usd") || lower.starts_with("dollar") || lower.starts_with("доллар") {
        "USD"
    } else if lower == "€" || lower.starts_with("eur") || lower.starts_with("евро") {
        "EUR"
    } else {
        return Some(raw.trim().to_uppercase());
    };
    Some(code.to_string())
}

/// Prompt line stating the current local time.
pub fn current_time_line(now: DateTime<FixedOffset>) -> String {
    format!(
        "Current local date and time: {} ({}), UTC offset {}.",
        now.format("%Y-%m-%dT%H:%M:%S"),
        now.format("%A"),
        now.offset()
    )
}

/// `now` in the given offset.
pub fn local_now(offset: FixedOffset) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&offset)
}
