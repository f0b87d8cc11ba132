//! Structured entities extracted from natural language: purchases, tasks,
//! reminders and the like. Agents create them; the entity store persists
//! them; the data-retrieval and statistics agents read them back.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What kind of household event an entity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Purchase,
    Income,
    Task,
    Reminder,
    Meeting,
    Note,
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Purchase,
        EventKind::Income,
        EventKind::Task,
        EventKind::Reminder,
        EventKind::Meeting,
        EventKind::Note,
        EventKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Purchase => "purchase",
            EventKind::Income => "income",
            EventKind::Task => "task",
            EventKind::Reminder => "reminder",
            EventKind::Meeting => "meeting",
            EventKind::Note => "note",
            EventKind::Other => "other",
        }
    }

    /// Parse a kind name; `expense` is accepted as an alias of `purchase`.
    /// Unknown names map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "purchase" | "expense" => EventKind::Purchase,
            "income" => EventKind::Income,
            "task" => EventKind::Task,
            "reminder" => EventKind::Reminder,
            "meeting" => EventKind::Meeting,
            "note" => EventKind::Note,
            _ => EventKind::Other,
        }
    }

    /// Whether entities of this kind carry a money amount.
    pub fn is_financial(&self) -> bool {
        matches!(self, EventKind::Purchase | EventKind::Income)
    }
}

/// Task / reminder priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// Exact-match table, checked first.
const PRIORITY_EXACT: &[(&str, Priority)] = &[
    ("low", Priority::Low),
    ("низкий", Priority::Low),
    ("низкая", Priority::Low),
    ("неважно", Priority::Low),
    ("не срочно", Priority::Low),
    ("not urgent", Priority::Low),
    ("medium", Priority::Medium),
    ("normal", Priority::Medium),
    ("средний", Priority::Medium),
    ("средняя", Priority::Medium),
    ("обычный", Priority::Medium),
    ("обычная", Priority::Medium),
    ("high", Priority::High),
    ("important", Priority::High),
    ("высокий", Priority::High),
    ("высокая", Priority::High),
    ("важно", Priority::High),
    ("важный", Priority::High),
    ("urgent", Priority::Urgent),
    ("asap", Priority::Urgent),
    ("critical", Priority::Urgent),
    ("срочно", Priority::Urgent),
    ("срочный", Priority::Urgent),
    ("срочная", Priority::Urgent),
    ("критично", Priority::Urgent),
    ("немедленно", Priority::Urgent),
];

/// Substring fallback, in order. Negated phrases come before the words they
/// contain ("не срочно" before "срочн").
const PRIORITY_CONTAINS: &[(&str, Priority)] = &[
    ("не срочн", Priority::Low),
    ("not urgent", Priority::Low),
    ("неважн", Priority::Low),
    ("не важн", Priority::Low),
    ("low", Priority::Low),
    ("низк", Priority::Low),
    ("urgent", Priority::Urgent),
    ("asap", Priority::Urgent),
    ("срочн", Priority::Urgent),
    ("критич", Priority::Urgent),
    ("critical", Priority::Urgent),
    ("high", Priority::High),
    ("important", Priority::High),
    ("высок", Priority::High),
    ("важн", Priority::High),
    ("medium", Priority::Medium),
    ("normal", Priority::Medium),
    ("средн", Priority::Medium),
    ("обычн", Priority::Medium),
];

/// Map a free-text priority word to a [`Priority`].
///
/// Case-insensitive and whitespace-trimmed; exact table first, then
/// substring matching. Unrecognized input yields `Medium` and a warning,
/// never an error.
pub fn map_priority(raw: &str) -> Priority {
    let normalized = raw.trim().to_lowercase();

    if let Some((_, p)) = PRIORITY_EXACT.iter().find(|(word, _)| *word == normalized) {
        return *p;
    }

    if let Some((_, p)) = PRIORITY_CONTAINS
        .iter()
        .find(|(needle, _)| normalized.contains(needle))
    {
        return *p;
    }

    if !normalized.is_empty() {
        warn!(value = %raw, "Unrecognized priority, defaulting to medium");
    }
    Priority::Medium
}

/// A persisted household entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EventKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// When the event happens / is due (reminders, tasks, meetings)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<String>,
    /// Extraction confidence in [0, 1]
    pub confidence: f32,
    pub needs_confirmation: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating an entity; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub kind: EventKind,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Priority,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub user_id: String,
    pub household_id: Option<String>,
    pub confidence: f32,
    pub needs_confirmation: bool,
}

impl NewEntity {
    /// Materialize into an [`Entity`] with the given id and creation time.
    pub fn into_entity(self, id: String, created_at: DateTime<Utc>) -> Entity {
        Entity {
            id,
            kind: self.kind,
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            amount: self.amount,
            currency: self.currency,
            scheduled_at: self.scheduled_at,
            tags: self.tags,
            user_id: self.user_id,
            household_id: self.household_id,
            confidence: self.confidence,
            needs_confirmation: self.needs_confirmation,
            created_at,
        }
    }
}

/// Filter for reading entities back.
///
/// Scope is the household when `household_id` is set, otherwise the user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityQuery {
    pub user_id: String,
    #[serde(default)]
    pub household_id: Option<String>,
    /// Empty = all kinds
    #[serde(default)]
    pub kinds: Vec<EventKind>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_query_limit")]
    pub limit: usize,
}

fn default_query_limit() -> usize {
    200
}

impl EntityQuery {
    /// Whether `entity` passes every filter in this query.
    ///
    /// Time filters apply to `created_at`; category compares case-insensitively.
    pub fn matches(&self, entity: &Entity) -> bool {
        let in_scope = match &self.household_id {
            Some(h) => entity.household_id.as_deref() == Some(h.as_str()),
            None => entity.user_id == self.user_id,
        };
        in_scope
            && (self.kinds.is_empty() || self.kinds.contains(&entity.kind))
            && self.since.is_none_or(|s| entity.created_at >= s)
            && self.until.is_none_or(|u| entity.created_at < u)
            && self.category.as_ref().is_none_or(|c| {
                entity
                    .category
                    .as_ref()
                    .is_some_and(|ec| ec.to_lowercase() == c.to_lowercase())
            })
    }
}
