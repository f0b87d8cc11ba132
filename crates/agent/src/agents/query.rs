//! Query extraction shared by the data-retrieval and statistics agents.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use hearth_core::entity::{EntityQuery, EventKind};
use hearth_core::structured::schema_for;
use hearth_core::task::AgentTask;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reporting period, in the user's local calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Yesterday,
    /// Since Monday of the current week
    Week,
    /// Since the first day of the current month
    Month,
    /// Since January 1st
    Year,
    #[default]
    All,
}

impl Period {
    /// `[since, until)` bounds in UTC.
    pub fn bounds(self, now: DateTime<FixedOffset>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let today = now.date_naive();
        let start = |date: NaiveDate| {
            now.offset()
                .from_local_datetime(&date.and_time(chrono::NaiveTime::default()))
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        };

        match self {
            Period::Today => (start(today), None),
            Period::Yesterday => (start(today - Duration::days(1)), start(today)),
            Period::Week => (
                start(today - Duration::days(i64::from(today.weekday().num_days_from_monday()))),
                None,
            ),
            Period::Month => (start(today.with_day(1).unwrap_or(today)), None),
            Period::Year => (start(today.with_ordinal(1).unwrap_or(today)), None),
            Period::All => (None, None),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Today => "today",
            Period::Yesterday => "yesterday",
            Period::Week => "week",
            Period::Month => "month",
            Period::Year => "year",
            Period::All => "all",
        }
    }
}

pub fn query_schema() -> Value {
    schema_for::<QuerySpec>()
}

pub const QUERY_INSTRUCTIONS: &str = "Turn the user's request about their household records into a query. \
Respond with a single JSON object and nothing else:\n\
{\"kinds\": array of purchase | income | task | reminder | meeting | note | other (empty for all), \
\"period\": \"today\" | \"yesterday\" | \"week\" | \"month\" | \"year\" | \"all\", \
\"category\": string or null, \"limit\": integer or null, \
\"confidence\": number from 0 to 1 (how sure you are about this reading)}";

/// An extracted query.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QuerySpec {
    #[serde(default)]
    pub kinds: Vec<EventKind>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub limit: Option<usize>,
    #[schemars(range(min = 0, max = 1))]
    pub confidence: f32,
}

impl QuerySpec {
    /// Entity query scoped to the task's household (or user).
    pub fn to_entity_query(&self, task: &AgentTask, now: DateTime<FixedOffset>, default_limit: usize) -> EntityQuery {
        let (since, until) = self.period.bounds(now);
        EntityQuery {
            user_id: task.context.user_id.clone(),
            household_id: task.context.household_id.clone(),
            kinds: self.kinds.clone(),
            since,
            until,
            category: self
                .category
                .as_ref()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty()),
            limit: self.limit.unwrap_or(default_limit),
        }
    }
}
