//! Agent registry and router.
//!
//! ```text
//!   task ──► agent 1 ──no──► agent 2 ──no──► … ──no──► fallback
//!              │yes            │yes
//!              ▼               ▼
//!           process         process
//! ```
//!
//! First match in registration order wins; exactly one agent processes a
//! task. The fallback agent takes whatever nobody claims.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hearth_core::agent::{Agent, AgentCapability};
use hearth_core::error::{Error, Result};
use hearth_core::task::AgentTask;
use serde::Serialize;
use tracing::debug;

/// The agent chosen for a task.
#[derive(Clone)]
pub struct Route {
    pub agent: Arc<dyn Agent>,
    /// Whether no registered agent claimed the task
    pub fallback: bool,
}

/// Introspection view of one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub fallback: bool,
    pub capabilities: Vec<AgentCapability>,
    /// Tasks routed to this agent since startup
    pub routed: u64,
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
    fallback: Option<Arc<dyn Agent>>,
    routed: Mutex<HashMap<String, u64>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent after the ones already registered.
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        self.agents.push(agent);
    }

    /// Set the agent used when no registered agent claims a task.
    pub fn set_fallback(&mut self, agent: Arc<dyn Agent>) {
        self.fallback = Some(agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len() + usize::from(self.fallback.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the agent for `task`.
    pub async fn route(&self, task: &AgentTask) -> Result<Route> {
        for agent in &self.agents {
            if agent.can_handle(task).await {
                debug!(task_id = %task.id, agent = agent.name(), "Routed task");
                self.count(agent.name());
                return Ok(Route {
                    agent: agent.clone(),
                    fallback: false,
                });
            }
        }

        match &self.fallback {
            Some(agent) => {
                debug!(task_id = %task.id, agent = agent.name(), "No agent matched, using fallback");
                self.count(agent.name());
                Ok(Route {
                    agent: agent.clone(),
                    fallback: true,
                })
            }
            None => Err(Error::NoAgent(task.id.clone())),
        }
    }

    fn count(&self, name: &str) {
        let mut routed = self.routed.lock().unwrap_or_else(|e| e.into_inner());
        *routed.entry(name.to_string()).or_default() += 1;
    }

    /// Every agent in routing order, fallback last.
    pub fn summaries(&self) -> Vec<AgentSummary> {
        let routed = self.routed.lock().unwrap_or_else(|e| e.into_inner());
        let summary = |agent: &Arc<dyn Agent>, fallback: bool| AgentSummary {
            name: agent.name().to_string(),
            fallback,
            capabilities: agent.capabilities(),
            routed: routed.get(agent.name()).copied().unwrap_or(0),
        };

        self.agents
            .iter()
            .map(|a| summary(a, false))
            .chain(self.fallback.iter().map(|a| summary(a, true)))
            .collect()
    }

    /// Tasks routed per agent name.
    pub fn routed_counts(&self) -> HashMap<String, u64> {
        self.routed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearth_core::agent::AgentResult;
    use hearth_core::task::TaskContext;

    struct KeywordAgent {
        name: &'static str,
        keyword: &'static str,
    }

    #[async_trait]
    impl Agent for KeywordAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> Vec<AgentCapability> {
            vec![AgentCapability::new(self.name, "test", "test", 1.0)]
        }

        async fn can_handle(&self, task: &AgentTask) -> bool {
            task.input_lower().contains(self.keyword)
        }

        async fn process(&self, _task: &AgentTask) -> Result<AgentResult> {
            Ok(AgentResult::success(self.name))
        }
    }

    fn agent(name: &'static str, keyword: &'static str) -> Arc<dyn Agent> {
        Arc::new(KeywordAgent { name, keyword })
    }

    fn task(input: &str) -> AgentTask {
        AgentTask::new(input, TaskContext::default())
    }

    #[tokio::test]
    async fn first_match_in_registration_order_wins() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("stats", "потратил"));
        registry.register(agent("events", "потратил"));
        registry.set_fallback(agent("general", ""));

        let route = registry.route(&task("Сколько я потратил?")).await.unwrap();
        assert_eq!(route.agent.name(), "stats");
        assert!(!route.fallback);
    }

    #[tokio::test]
    async fn unmatched_task_goes_to_fallback() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("events", "купил"));
        registry.set_fallback(agent("general", ""));

        let route = registry.route(&task("как дела")).await.unwrap();
        assert_eq!(route.agent.name(), "general");
        assert!(route.fallback);
    }

    #[tokio::test]
    async fn no_fallback_is_an_error() {
        let registry = AgentRegistry::new();
        let err = registry.route(&task("hi")).await.err().unwrap();
        assert!(matches!(err, Error::NoAgent(_)));
    }

    #[tokio::test]
    async fn routing_is_counted_per_agent() {
        let mut registry = AgentRegistry::new();
        registry.register(agent("events", "купил"));
        registry.set_fallback(agent("general", ""));

        registry.route(&task("купил хлеб")).await.unwrap();
        registry.route(&task("купил молоко")).await.unwrap();
        registry.route(&task("привет")).await.unwrap();

        let counts = registry.routed_counts();
        assert_eq!(counts["events"], 2);
        assert_eq!(counts["general"], 1);

        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 2);
        assert!(summaries[1].fallback);
        assert_eq!(summaries[0].routed, 2);
        assert_eq!(registry.len(), 2);
    }
}
