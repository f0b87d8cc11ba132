//! The request pipeline.
//!
//! ```text
//!  inbound ─► validate ─► rate limit ─► conversation ─► context ─► fast path ──served──► persist ─► reply
//!                                                                      │
//!                                                                      ▼ full processing
//!                        reply ◄─ persist ◄─ quality ◄─ agent ◄─ route ◄─ classify
//! ```
//!
//! Context is assembled before anything reaches the generation service. The
//! fast path then answers trivial messages without a classification call.
//!
//! Exactly one agent processes a routed task. Nothing is retried: a failed
//! stage aborts the request with an [`Error::Pipeline`] that names the stage,
//! the task, the channel and a truncated copy of the input. [`Orchestrator::respond`]
//! turns that into the single generic message users see.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hearth_config::AppConfig;
use hearth_core::channel::{InboundMessage, OutboundReply};
use hearth_core::error::{Error, PipelineStage, Result, truncate_for_log};
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::message::{ConversationId, Role};
use hearth_core::provider::Provider;
use hearth_core::store::{ConversationStore, EntityStore};
use hearth_core::task::{AgentTask, TaskContext};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::{AgentSettings, standard_registry};
use crate::classifier::Classifier;
use crate::context::ContextAssembler;
use crate::fast_response::{FastPathSettings, FastPathStats, FastResponseCache};
use crate::generation::Generator;
use crate::quality::{LlmJudge, QualityController, QualityJudge};
use crate::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::registry::{AgentRegistry, AgentSummary};

/// Model recorded on assistant messages answered by the fast path.
pub const FAST_PATH_MODEL: &str = "fast-path";

/// The outcome of one handled message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    pub task_id: String,
    /// Agent that produced the reply; `None` for the fast path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub fast_path: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
}

/// The collaborators an orchestrator is assembled from.
pub struct OrchestratorParts {
    pub conversations: Arc<dyn ConversationStore>,
    pub assembler: ContextAssembler,
    pub classifier: Classifier,
    pub fast_path: FastResponseCache,
    pub registry: AgentRegistry,
    pub quality: QualityController,
    pub rate_limiter: Arc<RateLimiter>,
    pub chat_limit: RateLimitPolicy,
    pub events: Arc<EventBus>,
    /// Model name recorded on assistant messages
    pub model: String,
}

pub struct Orchestrator {
    conversations: Arc<dyn ConversationStore>,
    assembler: ContextAssembler,
    classifier: Classifier,
    fast_path: FastResponseCache,
    registry: AgentRegistry,
    quality: QualityController,
    rate_limiter: Arc<RateLimiter>,
    chat_limit: RateLimitPolicy,
    events: Arc<EventBus>,
    model: String,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            conversations: parts.conversations,
            assembler: parts.assembler,
            classifier: parts.classifier,
            fast_path: parts.fast_path,
            registry: parts.registry,
            quality: parts.quality,
            rate_limiter: parts.rate_limiter,
            chat_limit: parts.chat_limit,
            events: parts.events,
            model: parts.model,
        }
    }

    /// Wire the standard pipeline from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        conversations: Arc<dyn ConversationStore>,
        entities: Arc<dyn EntityStore>,
        rate_limiter: Arc<RateLimiter>,
        events: Arc<EventBus>,
    ) -> Self {
        let base = Generator::new(provider, &config.default_model).with_max_tokens(config.default_max_tokens);
        let classifier_gen = base.clone().with_timeout(Duration::from_secs(config.classifier.timeout_secs));
        let fast_gen = base.clone().with_timeout(Duration::from_secs(config.fast_path.timeout_secs));
        let agent_gen = base.with_timeout(Duration::from_secs(config.agents.timeout_secs));

        let settings = AgentSettings::from_config(&config.agents, config.default_temperature);
        let judge: Arc<dyn QualityJudge> = Arc::new(LlmJudge::new(agent_gen.clone()));

        Self::new(OrchestratorParts {
            assembler: ContextAssembler::from_config(conversations.clone(), &config.context),
            conversations,
            classifier: Classifier::new(classifier_gen),
            fast_path: FastResponseCache::new(fast_gen, FastPathSettings::from(&config.fast_path)),
            registry: standard_registry(agent_gen, entities, settings),
            quality: QualityController::new(judge, &config.quality),
            rate_limiter,
            chat_limit: config.rate_limit.into(),
            events,
            model: config.default_model.clone(),
        })
    }

    pub fn agents(&self) -> Vec<AgentSummary> {
        self.registry.summaries()
    }

    pub fn fast_path_stats(&self) -> FastPathStats {
        self.fast_path.stats()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Handle a message and always produce something deliverable.
    ///
    /// Failures are reported through [`Self::report_failure`] and replaced by
    /// the user-facing text of the error.
    pub async fn respond(&self, inbound: &InboundMessage) -> OutboundReply {
        match self.handle(inbound).await {
            Ok(reply) => OutboundReply::new(reply.text),
            Err(e) => {
                self.report_failure(inbound, &e);
                OutboundReply::new(e.user_message())
            }
        }
    }

    /// Log a failed request with its task context and publish `RequestFailed`.
    pub fn report_failure(&self, inbound: &InboundMessage, err: &Error) {
        let task_id = match err {
            Error::Pipeline { task_id, .. } => task_id.clone(),
            _ => String::new(),
        };
        match err.root() {
            Error::Validation(_) | Error::RateLimited { .. } => warn!(
                channel = %inbound.channel,
                sender = %inbound.sender_id,
                error = %err,
                "Request rejected"
            ),
            _ => error!(
                task_id = %task_id,
                channel = %inbound.channel,
                input = %truncate_for_log(&inbound.text, 80),
                error = %err,
                "Request failed"
            ),
        }
        self.events.publish(DomainEvent::RequestFailed {
            task_id,
            channel: inbound.channel.clone(),
            error_message: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Run the full pipeline for one inbound message.
    pub async fn handle(&self, inbound: &InboundMessage) -> Result<Reply> {
        let started = Instant::now();
        validate(inbound)?;

        let limit_key = format!("{}:{}", inbound.channel, inbound.chat_key());
        self.rate_limiter.enforce(&limit_key, self.chat_limit)?;

        let task_id = Uuid::new_v4().to_string();
        let fail = |stage: PipelineStage| {
            let task_id = task_id.clone();
            move |e: Error| e.in_stage(stage, task_id, inbound.channel.clone(), &inbound.text)
        };

        self.events.publish(DomainEvent::MessageReceived {
            task_id: task_id.clone(),
            channel: inbound.channel.clone(),
            sender_id: inbound.sender_id.clone(),
            content_preview: truncate_for_log(&inbound.text, 80),
            timestamp: Utc::now(),
        });

        let conversation_id = self
            .conversations
            .find_or_create_conversation(&inbound.sender_id, &inbound.channel, inbound.chat_id.as_deref())
            .await
            .map_err(|e| fail(PipelineStage::Persistence)(e.into()))?;

        let (context, trim) = self
            .assembler
            .history_for(&conversation_id, &inbound.text)
            .await
            .map_err(|e| fail(PipelineStage::Context)(e.into()))?;
        debug!(task_id = %task_id, kept = trim.kept, dropped = trim.dropped, "Context assembled");

        let decision = self.fast_path.analyze(&inbound.text).await;
        if decision.should_send_fast {
            if let Some(text) = decision.fast_response.filter(|t| !t.trim().is_empty()) {
                self.persist_exchange(&conversation_id, &inbound.text, &text, FAST_PATH_MODEL)
                    .await
                    .map_err(fail(PipelineStage::Persistence))?;
                self.events.publish(DomainEvent::FastPathServed {
                    task_id: task_id.clone(),
                    confidence: decision.confidence,
                    timestamp: Utc::now(),
                });
                self.finish(&task_id, None, started);
                return Ok(Reply {
                    text,
                    task_id,
                    agent: None,
                    fast_path: true,
                    success: true,
                    data: None,
                    quality: None,
                });
            }
        }

        let classification = self.classifier.classify(&inbound.text).await;

        let task = AgentTask {
            id: task_id.clone(),
            input: inbound.text.clone(),
            context: TaskContext {
                user_id: inbound.sender_id.clone(),
                channel: inbound.channel.clone(),
                chat_id: inbound.chat_id.clone(),
                household_id: inbound.household_id.clone(),
                conversation_id: Some(conversation_id.0.clone()),
                message_history: context.messages,
                classification: Some(classification),
                ..Default::default()
            },
            created_at: Utc::now(),
        };

        let route = self.registry.route(&task).await.map_err(fail(PipelineStage::Routing))?;
        let agent_name = route.agent.name().to_string();
        self.events.publish(DomainEvent::AgentRouted {
            task_id: task_id.clone(),
            agent: agent_name.clone(),
            fallback: route.fallback,
            timestamp: Utc::now(),
        });

        let initial = route
            .agent
            .process(&task)
            .await
            .map_err(fail(PipelineStage::Processing))?;
        let outcome = self.quality.refine(route.agent.as_ref(), &task, initial).await;
        if outcome.iterations > 0 {
            debug!(task_id = %task_id, iterations = outcome.iterations, score = ?outcome.score, "Quality control revised reply");
        }
        let result = outcome.result;

        let text = match result.reply() {
            "" => Error::Internal(format!("agent {agent_name} produced no reply")).user_message(),
            reply => reply.to_string(),
        };

        self.persist_exchange(&conversation_id, &inbound.text, &text, &self.model)
            .await
            .map_err(fail(PipelineStage::Persistence))?;

        if let Some(entity) = result.data.as_ref().and_then(|d| d.get("entity")) {
            if let Some(entity_id) = entity.get("id").and_then(|v| v.as_str()) {
                self.events.publish(DomainEvent::EntityCreated {
                    task_id: task_id.clone(),
                    entity_id: entity_id.to_string(),
                    kind: entity.get("kind").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        self.finish(&task_id, Some(agent_name.clone()), started);
        Ok(Reply {
            text,
            task_id,
            agent: Some(agent_name),
            fast_path: false,
            success: result.success,
            data: result.data,
            quality: outcome.score,
        })
    }

    /// Save the user message and the reply. Saving either is required;
    /// refreshing the activity time is best effort.
    async fn persist_exchange(
        &self,
        conversation_id: &ConversationId,
        user_text: &str,
        reply: &str,
        model: &str,
    ) -> Result<()> {
        self.conversations
            .append_message(conversation_id, Role::User, user_text, None)
            .await?;
        self.conversations
            .append_message(conversation_id, Role::Assistant, reply, Some(model))
            .await?;
        if let Err(e) = self.conversations.touch_conversation(conversation_id).await {
            warn!(conversation = %conversation_id, error = %e, "Failed to update conversation activity");
        }
        Ok(())
    }

    fn finish(&self, task_id: &str, agent: Option<String>, started: Instant) {
        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            task_id = %task_id,
            agent = agent.as_deref().unwrap_or("fast-path"),
            duration_ms,
            "Reply ready"
        );
        self.events.publish(DomainEvent::ReplySent {
            task_id: task_id.to_string(),
            agent,
            duration_ms,
            timestamp: Utc::now(),
        });
    }
}

fn validate(inbound: &InboundMessage) -> Result<()> {
    if inbound.text.trim().is_empty() {
        return Err(Error::Validation("message text is empty".into()));
    }
    if inbound.sender_id.trim().is_empty() {
        return Err(Error::Validation("sender identity is missing".into()));
    }
    if inbound.channel.trim().is_empty() {
        return Err(Error::Validation("channel is missing".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use hearth_core::entity::{EntityQuery, EventKind};
    use hearth_core::error::ProviderError;
    use hearth_store::InMemoryStore;

    const NOT_FAST: &str = "{\"success\": true, \"shouldSendFast\": false, \"response\": null, \"confidence\": 0.9, \"processingType\": \"event\"}";
    const GREETING: &str = "{\"success\": true, \"shouldSendFast\": true, \"response\": \"Привет! Чем помочь?\", \"confidence\": 0.95, \"processingType\": \"greeting\"}";
    const PURCHASE_CLASS: &str = "{\"messageType\": {\"type\": \"event\", \"subtype\": \"purchase\", \"confidence\": 0.92, \"needLogging\": true}, \"relevance\": {\"relevant\": true, \"score\": 0.9, \"category\": \"finance\"}}";
    const PURCHASE: &str = "{\"title\": \"Хлеб\", \"type\": \"purchase\", \"category\": \"food\", \"amount\": 45, \"currency\": \"RUB\", \"tags\": [\"groceries\"], \"confidence\": 0.93, \"needsConfirmation\": false}";
    const CHAT_CLASS: &str = "{\"messageType\": {\"type\": \"chat\", \"confidence\": 0.8, \"needLogging\": false}, \"relevance\": {\"relevant\": false, \"score\": 0.1}}";

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.quality.enabled = false;
        config.rate_limit.limit = 3;
        config.rate_limit.window_ms = 60_000;
        config
    }

    fn orchestrator(provider: Arc<SequentialMockProvider>, store: &InMemoryStore, config: &AppConfig) -> Orchestrator {
        Orchestrator::from_config(
            config,
            provider,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(RateLimiter::new()),
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn expense_is_logged_through_event_creation() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::texts(&[NOT_FAST, PURCHASE_CLASS, PURCHASE]));
        let orch = orchestrator(provider.clone(), &store, &config());
        let mut events = orch.events().subscribe();

        let reply = orch
            .handle(&InboundMessage::new("telegram", "alice", "Купил хлеб за 45 рублей"))
            .await
            .unwrap();

        assert_eq!(reply.agent.as_deref(), Some("event_creation"));
        assert!(reply.success);
        assert!(!reply.fast_path);
        assert!(reply.text.contains("Хлеб"));
        assert_eq!(provider.call_count(), 3);

        let stored = store
            .list_entities(&EntityQuery {
                user_id: "alice".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, EventKind::Purchase);
        assert_eq!(stored[0].amount, Some(45.0));

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(match event.as_ref() {
                DomainEvent::MessageReceived { .. } => "received",
                DomainEvent::FastPathServed { .. } => "fast",
                DomainEvent::AgentRouted { .. } => "routed",
                DomainEvent::EntityCreated { .. } => "entity",
                DomainEvent::RequestFailed { .. } => "failed",
                DomainEvent::ReplySent { .. } => "sent",
            });
        }
        assert_eq!(names, vec!["received", "routed", "entity", "sent"]);
    }

    /// Conversation store whose history reads always fail.
    struct UnreadableHistory(InMemoryStore);

    #[async_trait::async_trait]
    impl ConversationStore for UnreadableHistory {
        fn name(&self) -> &str {
            "unreadable"
        }

        async fn find_or_create_conversation(
            &self,
            identity: &str,
            channel: &str,
            chat_id: Option<&str>,
        ) -> hearth_core::store::StoreResult<ConversationId> {
            self.0.find_or_create_conversation(identity, channel, chat_id).await
        }

        async fn list_recent_messages(
            &self,
            _conversation_id: &ConversationId,
            _limit: usize,
        ) -> hearth_core::store::StoreResult<Vec<hearth_core::message::Message>> {
            Err(hearth_core::error::StoreError::QueryFailed("disk gone".into()))
        }

        async fn append_message(
            &self,
            conversation_id: &ConversationId,
            role: Role,
            content: &str,
            model: Option<&str>,
        ) -> hearth_core::store::StoreResult<String> {
            self.0.append_message(conversation_id, role, content, model).await
        }

        async fn touch_conversation(&self, conversation_id: &ConversationId) -> hearth_core::store::StoreResult<()> {
            self.0.touch_conversation(conversation_id).await
        }
    }

    #[tokio::test]
    async fn context_is_assembled_before_the_fast_path() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::silent());
        let orch = Orchestrator::from_config(
            &config(),
            provider.clone(),
            Arc::new(UnreadableHistory(store.clone())),
            Arc::new(store),
            Arc::new(RateLimiter::new()),
            Arc::new(EventBus::default()),
        );

        let err = orch.handle(&InboundMessage::new("telegram", "alice", "Привет!")).await.unwrap_err();
        match err {
            Error::Pipeline { stage, .. } => assert_eq!(stage, PipelineStage::Context),
            other => panic!("expected a context failure, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn greeting_skips_classification_and_routing() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING]));
        let orch = orchestrator(provider.clone(), &store, &config());

        let reply = orch.handle(&InboundMessage::new("telegram", "alice", "Привет!")).await.unwrap();
        assert!(reply.fast_path);
        assert_eq!(reply.agent, None);
        assert_eq!(reply.text, "Привет! Чем помочь?");
        assert_eq!(provider.call_count(), 1);

        let conv = store.find_or_create_conversation("alice", "telegram", None).await.unwrap();
        let saved = store.list_recent_messages(&conv, 10).await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].model.as_deref(), Some(FAST_PATH_MODEL));
        assert!(store.last_activity(&conv).await.is_some());
    }

    #[tokio::test]
    async fn fourth_message_in_window_is_rate_limited() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING]));
        let orch = orchestrator(provider, &store, &config());
        let msg = InboundMessage::new("telegram", "alice", "Привет!");

        // The cached fast-path decision answers the repeats
        for _ in 0..3 {
            orch.handle(&msg).await.unwrap();
        }
        let err = orch.handle(&msg).await.unwrap_err();
        assert!(err.retry_after_ms().is_some_and(|ms| ms > 0));

        let other_chat = InboundMessage::new("telegram", "alice", "Привет!").in_chat("family");
        assert!(orch.handle(&other_chat).await.is_ok());
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_call() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::silent());
        let orch = orchestrator(provider.clone(), &store, &config());

        let err = orch.handle(&InboundMessage::new("cli", "alice", "   ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_message_goes_to_general_agent() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::texts(&[
            NOT_FAST,
            CHAT_CLASS,
            "Отличный вопрос! Давайте разберёмся.",
        ]));
        let orch = orchestrator(provider, &store, &config());

        let reply = orch
            .handle(&InboundMessage::new("web", "bob", "Что посоветуешь почитать?"))
            .await
            .unwrap();
        assert_eq!(reply.agent.as_deref(), Some("general"));
        assert_eq!(reply.text, "Отличный вопрос! Давайте разберёмся.");
    }

    #[tokio::test]
    async fn agent_failure_becomes_generic_reply() {
        let store = InMemoryStore::new();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(crate::test_helpers::make_text_response(NOT_FAST)),
            Ok(crate::test_helpers::make_text_response(PURCHASE_CLASS)),
            Err(ProviderError::Timeout("slow".into())),
        ]));
        let orch = orchestrator(provider, &store, &config());
        let mut events = orch.events().subscribe();

        let reply = orch
            .respond(&InboundMessage::new("telegram", "alice", "Купил хлеб за 45 рублей"))
            .await;
        assert_eq!(reply.text, hearth_core::error::GENERIC_USER_MESSAGE);
        assert_eq!(store.entity_count().await, 0);

        let mut failed = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::RequestFailed { task_id, .. } = event.as_ref() {
                failed = !task_id.is_empty();
            }
        }
        assert!(failed);
    }
}
