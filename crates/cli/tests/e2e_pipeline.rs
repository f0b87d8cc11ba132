//! End-to-end tests for the hearth request pipeline.
//!
//! These tests drive whole messages through the orchestrator with a scripted
//! generation service: fast path, classification, routing, extraction,
//! persistence and rate limiting.

use std::sync::{Arc, Mutex};

use hearth_agent::{Orchestrator, RateLimiter};
use hearth_config::AppConfig;
use hearth_core::channel::InboundMessage;
use hearth_core::entity::{EntityQuery, EventKind};
use hearth_core::error::{Error, ProviderError};
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::message::{Message, Role};
use hearth_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use hearth_core::store::{ConversationStore, EntityStore};
use hearth_store::{InMemoryStore, SqliteStore};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Vec<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn system_prompt(&self, call: usize) -> String {
        self.requests.lock().unwrap()[call].messages[0].content.clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        if index >= self.responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                index,
                self.responses.len()
            );
        }
        requests.push(request.clone());
        Ok(ProviderResponse {
            message: Message::assistant(self.responses[index].clone()),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: request.model,
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

const NOT_FAST: &str = r#"{"success": true, "shouldSendFast": false, "response": null, "confidence": 0.9, "processingType": "event"}"#;

const GREETING: &str = r#"{"success": true, "shouldSendFast": true, "response": "Привет! Чем могу помочь?", "confidence": 0.97, "processingType": "greeting"}"#;

// Classifier output wrapped in prose, as models often do
const EXPENSE_CLASSIFICATION: &str = r#"Sure! Here is the classification:
{"messageType": {"type": "event", "subtype": "purchase", "confidence": 0.94, "needLogging": true},
 "relevance": {"relevant": true, "score": 0.9, "category": "finance"}}"#;

const BREAD_EXTRACTION: &str = r#"{"title": "Хлеб", "type": "purchase", "category": "food", "priority": "обычный", "amount": 45, "currency": "рублей", "tags": ["продукты"], "confidence": 0.92, "needsConfirmation": false}"#;

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.quality.enabled = false;
    config.rate_limit.limit = 3;
    config.rate_limit.window_ms = 60_000;
    config
}

fn orchestrator<S>(provider: Arc<ScriptedProvider>, store: Arc<S>, config: &AppConfig) -> Orchestrator
where
    S: ConversationStore + EntityStore + 'static,
{
    Orchestrator::from_config(
        config,
        provider,
        store.clone(),
        store,
        Arc::new(RateLimiter::new()),
        Arc::new(EventBus::default()),
    )
}

fn alice(text: &str) -> InboundMessage {
    InboundMessage::new("telegram", "alice", text).in_chat("family")
}

// ── Scenario A: expense statement ────────────────────────────────────────

#[tokio::test]
async fn expense_statement_is_logged_as_purchase() {
    let provider = ScriptedProvider::new(&[NOT_FAST, EXPENSE_CLASSIFICATION, BREAD_EXTRACTION]);
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(provider.clone(), store.clone(), &test_config());
    let mut events = orch.events().subscribe();

    let reply = orch.handle(&alice("Купил хлеб за 45 рублей")).await.unwrap();

    assert_eq!(reply.agent.as_deref(), Some("event_creation"));
    assert!(reply.success);
    assert!(reply.text.contains("Хлеб"), "reply: {}", reply.text);
    assert!(reply.text.contains("45"), "reply: {}", reply.text);
    assert_eq!(provider.calls(), 3);
    assert!(provider.system_prompt(2).contains("ISO 8601"));

    let entities = store
        .list_entities(&EntityQuery {
            user_id: "alice".into(),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entities.len(), 1);
    let bread = &entities[0];
    assert_eq!(bread.kind, EventKind::Purchase);
    assert_eq!(bread.amount, Some(45.0));
    assert_eq!(bread.currency.as_deref(), Some("RUB"));
    assert!(bread.confidence > 0.5);

    let conv = store
        .find_or_create_conversation("alice", "telegram", Some("family"))
        .await
        .unwrap();
    let saved = store.list_recent_messages(&conv, 10).await.unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1].role, Role::User);
    assert_eq!(saved[0].role, Role::Assistant);

    let mut entity_events = 0;
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::EntityCreated { entity_id, kind, .. } = event.as_ref() {
            assert_eq!(entity_id, &bread.id);
            assert_eq!(kind, "purchase");
            entity_events += 1;
        }
    }
    assert_eq!(entity_events, 1);
}

#[tokio::test]
async fn expense_statement_is_logged_in_sqlite() {
    let provider = ScriptedProvider::new(&[NOT_FAST, EXPENSE_CLASSIFICATION, BREAD_EXTRACTION]);
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let orch = orchestrator(provider, store.clone(), &test_config());

    orch.handle(&alice("Купил хлеб за 45 рублей")).await.unwrap();

    let entities = store
        .list_entities(&EntityQuery {
            user_id: "alice".into(),
            kinds: vec![EventKind::Purchase],
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].title, "Хлеб");
}

// ── Scenario B: greeting ─────────────────────────────────────────────────

#[tokio::test]
async fn greeting_is_served_by_the_fast_path_only() {
    // A single scripted reply: any classification or routing call would panic
    let provider = ScriptedProvider::new(&[GREETING]);
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(provider.clone(), store.clone(), &test_config());

    let reply = orch.handle(&alice("Привет!")).await.unwrap();

    assert!(reply.fast_path);
    assert_eq!(reply.agent, None);
    assert_eq!(reply.text, "Привет! Чем могу помочь?");
    assert_eq!(provider.calls(), 1);
    assert_eq!(store.entity_count().await, 0);
    assert!(orch.agents().iter().all(|a| a.routed == 0));
}

// ── Scenario C: rate limiting ────────────────────────────────────────────

#[tokio::test]
async fn fourth_request_in_window_is_refused_with_delay() {
    let provider = ScriptedProvider::new(&[GREETING]);
    let store = Arc::new(InMemoryStore::new());
    let orch = orchestrator(provider, store, &test_config());

    for _ in 0..3 {
        orch.handle(&alice("Привет!")).await.unwrap();
    }

    let err = orch.handle(&alice("Привет!")).await.unwrap_err();
    match err {
        Error::RateLimited { retry_after_ms } => assert!(retry_after_ms > 0),
        other => panic!("expected rate limit, got {other}"),
    }

    let reply = orch.respond(&alice("Привет!")).await;
    assert!(reply.text.contains("too quickly"));
}

#[tokio::test]
async fn limiter_reports_reset_for_denied_key() {
    let limiter = RateLimiter::new();
    let policy = hearth_agent::RateLimitPolicy::new(1000, 3);

    for _ in 0..3 {
        assert!(limiter.check_at("telegram:family", policy, 0).allowed);
    }
    let denied = limiter.check_at("telegram:family", policy, 0);
    assert!(!denied.allowed);
    assert!(denied.reset_ms > 0);
    assert!(limiter.check_at("telegram:family", policy, 1001).allowed);
}
