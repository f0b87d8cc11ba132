//! Wiring shared by `serve` and `chat`: config, stores, provider, orchestrator.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use hearth_agent::{Orchestrator, RateLimiter};
use hearth_config::{AppConfig, StoreBackend, StoreConfig};
use hearth_core::event::{DomainEvent, EventBus};
use hearth_core::provider::Provider;
use hearth_core::store::{ConversationStore, EntityStore};
use hearth_store::{InMemoryStore, SqliteStore};
use tracing::{debug, info};

/// Load config from `path` (or the default location), apply environment
/// overrides and validate.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }
        None => AppConfig::load().context("Failed to load config"),
    }
}

pub type Stores = (Arc<dyn ConversationStore>, Arc<dyn EntityStore>);

/// Open the configured store backend.
pub async fn open_stores(config: &StoreConfig) -> anyhow::Result<Stores> {
    match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store; nothing survives a restart");
            let store = Arc::new(InMemoryStore::new());
            let conversations: Arc<dyn ConversationStore> = store.clone();
            let entities: Arc<dyn EntityStore> = store;
            Ok((conversations, entities))
        }
        StoreBackend::Sqlite => {
            let path = config.database_path();
            let store = SqliteStore::open_file(&path)
                .await
                .with_context(|| format!("Failed to open store at {}", path.display()))?;
            let store = Arc::new(store);
            let conversations: Arc<dyn ConversationStore> = store.clone();
            let entities: Arc<dyn EntityStore> = store;
            Ok((conversations, entities))
        }
    }
}

pub fn default_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn Provider>> {
    hearth_providers::router::build_from_config(config)
        .default()
        .ok_or_else(|| anyhow!("No default provider configured"))
}

/// Build the orchestrator for `config`.
pub async fn build(config: &AppConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let provider = default_provider(config)?;
    let (conversations, entities) = open_stores(&config.store).await?;
    let events = Arc::new(EventBus::default());
    spawn_event_log(&events);

    Ok(Arc::new(Orchestrator::from_config(
        config,
        provider,
        conversations,
        entities,
        Arc::new(RateLimiter::new()),
        events,
    )))
}

/// Log every domain event at debug level.
fn spawn_event_log(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::EntityCreated { task_id, entity_id, kind, .. } => {
                        debug!(task_id = %task_id, entity_id = %entity_id, kind = %kind, "event: entity created")
                    }
                    DomainEvent::AgentRouted { task_id, agent, fallback, .. } => {
                        debug!(task_id = %task_id, agent = %agent, fallback, "event: agent routed")
                    }
                    other => debug!(task_id = other.task_id(), "event: {other:?}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event log lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
