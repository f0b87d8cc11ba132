//! Fast path for trivial messages (greetings, thanks, small talk).
//!
//! The decision itself comes from one upstream JSON-object call; this module
//! owns caching, statistics and the fail-open rule: an error, an unsuccessful
//! upstream result or a low-confidence answer always resolves to "needs full
//! processing". A broken fast path never suppresses a reply.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hearth_config::FastPathConfig;
use hearth_core::structured::schema_for;
use lru::LruCache;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::generation::Generator;

const SYSTEM_PROMPT: &str = "You screen messages sent to a household assistant. \
Decide whether the message is trivial (a greeting, thanks, farewell or small talk) and can be \
answered right away with one short friendly sentence, without looking at history or stored data. \
Anything that records, asks about or changes household data is NOT trivial. \
Reply in the language of the message. Respond with a single JSON object and nothing else:\n\
{\"success\": true, \"shouldSendFast\": boolean, \"response\": string or null, \
\"confidence\": number from 0 to 1, \"processingType\": string}";

/// What to do with a message before the full pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FastDecision {
    pub should_send_fast: bool,
    pub fast_response: Option<String>,
    pub needs_full_processing: bool,
    pub confidence: f32,
    pub processing_type: String,
}

impl FastDecision {
    /// The fail-open decision.
    pub fn full_processing() -> Self {
        Self {
            should_send_fast: false,
            fast_response: None,
            needs_full_processing: true,
            confidence: 0.0,
            processing_type: "full".into(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct UpstreamDecision {
    success: bool,
    should_send_fast: bool,
    #[serde(default)]
    response: Option<String>,
    #[schemars(range(min = 0, max = 1))]
    confidence: f32,
    #[serde(default)]
    processing_type: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct FastPathSettings {
    pub enabled: bool,
    pub min_confidence: f32,
    pub capacity: usize,
    pub ttl: Duration,
}

impl From<&FastPathConfig> for FastPathSettings {
    fn from(config: &FastPathConfig) -> Self {
        Self {
            enabled: config.enabled,
            min_confidence: config.min_confidence,
            capacity: config.capacity,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }
}

struct CacheEntry {
    decision: FastDecision,
    created_at: Instant,
}

struct CacheState {
    /// `None` when caching is disabled (capacity 0)
    entries: Option<LruCache<String, CacheEntry>>,
    usage_count: u64,
    cache_hits: u64,
    expired_evictions: u64,
    upstream_calls: u64,
    average_latency_ms: f64,
}

impl CacheState {
    fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
            usage_count: 0,
            cache_hits: 0,
            expired_evictions: 0,
            upstream_calls: 0,
            average_latency_ms: 0.0,
        }
    }
}

/// Snapshot of fast-path statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FastPathStats {
    pub cache_size: usize,
    /// Cached decisions that answer directly
    pub template_count: usize,
    /// Messages analyzed
    pub usage_count: u64,
    pub cache_hits: u64,
    /// Entries dropped because their TTL ran out
    pub expired_evictions: u64,
    /// Mean upstream latency
    pub average_latency_ms: f64,
}

pub struct FastResponseCache {
    generator: Generator,
    settings: FastPathSettings,
    state: Mutex<CacheState>,
}

impl FastResponseCache {
    pub fn new(generator: Generator, settings: FastPathSettings) -> Self {
        Self {
            generator,
            settings,
            state: Mutex::new(CacheState::new(settings.capacity)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decide whether `text` can be answered immediately. Never fails.
    pub async fn analyze(&self, text: &str) -> FastDecision {
        if !self.settings.enabled {
            return FastDecision::full_processing();
        }

        let key = cache_key(text);
        if let Some(decision) = self.lookup(&key) {
            debug!(should_send_fast = decision.should_send_fast, "Fast path cache hit");
            return decision;
        }

        let started = Instant::now();
        let result = self.generator.object(SYSTEM_PROMPT, text, &schema_for::<UpstreamDecision>(), 0.0).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        let decision = match result
            .map_err(|e| e.to_string())
            .and_then(|v| serde_json::from_value::<UpstreamDecision>(v).map_err(|e| e.to_string()))
        {
            Ok(upstream) => self.evaluate(upstream),
            Err(e) => {
                warn!(error = %e, "Fast path unavailable, falling back to full processing");
                self.record_latency(latency_ms);
                return FastDecision::full_processing();
            }
        };

        self.record_latency(latency_ms);
        if let Some(decision) = &decision {
            self.insert(key, decision.clone());
        }
        decision.unwrap_or_else(FastDecision::full_processing)
    }

    /// `None` when the upstream reported failure.
    fn evaluate(&self, upstream: UpstreamDecision) -> Option<FastDecision> {
        if !upstream.success {
            warn!("Fast path upstream reported failure, falling back to full processing");
            return None;
        }

        let reply = upstream
            .response
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let fast = upstream.should_send_fast && upstream.confidence >= self.settings.min_confidence && reply.is_some();

        Some(FastDecision {
            should_send_fast: fast,
            fast_response: if fast { reply } else { None },
            needs_full_processing: !fast,
            confidence: upstream.confidence,
            processing_type: upstream.processing_type.unwrap_or_else(|| "full".into()),
        })
    }

    fn lookup(&self, key: &str) -> Option<FastDecision> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.usage_count += 1;
        let entries = state.entries.as_mut()?;

        if let Some(entry) = entries.get_mut(key) {
            if entry.created_at.elapsed() < self.settings.ttl {
                let decision = entry.decision.clone();
                state.cache_hits += 1;
                return Some(decision);
            }
            entries.pop(key);
            state.expired_evictions += 1;
        }
        None
    }

    fn insert(&self, key: String, decision: FastDecision) {
        if let Some(entries) = self.lock().entries.as_mut() {
            entries.put(
                key,
                CacheEntry {
                    decision,
                    created_at: Instant::now(),
                },
            );
        }
    }

    fn record_latency(&self, latency_ms: f64) {
        let mut state = self.lock();
        state.upstream_calls += 1;
        let n = state.upstream_calls as f64;
        state.average_latency_ms += (latency_ms - state.average_latency_ms) / n;
    }

    /// Drop every cached decision. Counters are kept.
    pub fn clear(&self) {
        if let Some(entries) = self.lock().entries.as_mut() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> FastPathStats {
        let state = self.lock();
        let (cache_size, template_count) = state.entries.as_ref().map_or((0, 0), |entries| {
            let templates = entries.iter().filter(|(_, e)| e.decision.should_send_fast).count();
            (entries.len(), templates)
        });
        FastPathStats {
            cache_size,
            template_count,
            usage_count: state.usage_count,
            cache_hits: state.cache_hits,
            expired_evictions: state.expired_evictions,
            average_latency_ms: state.average_latency_ms,
        }
    }
}

/// Lowercase, collapse whitespace and strip surrounding punctuation so that
/// "Привет!" and "  привет " share an entry.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

fn cache_key(text: &str) -> String {
    let digest = Sha256::digest(normalize(text).as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;
    use hearth_core::error::ProviderError;
    use std::sync::Arc;

    const GREETING: &str = "{\"success\": true, \"shouldSendFast\": true, \"response\": \"Привет! Чем помочь?\", \"confidence\": 0.95, \"processingType\": \"greeting\"}";
    const COMPLEX: &str = "{\"success\": true, \"shouldSendFast\": false, \"response\": null, \"confidence\": 0.9, \"processingType\": \"event\"}";

    fn settings() -> FastPathSettings {
        FastPathSettings {
            enabled: true,
            min_confidence: 0.8,
            capacity: 16,
            ttl: Duration::from_secs(3600),
        }
    }

    fn cache(provider: Arc<SequentialMockProvider>, settings: FastPathSettings) -> FastResponseCache {
        FastResponseCache::new(Generator::new(provider, "m"), settings)
    }

    #[tokio::test]
    async fn greeting_is_answered_fast() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING]));
        let d = cache(provider, settings()).analyze("Привет!").await;
        assert!(d.should_send_fast);
        assert!(!d.needs_full_processing);
        assert_eq!(d.fast_response.as_deref(), Some("Привет! Чем помочь?"));
        assert_eq!(d.processing_type, "greeting");
    }

    #[tokio::test]
    async fn upstream_error_fails_open() {
        let provider = Arc::new(SequentialMockProvider::failing(ProviderError::Network("down".into())));
        let d = cache(provider, settings()).analyze("Привет!").await;
        assert!(!d.should_send_fast);
        assert!(d.needs_full_processing);
    }

    #[tokio::test]
    async fn unsuccessful_upstream_fails_open_and_is_not_cached() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "{\"success\": false, \"shouldSendFast\": true, \"response\": \"hi\", \"confidence\": 1.0}",
            GREETING,
        ]));
        let fast = cache(provider.clone(), settings());
        assert!(fast.analyze("hi").await.needs_full_processing);
        assert!(fast.analyze("hi").await.should_send_fast);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn low_confidence_goes_to_full_processing() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "{\"success\": true, \"shouldSendFast\": true, \"response\": \"ok\", \"confidence\": 0.5}",
        ]));
        let d = cache(provider, settings()).analyze("ok").await;
        assert!(!d.should_send_fast);
        assert!(d.fast_response.is_none());
        assert!(d.needs_full_processing);
    }

    #[tokio::test]
    async fn fast_answer_without_text_goes_to_full_processing() {
        let provider = Arc::new(SequentialMockProvider::texts(&[
            "{\"success\": true, \"shouldSendFast\": true, \"response\": \"  \", \"confidence\": 0.99}",
        ]));
        assert!(cache(provider, settings()).analyze("hey").await.needs_full_processing);
    }

    #[tokio::test]
    async fn normalized_repeats_hit_the_cache() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING]));
        let fast = cache(provider.clone(), settings());
        fast.analyze("Привет!").await;
        let again = fast.analyze("  привет  ").await;
        assert!(again.should_send_fast);
        assert_eq!(provider.call_count(), 1);

        let stats = fast.stats();
        assert_eq!(stats.cache_size, 1);
        assert_eq!(stats.template_count, 1);
        assert_eq!(stats.usage_count, 2);
        assert_eq!(stats.cache_hits, 1);
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING, COMPLEX, GREETING, COMPLEX]));
        let fast = cache(provider.clone(), FastPathSettings { capacity: 2, ..settings() });
        fast.analyze("a").await;
        fast.analyze("b").await;
        fast.analyze("a").await; // hit, refreshes "a"
        fast.analyze("c").await; // evicts "b"
        assert_eq!(provider.call_count(), 3);
        assert_eq!(fast.stats().cache_size, 2);

        fast.analyze("b").await;
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn expired_entries_are_refetched() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING, GREETING]));
        let fast = cache(provider.clone(), FastPathSettings { ttl: Duration::ZERO, ..settings() });
        fast.analyze("hi").await;
        fast.analyze("hi").await;
        assert_eq!(provider.call_count(), 2);
        assert_eq!(fast.stats().expired_evictions, 1);
        assert_eq!(fast.stats().cache_hits, 0);
    }

    #[tokio::test]
    async fn zero_capacity_disables_caching() {
        let provider = Arc::new(SequentialMockProvider::texts(&[GREETING, GREETING]));
        let fast = cache(provider.clone(), FastPathSettings { capacity: 0, ..settings() });
        assert!(fast.analyze("hi").await.should_send_fast);
        assert!(fast.analyze("hi").await.should_send_fast);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(fast.stats().cache_size, 0);
        assert_eq!(fast.stats().usage_count, 2);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let provider = Arc::new(SequentialMockProvider::texts(&[COMPLEX]));
        let fast = cache(provider, settings());
        fast.analyze("Купил хлеб").await;
        assert_eq!(fast.stats().cache_size, 1);
        assert_eq!(fast.stats().template_count, 0);
        fast.clear();
        assert_eq!(fast.stats().cache_size, 0);
    }

    #[tokio::test]
    async fn disabled_fast_path_never_calls_upstream() {
        let provider = Arc::new(SequentialMockProvider::silent());
        let fast = cache(provider.clone(), FastPathSettings { enabled: false, ..settings() });
        assert!(fast.analyze("hi").await.needs_full_processing);
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("  Привет!  "), "привет");
        assert_eq!(normalize("Good   morning..."), "good morning");
        assert_eq!(cache_key("Hi!"), cache_key("hi"));
    }
}
