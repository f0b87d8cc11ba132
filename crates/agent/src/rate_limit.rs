//! In-memory sliding-window rate limiter.
//!
//! Tracks request timestamps per key. The limiter is identity-agnostic;
//! callers build keys such as `telegram:<chat>` or `messages:<identity>`.
//! Thread-safe via `std::sync::Mutex` (non-async, held briefly).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use hearth_config::RateLimitConfig;
use hearth_core::error::{Error, Result};
use serde::Serialize;
use tracing::warn;

/// Key-map size past which stale keys are evicted.
pub const MAX_TRACKED_KEYS: usize = 10_000;

/// Window length and request allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window_ms: u64,
    pub limit: usize,
}

impl RateLimitPolicy {
    pub fn new(window_ms: u64, limit: usize) -> Self {
        Self { window_ms, limit }
    }
}

impl From<RateLimitConfig> for RateLimitPolicy {
    fn from(config: RateLimitConfig) -> Self {
        Self::new(config.window_ms, config.limit)
    }
}

/// The outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: usize,
    /// Milliseconds until the oldest counted request leaves the window
    pub reset_ms: u64,
}

struct Window {
    timestamps: VecDeque<u64>,
    window_ms: u64,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check (and on success, count) a request under `key` now.
    pub fn check(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        self.check_at(key, policy, now_ms())
    }

    /// Check (and on success, count) a request under `key` at `now_ms`.
    pub fn check_at(&self, key: &str, policy: RateLimitPolicy, now_ms: u64) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > MAX_TRACKED_KEYS {
            windows.retain(|_, w| {
                w.timestamps
                    .back()
                    .is_some_and(|&t| t >= now_ms.saturating_sub(w.window_ms))
            });
        }

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            timestamps: VecDeque::new(),
            window_ms: policy.window_ms,
        });
        window.window_ms = policy.window_ms;

        let cutoff = now_ms.saturating_sub(policy.window_ms);
        while window.timestamps.front().is_some_and(|&t| t < cutoff) {
            window.timestamps.pop_front();
        }

        let allowed = window.timestamps.len() < policy.limit;
        if allowed {
            window.timestamps.push_back(now_ms);
        }

        let reset_ms = window
            .timestamps
            .front()
            .map(|&oldest| (oldest + policy.window_ms).saturating_sub(now_ms))
            .unwrap_or(0);

        RateLimitDecision {
            allowed,
            remaining: policy.limit.saturating_sub(window.timestamps.len()),
            reset_ms,
        }
    }

    /// Like [`check`](Self::check), but a denial becomes
    /// `Error::RateLimited` carrying the reset delay.
    pub fn enforce(&self, key: &str, policy: RateLimitPolicy) -> Result<RateLimitDecision> {
        let decision = self.check(key, policy);
        if decision.allowed {
            Ok(decision)
        } else {
            warn!(key = %truncate_key(key), reset_ms = decision.reset_ms, "Rate limit exceeded");
            Err(Error::RateLimited {
                retry_after_ms: decision.reset_ms.max(1),
            })
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn truncate_key(key: &str) -> String {
    key.chars().take(40).collect()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
