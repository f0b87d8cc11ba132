//! Timeout-guarded access to the generation service.
//!
//! Every call site (classifier, fast path, extraction, judge, replies) goes
//! through a [`Generator`] so that a stalled provider turns into
//! `ProviderError::Timeout` instead of a hung request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hearth_core::error::ProviderError;
use hearth_core::message::Message;
use hearth_core::provider::{Provider, ProviderRequest};
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Await `fut`, mapping an elapsed `limit` to `ProviderError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "Generation call timed out");
            Err(ProviderError::Timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            )))
        }
    }
}

/// A provider bound to a model and a per-call timeout.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn Provider>,
    model: String,
    timeout: Duration,
    max_tokens: Option<u32>,
}

impl Generator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            max_tokens: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request(&self, system: &str, history: &[Message], user: &str, temperature: f32) -> ProviderRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user));

        let mut request = ProviderRequest::new(self.model.clone(), system, user).with_temperature(temperature);
        request.messages = messages;
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }

    /// Free-text completion.
    pub async fn text(&self, system: &str, user: &str, temperature: f32) -> Result<String, ProviderError> {
        self.text_with_history(system, &[], user, temperature).await
    }

    /// Free-text completion with prior turns between the system prompt and
    /// the user prompt.
    pub async fn text_with_history(
        &self,
        system: &str,
        history: &[Message],
        user: &str,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = self.request(system, history, user, temperature);
        let response = with_timeout(self.timeout, self.provider.complete(request)).await?;
        Ok(response.message.content.trim().to_string())
    }

    /// Structured-object completion validated against `schema`.
    pub async fn object(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
        temperature: f32,
    ) -> Result<Value, ProviderError> {
        let request = self.request(system, &[], user, temperature);
        with_timeout(self.timeout, self.provider.complete_object(request, schema)).await
    }
}
