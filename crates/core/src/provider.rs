//! Provider trait — the abstraction over the text-generation service.
//!
//! The pipeline consumes exactly two call shapes:
//! - free-text completion (`complete`): system prompt + messages + temperature → text
//! - structured-object completion (`complete_object`): the same plus a value
//!   schema → a schema-conformant JSON object, or `ProviderError::InvalidOutput`
//!
//! The core never depends on a specific vendor; any backend implementing
//! `complete` gets `complete_object` for free through the default method.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::structured;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "openai/gpt-4o-mini")
    pub model: String,

    /// The conversation messages, system prompt first
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Ask the backend for a JSON object response (if it supports it)
    #[serde(default)]
    pub json_mode: bool,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    /// Build a request from a system prompt and a single user prompt.
    pub fn new(model: impl Into<String>, system_prompt: &str, user_prompt: &str) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            temperature: default_temperature(),
            max_tokens: None,
            json_mode: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every generation backend implements this trait. Classifier, fast path,
/// agents and the quality judge call it without knowing which backend is
/// behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete free-text response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get back a JSON object conforming to `schema`.
    ///
    /// Default implementation: force JSON mode, call `complete`, take the
    /// first balanced `{...}` span of the output, parse it and validate it.
    async fn complete_object(
        &self,
        request: ProviderRequest,
        schema: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ProviderError> {
        let response = self.complete(request.json()).await?;
        let value = structured::parse_json_object(&response.message.content)
            .map_err(ProviderError::InvalidOutput)?;
        structured::validate(&value, schema).map_err(ProviderError::InvalidOutput)?;
        Ok(value)
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use serde_json::json;

    struct EchoProvider(String);

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            assert!(request.json_mode, "complete_object must request JSON mode");
            Ok(ProviderResponse {
                message: Message::assistant(self.0.clone()),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn request_builder_places_system_first() {
        let req = ProviderRequest::new("m", "be terse", "hello").with_temperature(0.0);
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.temperature, 0.0);
        assert!(!req.json_mode);
    }

    #[tokio::test]
    async fn complete_object_extracts_and_validates() {
        let provider = EchoProvider("Here: {\"ok\": true} done".into());
        let schema = json!({"type": "object", "required": ["ok"]});
        let value = provider
            .complete_object(ProviderRequest::new("m", "s", "u"), &schema)
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn complete_object_rejects_schema_mismatch() {
        let provider = EchoProvider("{\"other\": 1}".into());
        let schema = json!({"type": "object", "required": ["ok"]});
        let err = provider
            .complete_object(ProviderRequest::new("m", "s", "u"), &schema)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidOutput(_)));
    }
}
