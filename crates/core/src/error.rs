//! Error types for the hearth domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator (generation service, store, channel) has its own
//! bounded-context error; pipeline failures are tagged with enough request
//! context to diagnose them from logs alone.

use thiserror::Error;

/// The single message shown to end users when a request fails.
pub const GENERIC_USER_MESSAGE: &str =
    "Sorry, something went wrong while processing your message. Please try again a bit later.";

/// The top-level error type for all hearth operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Request errors ---
    /// Malformed or missing required input; never reaches an agent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Sliding-window limit hit for the given key.
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// A pipeline stage failed for a specific task.
    #[error("{stage} failed for task {task_id} on {channel} (input: {input_preview:?}): {source}")]
    Pipeline {
        stage: PipelineStage,
        task_id: String,
        channel: String,
        input_preview: String,
        #[source]
        source: Box<Error>,
    },

    /// The registry has no agents at all (not even a fallback).
    #[error("No agent registered to handle task {0}")]
    NoAgent(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap this error with the pipeline stage and task context it failed in.
    pub fn in_stage(
        self,
        stage: PipelineStage,
        task_id: impl Into<String>,
        channel: impl Into<String>,
        input: &str,
    ) -> Self {
        Error::Pipeline {
            stage,
            task_id: task_id.into(),
            channel: channel.into(),
            input_preview: truncate_for_log(input, 80),
            source: Box::new(self),
        }
    }

    /// The text an end user sees for this error.
    ///
    /// Rate limiting and validation get a specific hint; everything else is
    /// collapsed into [`GENERIC_USER_MESSAGE`].
    pub fn user_message(&self) -> String {
        match self.root() {
            Error::RateLimited { retry_after_ms } => format!(
                "You are sending messages too quickly. Please wait {} seconds.",
                retry_after_ms.div_ceil(1000).max(1)
            ),
            Error::Validation(_) => "Your message could not be processed: it is empty or incomplete.".into(),
            _ => GENERIC_USER_MESSAGE.into(),
        }
    }

    /// Follow `Pipeline` wrappers down to the originating error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Retry delay if this error (or its root) is a rate-limit error.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self.root() {
            Error::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Orchestration stage a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Context,
    Classification,
    Routing,
    Processing,
    QualityControl,
    Persistence,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Context => "context assembly",
            Self::Classification => "classification",
            Self::Routing => "routing",
            Self::Processing => "agent processing",
            Self::QualityControl => "quality control",
            Self::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Truncate `text` to at most `max_chars` characters for log output.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The model answered, but not with what was asked for
    /// (no JSON object, unparseable JSON, schema mismatch).
    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Attachment too large: {size_bytes} bytes (limit {limit_bytes})")]
    AttachmentTooLarge { size_bytes: u64, limit_bytes: u64 },
}
