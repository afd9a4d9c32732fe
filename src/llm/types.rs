use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Result<Self, LlmError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(LlmError::UnknownProvider(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn accumulate(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One request on the wire, after agent-level resolution.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub provider: ProviderKind,
    pub model: String,
    pub api_base: Option<String>,
    pub api_key_env: Option<String>,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub model_params: serde_json::Map<String, serde_json::Value>,
    pub thinking_budget: Option<u64>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Final outcome of `complete`, after retries and continuation stitching.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub continuations: u32,
    pub truncated: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub token_buffer: u64,
}

impl ContinuationPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u64 = 5;
    pub const DEFAULT_TOKEN_BUFFER: u64 = 1000;
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS as u32,
            token_buffer: Self::DEFAULT_TOKEN_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),
    #[error("provider secret variable `{0}` is not set")]
    MissingSecret(String),
    #[error("rate limited by {provider}: {detail}")]
    RateLimited { provider: ProviderKind, detail: String },
    #[error("{provider} is overloaded: {detail}")]
    Overloaded { provider: ProviderKind, detail: String },
    #[error("request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: ProviderKind, timeout_ms: u64 },
    #[error("authentication with {provider} failed: {detail}")]
    Auth { provider: ProviderKind, detail: String },
    #[error("{provider} rejected the request: {detail}")]
    InvalidRequest { provider: ProviderKind, detail: String },
    #[error("{provider} filtered the response content")]
    ContentFiltered { provider: ProviderKind },
    #[error("malformed response from {provider}: {detail}")]
    MalformedResponse { provider: ProviderKind, detail: String },
    #[error("transport failure talking to {provider}: {detail}")]
    Transport { provider: ProviderKind, detail: String },
}

impl LlmError {
    /// Transient errors are retried under the backoff policy; everything
    /// else fails the call immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Overloaded { .. }
                | LlmError::Timeout { .. }
                | LlmError::Transport { .. }
        )
    }
}
