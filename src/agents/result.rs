use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error classes surfaced in `AgentResult::error` prefixes and routing
/// decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Config,
    Input,
    LlmTransient,
    LlmPermanent,
    Parse,
    Merge,
    Io,
    Routing,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config_error",
            Self::Input => "input_error",
            Self::LlmTransient => "llm_transient",
            Self::LlmPermanent => "llm_permanent",
            Self::Parse => "parse_error",
            Self::Merge => "merge_error",
            Self::Io => "io_error",
            Self::Routing => "routing_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageSet {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub assistant: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub duration_ms: u64,
    pub continuations: u32,
}

/// Standardized result of one agent invocation. `success=false` always
/// carries a non-empty error; `success=true` data is well-formed for the
/// agent kind that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub data: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: MessageSet,
    #[serde(default)]
    pub metrics: AgentMetrics,
}

impl AgentResult {
    pub fn succeeded(data: Value, messages: MessageSet, metrics: AgentMetrics) -> Self {
        Self {
            success: true,
            data,
            error: None,
            messages,
            metrics,
        }
    }

    pub fn failed(kind: FailureKind, detail: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: Value::Object(Map::new()),
            error: Some(format!("{kind}: {detail}")),
            messages: MessageSet::default(),
            metrics: AgentMetrics::default(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_messages(mut self, messages: MessageSet) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_metrics(mut self, metrics: AgentMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
