use super::{ConfigError, ConfigTree};
use crate::llm::{ContinuationPolicy, ProviderKind, RetryPolicy};
use serde_json::{Map, Value};
use std::time::Duration;

const DEFAULT_TEMPERATURE: f64 = 0.0;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Flat, agent-scoped view of the effective configuration: the subtree at
/// `llm_config.agents.<kind>` overlaid onto the provider defaults at
/// `llm_config.providers.<provider>`.
#[derive(Debug, Clone)]
pub struct AgentView {
    agent_kind: String,
    view: ConfigTree,
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f64,
    pub api_base: Option<String>,
    pub api_key_env: Option<String>,
    pub model_params: Map<String, Value>,
    pub continuation: ContinuationPolicy,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl AgentView {
    pub fn resolve(config: &ConfigTree, agent_kind: &str) -> Result<Self, ConfigError> {
        let agent_path = format!("llm_config.agents.{agent_kind}");
        let agent_tree = match config.get(&agent_path) {
            None => ConfigTree::empty(),
            Some(Value::Object(_)) => config.subtree(&agent_path),
            Some(other) => {
                return Err(ConfigError::NotAMapping {
                    path: agent_path,
                    found: value_kind(other),
                })
            }
        };

        let provider_name = agent_tree
            .get_str("provider")
            .or_else(|| config.get_str("llm_config.default_provider"))
            .ok_or_else(|| ConfigError::MissingParameter {
                agent: agent_kind.to_string(),
                parameter: "provider".to_string(),
            })?
            .to_string();
        let provider =
            ProviderKind::parse(&provider_name).map_err(|_| ConfigError::UnknownProvider {
                agent: agent_kind.to_string(),
                provider: provider_name.clone(),
            })?;

        let provider_path = format!("llm_config.providers.{provider_name}");
        let provider_tree = match config.get(&provider_path) {
            None => {
                return Err(ConfigError::UnknownProvider {
                    agent: agent_kind.to_string(),
                    provider: provider_name,
                })
            }
            Some(Value::Object(_)) => config.subtree(&provider_path),
            Some(other) => {
                return Err(ConfigError::NotAMapping {
                    path: provider_path,
                    found: value_kind(other),
                })
            }
        };

        let view = provider_tree.merged_with(&agent_tree);

        let model = resolve_scalar(&view, config, &provider_tree, "model")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingParameter {
                agent: agent_kind.to_string(),
                parameter: "model".to_string(),
            })?;

        let temperature = resolve_scalar(&view, config, &provider_tree, "temperature")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_TEMPERATURE);

        let model_params = match view.get("model_params") {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(ConfigError::NotAMapping {
                    path: format!("{agent_path}.model_params"),
                    found: value_kind(other),
                })
            }
            None => Map::new(),
        };

        let continuation = ContinuationPolicy {
            enabled: view.get_bool("continuation_enabled").unwrap_or(true),
            max_attempts: view
                .get_u64("max_continuation_attempts")
                .unwrap_or(ContinuationPolicy::DEFAULT_MAX_ATTEMPTS) as u32,
            token_buffer: view
                .get_u64("continuation_token_buffer")
                .unwrap_or(ContinuationPolicy::DEFAULT_TOKEN_BUFFER),
        };

        let initial_delay = view
            .get_u64("retry.initial_delay_ms")
            .map(Duration::from_millis)
            .unwrap_or_else(|| {
                Duration::from_secs(view.get_u64("retry.initial_delay_seconds").unwrap_or(1))
            });
        let max_delay = view
            .get_u64("retry.max_delay_ms")
            .map(Duration::from_millis)
            .unwrap_or_else(|| {
                Duration::from_secs(view.get_u64("retry.max_delay_seconds").unwrap_or(30))
            });
        let retry = RetryPolicy {
            initial_delay,
            max_delay,
            max_retries: view.get_u64("retry.max_retries").unwrap_or(5) as u32,
        };

        Ok(Self {
            agent_kind: agent_kind.to_string(),
            provider,
            model,
            temperature,
            api_base: view.get_str("api_base").map(str::to_string),
            api_key_env: view.get_str("api_key_env").map(str::to_string),
            model_params,
            continuation,
            retry,
            timeout: Duration::from_secs(
                view.get_u64("request_timeout_seconds")
                    .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            ),
            view,
        })
    }

    pub fn agent_kind(&self) -> &str {
        &self.agent_kind
    }

    /// Raw value lookup within the flat view.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.view.get(path)
    }

    /// Prompt template lookup; prompts live under `prompts.<name>` in the
    /// agent view. Missing templates are a configuration error.
    pub fn prompt(&self, name: &str) -> Result<&str, ConfigError> {
        self.view
            .get_str(&format!("prompts.{name}"))
            .ok_or_else(|| ConfigError::MissingPrompt {
                agent: self.agent_kind.clone(),
                prompt: name.to_string(),
            })
    }

    /// Extended-thinking token budget if enabled for this agent.
    pub fn thinking_budget(&self) -> Option<u64> {
        if self.view.get_bool("extended_thinking.enabled").unwrap_or(false) {
            self.view.get_u64("extended_thinking.budget_tokens")
        } else {
            None
        }
    }
}

/// Resolve one scalar parameter: per-agent (already folded into the view),
/// then `llm_config.default_<key>`, then the provider's `default_<key>`.
fn resolve_scalar<'a>(
    view: &'a ConfigTree,
    config: &'a ConfigTree,
    provider_tree: &'a ConfigTree,
    key: &str,
) -> Option<&'a Value> {
    if let Some(value) = view.get(key) {
        return Some(value);
    }
    if let Some(value) = config.get(&format!("llm_config.default_{key}")) {
        return Some(value);
    }
    provider_tree.get(&format!("default_{key}"))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
