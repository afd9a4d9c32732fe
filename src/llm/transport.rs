use super::types::{
    FinishReason, LlmError, ProviderKind, Role, TransportRequest, TransportResponse, Usage,
};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_ANTHROPIC_BASE: &str = "https://api.anthropic.com";
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Single-shot chat completion seam. The adapter layers retry and
/// continuation on top; implementations only speak one request.
pub trait ChatTransport: Send + Sync {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, LlmError>;
}

/// HTTP transport speaking the Anthropic and OpenAI wire formats.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport;

impl HttpTransport {
    pub fn new() -> Self {
        Self
    }

    fn api_key(request: &TransportRequest) -> Result<String, LlmError> {
        let variable = request.api_key_env.clone().unwrap_or_else(|| {
            match request.provider {
                ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
                ProviderKind::OpenAi => "OPENAI_API_KEY",
            }
            .to_string()
        });
        std::env::var(&variable)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LlmError::MissingSecret(variable))
    }

    fn send_anthropic(&self, request: &TransportRequest) -> Result<TransportResponse, LlmError> {
        let api_key = Self::api_key(request)?;
        let base = request
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_ANTHROPIC_BASE)
            .trim_end_matches('/');
        let url = format!("{base}/v1/messages");

        let mut body = json!({
            "model": request.model,
            "max_tokens": request
                .model_params
                .get("max_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            "system": request.system,
            "temperature": request.temperature,
            "messages": request
                .messages
                .iter()
                .map(|m| json!({"role": role_name(m.role), "content": m.content}))
                .collect::<Vec<_>>(),
        });
        if let Some(budget) = request.thinking_budget {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }
        apply_model_params(&mut body, &request.model_params, &["max_tokens"]);

        let response = http_agent(request)
            .post(&url)
            .set("x-api-key", &api_key)
            .set("anthropic-version", ANTHROPIC_VERSION)
            .send_json(body)
            .map_err(|err| map_request_error(request.provider, request.timeout, err))?;
        let decoded: AnthropicResponse = response.into_json().map_err(|err| {
            LlmError::MalformedResponse {
                provider: request.provider,
                detail: err.to_string(),
            }
        })?;

        let content = decoded
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        let finish_reason = match decoded.stop_reason.as_deref() {
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            Some(_) | None => FinishReason::Stop,
        };
        if finish_reason == FinishReason::ContentFilter {
            return Err(LlmError::ContentFiltered {
                provider: request.provider,
            });
        }

        Ok(TransportResponse {
            content,
            finish_reason,
            usage: Usage {
                prompt_tokens: decoded.usage.input_tokens,
                completion_tokens: decoded.usage.output_tokens,
                total_tokens: decoded.usage.input_tokens + decoded.usage.output_tokens,
            },
        })
    }

    fn send_openai(&self, request: &TransportRequest) -> Result<TransportResponse, LlmError> {
        let api_key = Self::api_key(request)?;
        let base = request
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE)
            .trim_end_matches('/');
        let url = format!("{base}/v1/chat/completions");

        let mut messages = vec![json!({"role": "system", "content": request.system})];
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({"role": role_name(m.role), "content": m.content})),
        );
        let mut body = json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": messages,
        });
        apply_model_params(&mut body, &request.model_params, &[]);

        let response = http_agent(request)
            .post(&url)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(body)
            .map_err(|err| map_request_error(request.provider, request.timeout, err))?;
        let decoded: OpenAiResponse = response.into_json().map_err(|err| {
            LlmError::MalformedResponse {
                provider: request.provider,
                detail: err.to_string(),
            }
        })?;

        let choice = decoded
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::MalformedResponse {
                provider: request.provider,
                detail: "response carried no choices".to_string(),
            })?;
        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => {
                return Err(LlmError::ContentFiltered {
                    provider: request.provider,
                })
            }
            Some(_) | None => FinishReason::Stop,
        };

        Ok(TransportResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason,
            usage: Usage {
                prompt_tokens: decoded.usage.prompt_tokens,
                completion_tokens: decoded.usage.completion_tokens,
                total_tokens: decoded.usage.total_tokens,
            },
        })
    }
}

impl ChatTransport for HttpTransport {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, LlmError> {
        match request.provider {
            ProviderKind::Anthropic => self.send_anthropic(request),
            ProviderKind::OpenAi => self.send_openai(request),
        }
    }
}

fn http_agent(request: &TransportRequest) -> ureq::Agent {
    ureq::builder().timeout(request.timeout).build()
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn apply_model_params(
    body: &mut Value,
    params: &serde_json::Map<String, Value>,
    already_applied: &[&str],
) {
    let Some(object) = body.as_object_mut() else {
        return;
    };
    for (key, value) in params {
        if already_applied.contains(&key.as_str()) {
            continue;
        }
        object.insert(key.clone(), value.clone());
    }
}

fn map_request_error(
    provider: ProviderKind,
    timeout: std::time::Duration,
    error: ureq::Error,
) -> LlmError {
    match error {
        ureq::Error::Status(429, response) => LlmError::RateLimited {
            provider,
            detail: status_detail(response),
        },
        ureq::Error::Status(code @ (500 | 502 | 503 | 529), response) => LlmError::Overloaded {
            provider,
            detail: format!("status {code}: {}", status_detail(response)),
        },
        ureq::Error::Status(code @ (401 | 403), response) => LlmError::Auth {
            provider,
            detail: format!("status {code}: {}", status_detail(response)),
        },
        ureq::Error::Status(code, response) => LlmError::InvalidRequest {
            provider,
            detail: format!("status {code}: {}", status_detail(response)),
        },
        ureq::Error::Transport(transport) => {
            let detail = transport.to_string();
            if detail.contains("timed out") || detail.contains("timeout") {
                LlmError::Timeout {
                    provider,
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                LlmError::Transport { provider, detail }
            }
        }
    }
}

fn status_detail(response: ureq::Response) -> String {
    response
        .into_string()
        .map(|body| body.chars().take(200).collect())
        .unwrap_or_else(|_| "<unreadable body>".to_string())
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
