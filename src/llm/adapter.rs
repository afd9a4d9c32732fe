use super::rate_limit::RateLimiterSet;
use super::transport::ChatTransport;
use super::types::{
    ChatMessage, CompletionOutcome, ContinuationPolicy, FinishReason, LlmError, ProviderKind,
    RetryPolicy, TransportRequest, TransportResponse,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CONTINUATION_PROMPT: &str =
    "Continue exactly from where you left off, maintaining the output format.";

/// Fully resolved parameters for one logical completion.
#[derive(Debug, Clone)]
pub struct CompletionSpec {
    pub provider: ProviderKind,
    pub model: String,
    pub api_base: Option<String>,
    pub api_key_env: Option<String>,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub model_params: Map<String, Value>,
    pub thinking_budget: Option<u64>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub continuation: ContinuationPolicy,
}

/// Provider-agnostic completion with continuation stitching, retry/backoff
/// and token accounting. Thread-safe; holds no cross-call state.
#[derive(Clone)]
pub struct LlmAdapter {
    transport: Arc<dyn ChatTransport>,
    limits: Arc<RateLimiterSet>,
}

impl LlmAdapter {
    pub fn new(transport: Arc<dyn ChatTransport>, limits: Arc<RateLimiterSet>) -> Self {
        Self { transport, limits }
    }

    pub fn complete(&self, spec: &CompletionSpec) -> Result<CompletionOutcome, LlmError> {
        let started = Instant::now();

        let first = self.send_with_backoff(spec, &spec.messages)?;
        let mut content = first.content;
        let mut usage = first.usage;
        let mut finish_reason = first.finish_reason;
        let mut continuations = 0u32;

        // Stitch truncated outputs back into one logical assistant message.
        // Each hop replays the conversation with the partial output as the
        // assistant turn and a fixed continuation instruction.
        while finish_reason == FinishReason::Length
            && spec.continuation.enabled
            && continuations < spec.continuation.max_attempts
        {
            let mut extended = spec.messages.clone();
            extended.push(ChatMessage::assistant(content.clone()));
            extended.push(ChatMessage::user(CONTINUATION_PROMPT));

            log::info!(
                "llm: continuation hop {} for model {} (accumulated {} bytes)",
                continuations + 1,
                spec.model,
                content.len()
            );

            let next = self.send_with_backoff(spec, &extended)?;
            content.push_str(&next.content);
            usage.accumulate(next.usage);
            finish_reason = next.finish_reason;
            continuations += 1;
        }

        let truncated = finish_reason == FinishReason::Length;
        if truncated {
            log::warn!(
                "llm: response for model {} still truncated after {continuations} continuation hops",
                spec.model
            );
        }

        Ok(CompletionOutcome {
            content,
            finish_reason,
            usage,
            continuations,
            truncated,
            duration: started.elapsed(),
        })
    }

    fn send_with_backoff(
        &self,
        spec: &CompletionSpec,
        messages: &[ChatMessage],
    ) -> Result<TransportResponse, LlmError> {
        let request = TransportRequest {
            provider: spec.provider,
            model: spec.model.clone(),
            api_base: spec.api_base.clone(),
            api_key_env: spec.api_key_env.clone(),
            system: spec.system.clone(),
            messages: messages.to_vec(),
            temperature: spec.temperature,
            model_params: spec.model_params.clone(),
            thinking_budget: spec.thinking_budget,
            timeout: spec.timeout,
        };
        let estimated_tokens = estimate_tokens(spec, messages);

        let mut attempt = 0u32;
        loop {
            self.limits.acquire(spec.provider, estimated_tokens);
            match self.transport.send(&request) {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retriable() && attempt < spec.retry.max_retries => {
                    let delay = spec.retry.delay_for_attempt(attempt);
                    log::warn!(
                        "llm: transient failure from {} (attempt {}): {err}; backing off {}ms",
                        spec.provider,
                        attempt + 1,
                        delay.as_millis()
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Rough outbound budget estimate used for rate limiting: prompt bytes at
/// four per token plus the configured completion buffer.
fn estimate_tokens(spec: &CompletionSpec, messages: &[ChatMessage]) -> u64 {
    let prompt_bytes: usize =
        spec.system.len() + messages.iter().map(|m| m.content.len()).sum::<usize>();
    (prompt_bytes as u64) / 4 + spec.continuation.token_buffer
}
