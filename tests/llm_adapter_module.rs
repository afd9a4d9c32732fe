use refactory::llm::{
    ChatMessage, ChatTransport, CompletionSpec, ContinuationPolicy, FinishReason, LlmAdapter,
    LlmError, ProviderKind, RateLimiterSet, RetryPolicy, TransportRequest, TransportResponse,
    Usage, CONTINUATION_PROMPT,
};
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<TransportResponse, LlmError>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Result<TransportResponse, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatTransport for ScriptedTransport {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, LlmError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Transport {
                    provider: ProviderKind::Anthropic,
                    detail: "script exhausted".to_string(),
                })
            })
    }
}

fn reply(content: &str, finish_reason: FinishReason) -> TransportResponse {
    TransportResponse {
        content: content.to_string(),
        finish_reason,
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        },
    }
}

fn spec() -> CompletionSpec {
    CompletionSpec {
        provider: ProviderKind::Anthropic,
        model: "test-model".to_string(),
        api_base: None,
        api_key_env: None,
        system: "system prompt".to_string(),
        messages: vec![ChatMessage::user("user prompt")],
        temperature: 0.0,
        model_params: Map::new(),
        thinking_budget: None,
        timeout: Duration::from_secs(30),
        retry: RetryPolicy {
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(100),
            max_retries: 5,
        },
        continuation: ContinuationPolicy::default(),
    }
}

fn adapter(transport: Arc<ScriptedTransport>) -> LlmAdapter {
    LlmAdapter::new(transport, Arc::new(RateLimiterSet::unlimited()))
}

#[test]
fn single_response_passes_through() {
    let transport = ScriptedTransport::new(vec![Ok(reply("hello", FinishReason::Stop))]);
    let outcome = adapter(transport.clone()).complete(&spec()).expect("complete");
    assert_eq!(outcome.content, "hello");
    assert_eq!(outcome.finish_reason, FinishReason::Stop);
    assert_eq!(outcome.continuations, 0);
    assert!(!outcome.truncated);
    assert_eq!(outcome.usage.total_tokens, 15);
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn length_finish_triggers_continuation_and_stitches_verbatim() {
    let transport = ScriptedTransport::new(vec![
        Ok(reply("{\"changes\": [", FinishReason::Length)),
        Ok(reply("{\"file_path\": \"a.py\"}]}", FinishReason::Stop)),
    ]);
    let outcome = adapter(transport.clone()).complete(&spec()).expect("complete");
    assert_eq!(outcome.content, "{\"changes\": [{\"file_path\": \"a.py\"}]}");
    assert_eq!(outcome.continuations, 1);
    assert!(!outcome.truncated);
    // Usage accumulates across hops.
    assert_eq!(outcome.usage.prompt_tokens, 20);
    assert_eq!(outcome.usage.completion_tokens, 10);
    assert_eq!(outcome.usage.total_tokens, 30);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let continuation = &requests[1];
    // Conversation extended by the partial assistant turn plus the fixed
    // continuation instruction.
    assert_eq!(continuation.messages.len(), 3);
    assert_eq!(continuation.messages[1].content, "{\"changes\": [");
    assert_eq!(continuation.messages[2].content, CONTINUATION_PROMPT);
}

#[test]
fn continuation_budget_exhaustion_marks_truncated() {
    let transport = ScriptedTransport::new(vec![
        Ok(reply("part1 ", FinishReason::Length)),
        Ok(reply("part2 ", FinishReason::Length)),
        Ok(reply("part3 ", FinishReason::Length)),
    ]);
    let mut spec = spec();
    spec.continuation.max_attempts = 2;
    let outcome = adapter(transport).complete(&spec).expect("complete");
    assert_eq!(outcome.content, "part1 part2 part3 ");
    assert_eq!(outcome.continuations, 2);
    assert!(outcome.truncated);
    assert_eq!(outcome.finish_reason, FinishReason::Length);
}

#[test]
fn zero_continuation_attempts_marks_any_length_finish_truncated() {
    let transport = ScriptedTransport::new(vec![Ok(reply("partial", FinishReason::Length))]);
    let mut spec = spec();
    spec.continuation.max_attempts = 0;
    let outcome = adapter(transport.clone()).complete(&spec).expect("complete");
    assert!(outcome.truncated);
    assert_eq!(outcome.content, "partial");
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn disabled_continuation_does_not_reissue() {
    let transport = ScriptedTransport::new(vec![Ok(reply("partial", FinishReason::Length))]);
    let mut spec = spec();
    spec.continuation.enabled = false;
    let outcome = adapter(transport.clone()).complete(&spec).expect("complete");
    assert!(outcome.truncated);
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn rate_limit_errors_back_off_exponentially_then_succeed() {
    let rate_limited = || {
        Err(LlmError::RateLimited {
            provider: ProviderKind::Anthropic,
            detail: "slow down".to_string(),
        })
    };
    let transport = ScriptedTransport::new(vec![
        rate_limited(),
        rate_limited(),
        rate_limited(),
        Ok(reply("recovered", FinishReason::Stop)),
    ]);
    let spec = spec();
    let started = Instant::now();
    let outcome = adapter(transport.clone()).complete(&spec).expect("complete");
    let elapsed = started.elapsed();

    assert_eq!(outcome.content, "recovered");
    assert_eq!(transport.requests().len(), 4);
    // delay(0) + delay(1) + delay(2) = 5ms + 10ms + 20ms.
    assert!(
        elapsed >= Duration::from_millis(35),
        "expected at least 35ms of backoff, got {elapsed:?}"
    );
    assert!(outcome.duration >= Duration::from_millis(35));
}

#[test]
fn retry_budget_exhaustion_surfaces_the_transient_error() {
    let overloaded = || {
        Err(LlmError::Overloaded {
            provider: ProviderKind::Anthropic,
            detail: "busy".to_string(),
        })
    };
    let transport = ScriptedTransport::new(vec![
        overloaded(),
        overloaded(),
        overloaded(),
    ]);
    let mut spec = spec();
    spec.retry.max_retries = 2;
    let err = adapter(transport.clone()).complete(&spec).expect_err("should fail");
    assert!(matches!(err, LlmError::Overloaded { .. }));
    assert_eq!(transport.requests().len(), 3);
}

#[test]
fn permanent_errors_fail_immediately() {
    let transport = ScriptedTransport::new(vec![Err(LlmError::Auth {
        provider: ProviderKind::Anthropic,
        detail: "bad key".to_string(),
    })]);
    let err = adapter(transport.clone()).complete(&spec()).expect_err("should fail");
    assert!(matches!(err, LlmError::Auth { .. }));
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn timeout_is_classified_retriable() {
    let transport = ScriptedTransport::new(vec![
        Err(LlmError::Timeout {
            provider: ProviderKind::Anthropic,
            timeout_ms: 30_000,
        }),
        Ok(reply("late but fine", FinishReason::Stop)),
    ]);
    let outcome = adapter(transport.clone()).complete(&spec()).expect("complete");
    assert_eq!(outcome.content, "late but fine");
    assert_eq!(transport.requests().len(), 2);
}

#[test]
fn exhausted_request_budget_waits_for_the_next_window() {
    use refactory::llm::RateLimitPolicy;
    let mut policies = std::collections::BTreeMap::new();
    policies.insert(
        ProviderKind::Anthropic,
        RateLimitPolicy {
            tokens: 1_000_000,
            requests: 2,
            period: Duration::from_millis(50),
        },
    );
    let limits = RateLimiterSet::new(policies);

    let started = Instant::now();
    limits.acquire(ProviderKind::Anthropic, 10);
    limits.acquire(ProviderKind::Anthropic, 10);
    assert!(started.elapsed() < Duration::from_millis(40), "first window should admit freely");
    // Third call exceeds the request budget and must wait for the refill.
    limits.acquire(ProviderKind::Anthropic, 10);
    assert!(
        started.elapsed() >= Duration::from_millis(40),
        "third call should have waited for the window to roll over"
    );
    // Unconfigured providers are never gated.
    limits.acquire(ProviderKind::OpenAi, 10);
}

#[test]
fn retry_delay_caps_at_max_delay() {
    let policy = RetryPolicy {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        max_retries: 10,
    };
    assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
    assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
}
