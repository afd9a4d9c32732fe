use super::types::ProviderKind;
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Outbound budget for one provider over a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub tokens: u64,
    pub requests: u64,
    pub period: Duration,
}

#[derive(Debug)]
struct BucketState {
    window_started: Instant,
    tokens_used: u64,
    requests_used: u64,
}

#[derive(Debug)]
struct Bucket {
    policy: RateLimitPolicy,
    state: Mutex<BucketState>,
    refill: Condvar,
}

impl Bucket {
    fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(BucketState {
                window_started: Instant::now(),
                tokens_used: 0,
                requests_used: 0,
            }),
            refill: Condvar::new(),
        }
    }

    /// Block until the bucket admits one request spending `tokens`.
    /// Callers wait on exhaustion rather than fail.
    fn acquire(&self, tokens: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let elapsed = state.window_started.elapsed();
            if elapsed >= self.policy.period {
                state.window_started = Instant::now();
                state.tokens_used = 0;
                state.requests_used = 0;
                self.refill.notify_all();
            }

            let tokens_fit = state.tokens_used.saturating_add(tokens) <= self.policy.tokens
                || tokens > self.policy.tokens && state.tokens_used == 0;
            if state.requests_used < self.policy.requests && tokens_fit {
                state.tokens_used = state.tokens_used.saturating_add(tokens);
                state.requests_used += 1;
                return;
            }

            let remaining = self.policy.period.saturating_sub(state.window_started.elapsed());
            let wait = remaining.max(Duration::from_millis(10));
            let (next, _timed_out) = self
                .refill
                .wait_timeout(state, wait)
                .unwrap_or_else(|e| e.into_inner());
            state = next;
        }
    }
}

/// Per-provider token buckets gating outbound LLM calls.
#[derive(Debug, Default)]
pub struct RateLimiterSet {
    buckets: BTreeMap<ProviderKind, Bucket>,
}

impl RateLimiterSet {
    pub fn new(policies: BTreeMap<ProviderKind, RateLimitPolicy>) -> Self {
        Self {
            buckets: policies
                .into_iter()
                .map(|(provider, policy)| (provider, Bucket::new(policy)))
                .collect(),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn acquire(&self, provider: ProviderKind, estimated_tokens: u64) {
        if let Some(bucket) = self.buckets.get(&provider) {
            bucket.acquire(estimated_tokens);
        }
    }
}
