mod adapter;
mod rate_limit;
mod transport;
mod types;

pub use adapter::{CompletionSpec, LlmAdapter, CONTINUATION_PROMPT};
pub use rate_limit::{RateLimitPolicy, RateLimiterSet};
pub use transport::{ChatTransport, HttpTransport};
pub use types::{
    ChatMessage, CompletionOutcome, ContinuationPolicy, FinishReason, LlmError, ProviderKind,
    RetryPolicy, Role, TransportRequest, TransportResponse, Usage,
};
