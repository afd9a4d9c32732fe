pub mod change;
mod coder;
mod context;
mod discovery;
mod extract;
mod prompt;
mod registry;
mod result;
mod solution;

pub use change::{ChangeType, FileChange};
pub use coder::CoderAgent;
pub use context::{
    Context, KEY_AGENT_SEQUENCE, KEY_INPUT_DATA, KEY_INTENT, KEY_PROJECT_PATH, KEY_STEP,
    KEY_WORKFLOW_RUN_ID,
};
pub use discovery::DiscoveryAgent;
pub use extract::extract_json;
pub use prompt::render_template;
pub use registry::{AgentFactory, AgentRegistry};
pub use result::{AgentMetrics, AgentResult, FailureKind, MessageSet};
pub use solution::SolutionDesignerAgent;

use crate::config::AgentView;
use crate::lineage::{ExecutionScope, WorkflowLineage};
use crate::llm::{ChatMessage, CompletionOutcome, CompletionSpec, LlmAdapter, LlmError};
use crate::skills::{AssetWriter, MergeSkill, ProjectScanner};
use std::sync::Arc;

/// A unit that, given a context, consults an LLM (or the scanner) and
/// returns a structured result. Implementations emit their own lineage
/// event under the scope handed to them and never retry internally.
pub trait Agent: Send + Sync {
    fn kind(&self) -> &str;

    fn process(
        &self,
        context: &Context,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
    ) -> AgentResult;
}

/// Shared collaborators handed to agent constructors.
#[derive(Clone)]
pub struct AgentServices {
    pub adapter: LlmAdapter,
    pub scanner: Arc<dyn ProjectScanner>,
    pub merge: Arc<dyn MergeSkill>,
    pub assets: Arc<AssetWriter>,
}

pub(crate) fn completion_spec(view: &AgentView, system: String, user: String) -> CompletionSpec {
    CompletionSpec {
        provider: view.provider,
        model: view.model.clone(),
        api_base: view.api_base.clone(),
        api_key_env: view.api_key_env.clone(),
        system,
        messages: vec![ChatMessage::user(user)],
        temperature: view.temperature,
        model_params: view.model_params.clone(),
        thinking_budget: view.thinking_budget(),
        timeout: view.timeout,
        retry: view.retry,
        continuation: view.continuation,
    }
}

pub(crate) fn llm_failure_kind(error: &LlmError) -> FailureKind {
    if error.is_retriable() {
        FailureKind::LlmTransient
    } else {
        FailureKind::LlmPermanent
    }
}

pub(crate) fn metrics_from_outcome(outcome: &CompletionOutcome) -> AgentMetrics {
    AgentMetrics {
        prompt_tokens: outcome.usage.prompt_tokens,
        completion_tokens: outcome.usage.completion_tokens,
        total_tokens: outcome.usage.total_tokens,
        duration_ms: outcome.duration.as_millis() as u64,
        continuations: outcome.continuations,
    }
}
