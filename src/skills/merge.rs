use super::SkillError;
use crate::agents::change::{ChangeType, FileChange};
use crate::config::AgentView;
use crate::llm::{ChatMessage, CompletionSpec, LlmAdapter, Usage};
use std::time::Duration;

const DEFAULT_MERGE_SYSTEM_PROMPT: &str = "You are a precise code merge tool. \
Given the original file content and a unified diff describing a change, \
produce the complete merged file. Output only the merged file content with \
no commentary and no code fences.";

const DEFAULT_MERGE_PROMPT: &str = "File: {file_path}\n\n\
Original content:\n{original}\n\n\
Change to apply (unified diff):\n{diff}\n\n\
Return the complete file content after applying the change.";

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub content: String,
    /// Present when the merge consulted an LLM; carries what a skill-level
    /// lineage event needs.
    pub llm_trace: Option<MergeLlmTrace>,
}

#[derive(Debug, Clone)]
pub struct MergeLlmTrace {
    pub system: String,
    pub user: String,
    pub assistant: String,
    pub usage: Usage,
    pub continuations: u32,
    pub duration: Duration,
}

/// Merge collaborator: `(original, change) -> merged content`. For
/// `create`, `original` is absent.
pub trait MergeSkill: Send + Sync {
    fn merge(&self, original: Option<&str>, change: &FileChange) -> Result<MergeOutcome, SkillError>;
}

/// Default merge implementation. Changes carrying full `content` pass
/// through untouched; diff-only changes are merged by the LLM.
pub struct LlmMerge {
    adapter: LlmAdapter,
    view: AgentView,
}

impl LlmMerge {
    pub fn new(adapter: LlmAdapter, view: AgentView) -> Self {
        Self { adapter, view }
    }

    fn merge_with_llm(
        &self,
        original: Option<&str>,
        change: &FileChange,
        diff: &str,
    ) -> Result<MergeOutcome, SkillError> {
        let system = self
            .view
            .prompt("system")
            .unwrap_or(DEFAULT_MERGE_SYSTEM_PROMPT)
            .to_string();
        let template = self
            .view
            .prompt("merge")
            .unwrap_or(DEFAULT_MERGE_PROMPT)
            .to_string();
        let user = template
            .replace("{file_path}", &change.file_path)
            .replace("{original}", original.unwrap_or(""))
            .replace("{diff}", diff);

        let spec = CompletionSpec {
            provider: self.view.provider,
            model: self.view.model.clone(),
            api_base: self.view.api_base.clone(),
            api_key_env: self.view.api_key_env.clone(),
            system: system.clone(),
            messages: vec![ChatMessage::user(user.clone())],
            temperature: self.view.temperature,
            model_params: self.view.model_params.clone(),
            thinking_budget: self.view.thinking_budget(),
            timeout: self.view.timeout,
            retry: self.view.retry,
            continuation: self.view.continuation,
        };
        let outcome = self
            .adapter
            .complete(&spec)
            .map_err(|err| SkillError::Merge {
                file: change.file_path.clone(),
                reason: err.to_string(),
            })?;
        if outcome.truncated {
            return Err(SkillError::Merge {
                file: change.file_path.clone(),
                reason: "merged content was truncated by the model".to_string(),
            });
        }

        Ok(MergeOutcome {
            content: strip_fences(&outcome.content).to_string(),
            llm_trace: Some(MergeLlmTrace {
                system,
                user,
                assistant: outcome.content.clone(),
                usage: outcome.usage,
                continuations: outcome.continuations,
                duration: outcome.duration,
            }),
        })
    }
}

impl MergeSkill for LlmMerge {
    fn merge(&self, original: Option<&str>, change: &FileChange) -> Result<MergeOutcome, SkillError> {
        if change.change_type == ChangeType::Delete {
            return Err(SkillError::Merge {
                file: change.file_path.clone(),
                reason: "delete changes carry no content to merge".to_string(),
            });
        }
        if let Some(content) = &change.content {
            return Ok(MergeOutcome {
                content: content.clone(),
                llm_trace: None,
            });
        }
        match &change.diff {
            Some(diff) => self.merge_with_llm(original, change, diff),
            None => Err(SkillError::Merge {
                file: change.file_path.clone(),
                reason: "change carries neither content nor diff".to_string(),
            }),
        }
    }
}

/// Merge without an LLM: full-content changes apply directly, diff-only
/// changes are rejected. Used when no merge agent is configured.
#[derive(Debug, Clone, Default)]
pub struct ContentOnlyMerge;

impl MergeSkill for ContentOnlyMerge {
    fn merge(&self, _original: Option<&str>, change: &FileChange) -> Result<MergeOutcome, SkillError> {
        match &change.content {
            Some(content) => Ok(MergeOutcome {
                content: content.clone(),
                llm_trace: None,
            }),
            None => Err(SkillError::Merge {
                file: change.file_path.clone(),
                reason: "diff-based change needs a configured merge agent".to_string(),
            }),
        }
    }
}

/// Trim a single wrapping code fence if the model added one anyway.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body_start) = rest.find('\n') else {
        return trimmed;
    };
    let body = &rest[body_start + 1..];
    match body.rfind("```") {
        Some(end) => body[..end].trim_end_matches('\n'),
        None => trimmed,
    }
}
