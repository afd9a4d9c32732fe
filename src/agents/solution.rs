use super::{
    completion_spec, llm_failure_kind, metrics_from_outcome, Agent, AgentResult, AgentServices,
    Context, FailureKind, MessageSet,
};
use crate::agents::change::FileChange;
use crate::agents::extract::extract_json;
use crate::agents::prompt::render_template;
use crate::config::{AgentView, ConfigError, ConfigTree};
use crate::lineage::{EventBody, ExecutionScope, WorkflowLineage};
use crate::llm::LlmAdapter;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Designs concrete file modifications from the discovery manifest and the
/// refactoring intent. Expects the model to reply with a JSON document
/// `{"changes": [FileChange]}`.
pub struct SolutionDesignerAgent {
    view: AgentView,
    adapter: LlmAdapter,
}

impl SolutionDesignerAgent {
    pub fn factory(
        config: &ConfigTree,
        services: &AgentServices,
    ) -> Result<Box<dyn Agent>, ConfigError> {
        let view = AgentView::resolve(config, "solution_designer")?;
        view.prompt("system")?;
        view.prompt("solution")?;
        Ok(Box::new(Self {
            view,
            adapter: services.adapter.clone(),
        }))
    }

    fn placeholder_values(&self, context: &Context) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        if let Some(run_id) = context.workflow_run_id() {
            values.insert("workflow_run_id".to_string(), run_id.to_string());
        }
        if let Some(path) = context.project_path() {
            values.insert("project_path".to_string(), path.to_string());
        }
        if let Some(description) = context.intent_description() {
            values.insert("intent".to_string(), description.to_string());
        }
        let raw_output = context
            .get_path("input_data.discovery_data.raw_output")
            .or_else(|| context.get_path("input_data.raw_output"))
            .or_else(|| context.get_path("discovery_data.raw_output"))
            .and_then(Value::as_str);
        if let Some(source) = raw_output {
            values.insert("source_code".to_string(), source.to_string());
        }
        values
    }

    fn parse_changes(content: &str) -> Result<Vec<FileChange>, String> {
        let document =
            extract_json(content).ok_or_else(|| "reply carried no JSON document".to_string())?;
        let changes_value = document
            .get("changes")
            .ok_or_else(|| "JSON document is missing `changes`".to_string())?;
        let changes: Vec<FileChange> = serde_json::from_value(changes_value.clone())
            .map_err(|err| format!("`changes` entries are malformed: {err}"))?;
        for change in &changes {
            change.validate()?;
        }
        Ok(changes)
    }
}

impl Agent for SolutionDesignerAgent {
    fn kind(&self) -> &str {
        "solution_designer"
    }

    fn process(
        &self,
        context: &Context,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
    ) -> AgentResult {
        let started_at = Utc::now();

        let system = match self.view.prompt("system") {
            Ok(prompt) => prompt.to_string(),
            Err(err) => {
                return self.finish(
                    context,
                    scope,
                    lineage,
                    started_at,
                    AgentResult::failed(FailureKind::Config, err),
                )
            }
        };
        let template = match self.view.prompt("solution") {
            Ok(prompt) => prompt.to_string(),
            Err(err) => {
                return self.finish(
                    context,
                    scope,
                    lineage,
                    started_at,
                    AgentResult::failed(FailureKind::Config, err),
                )
            }
        };

        let user = match render_template(&template, &self.placeholder_values(context)) {
            Ok(rendered) => rendered,
            Err(token) => {
                return self.finish(
                    context,
                    scope,
                    lineage,
                    started_at,
                    AgentResult::failed(
                        FailureKind::Input,
                        format!("missing required placeholder `{{{token}}}`"),
                    ),
                )
            }
        };

        let spec = completion_spec(&self.view, system.clone(), user.clone());
        let outcome = match self.adapter.complete(&spec) {
            Ok(outcome) => outcome,
            Err(err) => {
                let result = AgentResult::failed(llm_failure_kind(&err), &err).with_messages(
                    MessageSet {
                        system,
                        user,
                        assistant: String::new(),
                    },
                );
                return self.finish(context, scope, lineage, started_at, result);
            }
        };

        let messages = MessageSet {
            system,
            user,
            assistant: outcome.content.clone(),
        };
        let metrics = metrics_from_outcome(&outcome);

        let result = if outcome.truncated {
            AgentResult::failed(FailureKind::Parse, "reply was truncated by the model")
                .with_data(json!({ "raw_output": outcome.content }))
                .with_messages(messages)
                .with_metrics(metrics)
        } else {
            match Self::parse_changes(&outcome.content) {
                Ok(changes) => {
                    log::info!("solution_designer: designed {} changes", changes.len());
                    AgentResult::succeeded(
                        json!({ "changes": changes, "raw_output": outcome.content }),
                        messages,
                        metrics,
                    )
                }
                Err(reason) => AgentResult::failed(FailureKind::Parse, reason)
                    .with_data(json!({ "raw_output": outcome.content }))
                    .with_messages(messages)
                    .with_metrics(metrics),
            }
        };
        self.finish(context, scope, lineage, started_at, result)
    }
}

impl SolutionDesignerAgent {
    fn finish(
        &self,
        context: &Context,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
        started_at: chrono::DateTime<Utc>,
        result: AgentResult,
    ) -> AgentResult {
        lineage.record(
            scope,
            self.kind(),
            EventBody {
                started_at,
                finished_at: Utc::now(),
                input_snapshot: context.to_value(),
                output_snapshot: result.data.clone(),
                metrics: serde_json::to_value(result.metrics).unwrap_or(Value::Null),
                error: result.error.clone(),
            },
        );
        result
    }
}
