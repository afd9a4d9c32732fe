use super::{Agent, AgentResult, AgentServices, Context, FailureKind, MessageSet};
use crate::agents::change::{ChangeType, FileChange};
use crate::agents::result::AgentMetrics;
use crate::config::{ConfigError, ConfigTree};
use crate::lineage::{EventBody, ExecutionScope, WorkflowLineage};
use crate::skills::{AssetWriter, MergeSkill, SkillError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

/// Applies a changeset to the project tree: each change runs through the
/// merge collaborator and is persisted with backup by the asset writer.
/// Merge sub-calls are recorded as skill-level lineage events parented to
/// this agent's event.
pub struct CoderAgent {
    merge: Arc<dyn MergeSkill>,
    assets: Arc<AssetWriter>,
}

#[derive(Debug, Clone, Serialize)]
struct ChangeOutcome {
    file: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct SkillRecord {
    scope: ExecutionScope,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    input_snapshot: Value,
    output_snapshot: Value,
    metrics: Value,
    error: Option<String>,
}

impl CoderAgent {
    pub fn factory(
        _config: &ConfigTree,
        services: &AgentServices,
    ) -> Result<Box<dyn Agent>, ConfigError> {
        Ok(Box::new(Self {
            merge: services.merge.clone(),
            assets: services.assets.clone(),
        }))
    }

    fn apply_change(
        &self,
        change: &FileChange,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
        skill_records: &mut Vec<SkillRecord>,
        totals: &mut AgentMetrics,
    ) -> Result<ChangeOutcome, SkillError> {
        if change.change_type == ChangeType::Delete {
            return match self.assets.delete(&change.file_path, true) {
                Ok(receipt) => Ok(ChangeOutcome {
                    file: change.file_path.clone(),
                    success: true,
                    backup_path: receipt.backup_path.map(|p| p.display().to_string()),
                    error: None,
                }),
                Err(err @ SkillError::BackupFailed { .. }) => Err(err),
                Err(err) => Ok(ChangeOutcome {
                    file: change.file_path.clone(),
                    success: false,
                    backup_path: None,
                    error: Some(format!("{}: {err}", FailureKind::Io)),
                }),
            };
        }

        let original = match self.assets.read_existing(&change.file_path) {
            Ok(original) => original,
            Err(err) => {
                return Ok(ChangeOutcome {
                    file: change.file_path.clone(),
                    success: false,
                    backup_path: None,
                    error: Some(format!("{}: {err}", FailureKind::Io)),
                })
            }
        };

        let skill_scope = lineage.skill_scope(scope);
        let merge_started = Utc::now();
        let merged = self.merge.merge(original.as_deref(), change);
        let merge_finished = Utc::now();

        let (record_output, record_metrics, record_error) = match &merged {
            Ok(outcome) => {
                let metrics = outcome
                    .llm_trace
                    .as_ref()
                    .map(|trace| {
                        totals.prompt_tokens += trace.usage.prompt_tokens;
                        totals.completion_tokens += trace.usage.completion_tokens;
                        totals.total_tokens += trace.usage.total_tokens;
                        totals.continuations += trace.continuations;
                        json!({
                            "prompt_tokens": trace.usage.prompt_tokens,
                            "completion_tokens": trace.usage.completion_tokens,
                            "total_tokens": trace.usage.total_tokens,
                            "duration_ms": trace.duration.as_millis() as u64,
                            "continuations": trace.continuations,
                        })
                    })
                    .unwrap_or(Value::Null);
                (
                    json!({ "content_bytes": outcome.content.len() }),
                    metrics,
                    None,
                )
            }
            Err(err) => (Value::Null, Value::Null, Some(err.to_string())),
        };
        skill_records.push(SkillRecord {
            scope: skill_scope,
            started_at: merge_started,
            finished_at: merge_finished,
            input_snapshot: json!({
                "file_path": change.file_path,
                "type": change.change_type.to_string(),
                "has_content": change.content.is_some(),
                "has_diff": change.diff.is_some(),
            }),
            output_snapshot: record_output,
            metrics: record_metrics,
            error: record_error,
        });

        let outcome = match merged {
            Ok(outcome) => outcome,
            Err(err) => {
                return Ok(ChangeOutcome {
                    file: change.file_path.clone(),
                    success: false,
                    backup_path: None,
                    error: Some(format!("{}: {err}", FailureKind::Merge)),
                })
            }
        };

        match self.assets.write(&change.file_path, &outcome.content, true) {
            Ok(receipt) => Ok(ChangeOutcome {
                file: change.file_path.clone(),
                success: true,
                backup_path: receipt.backup_path.map(|p| p.display().to_string()),
                error: None,
            }),
            Err(err @ SkillError::BackupFailed { .. }) => Err(err),
            Err(err) => Ok(ChangeOutcome {
                file: change.file_path.clone(),
                success: false,
                backup_path: None,
                error: Some(format!("{}: {err}", FailureKind::Io)),
            }),
        }
    }
}

impl Agent for CoderAgent {
    fn kind(&self) -> &str {
        "coder"
    }

    fn process(
        &self,
        context: &Context,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
    ) -> AgentResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        // An absent change list is an empty one: a rescuing team may route
        // here with nothing left to apply.
        let changes: Vec<FileChange> = match context.get_path("input_data.changes") {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(changes) => changes,
                Err(err) => {
                    let result = AgentResult::failed(
                        FailureKind::Input,
                        format!("`input_data.changes` is malformed: {err}"),
                    );
                    return self.finish(context, scope, lineage, started_at, Vec::new(), result);
                }
            },
            None => Vec::new(),
        };

        let mut outcomes: Vec<ChangeOutcome> = Vec::with_capacity(changes.len());
        let mut skill_records = Vec::new();
        let mut totals = AgentMetrics::default();
        let mut fatal: Option<String> = None;

        for change in &changes {
            match self.apply_change(change, scope, lineage, &mut skill_records, &mut totals) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    // A failed backup aborts the rest of the changeset.
                    outcomes.push(ChangeOutcome {
                        file: change.file_path.clone(),
                        success: false,
                        backup_path: None,
                        error: Some(format!("{}: {err}", FailureKind::Io)),
                    });
                    fatal = Some(format!("{}: {err}", FailureKind::Io));
                    break;
                }
            }
        }

        totals.duration_ms = clock.elapsed().as_millis() as u64;
        let first_failure = fatal.or_else(|| {
            outcomes
                .iter()
                .find(|outcome| !outcome.success)
                .and_then(|outcome| outcome.error.clone())
        });
        let data = json!({ "changes": outcomes });
        let result = match first_failure {
            None => {
                log::info!("coder: applied {} changes", outcomes.len());
                AgentResult::succeeded(data, MessageSet::default(), totals)
            }
            Some(error) => AgentResult {
                success: false,
                data,
                error: Some(error),
                messages: MessageSet::default(),
                metrics: totals,
            },
        };
        self.finish(context, scope, lineage, started_at, skill_records, result)
    }
}

impl CoderAgent {
    fn finish(
        &self,
        context: &Context,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
        started_at: DateTime<Utc>,
        skill_records: Vec<SkillRecord>,
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
        // Skill events land after the parent so emission stays in step
        // order; their parent_id still points at the coder's event.
        for record in skill_records {
            lineage.record(
                &record.scope,
                "merge",
                EventBody {
                    started_at: record.started_at,
                    finished_at: record.finished_at,
                    input_snapshot: record.input_snapshot,
                    output_snapshot: record.output_snapshot,
                    metrics: record.metrics,
                    error: record.error,
                },
            );
        }
        result
    }
}
