use super::{Agent, AgentResult, AgentServices, Context, FailureKind, MessageSet};
use crate::agents::result::AgentMetrics;
use crate::config::{ConfigError, ConfigTree};
use crate::lineage::{EventBody, ExecutionScope, WorkflowLineage};
use crate::skills::{parse_manifest, ProjectScanner, ScanRequest};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Project discovery. Not an LLM call: shells out to the scanner
/// collaborator and parses its manifest stream into `path -> content`.
pub struct DiscoveryAgent {
    scanner: Arc<dyn ProjectScanner>,
    input_paths: Vec<String>,
    exclusions: Vec<String>,
}

impl DiscoveryAgent {
    pub fn factory(
        config: &ConfigTree,
        services: &AgentServices,
    ) -> Result<Box<dyn Agent>, ConfigError> {
        let view = config.subtree("llm_config.agents.discovery");
        Ok(Box::new(Self {
            scanner: services.scanner.clone(),
            input_paths: string_list(view.get("scanner.input_paths")),
            exclusions: string_list(view.get("scanner.exclusions")),
        }))
    }
}

impl Agent for DiscoveryAgent {
    fn kind(&self) -> &str {
        "discovery"
    }

    fn process(
        &self,
        context: &Context,
        scope: &ExecutionScope,
        lineage: &mut WorkflowLineage,
    ) -> AgentResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        let Some(project_path) = context.project_path() else {
            return self.finish(
                context,
                scope,
                lineage,
                started_at,
                AgentResult::failed(FailureKind::Input, "context is missing `project_path`"),
            );
        };

        let request = ScanRequest {
            project_path: PathBuf::from(project_path),
            input_paths: self.input_paths.clone(),
            exclusions: self.exclusions.clone(),
        };
        let result = match self.scanner.scan(&request) {
            Ok(stream) => {
                let files = parse_manifest(&stream);
                log::info!(
                    "discovery: scanned {} yielding {} files",
                    project_path,
                    files.len()
                );
                let data = json!({
                    "files": files,
                    "raw_output": stream,
                    "project_path": project_path,
                });
                AgentResult::succeeded(data, MessageSet::default(), AgentMetrics {
                    duration_ms: clock.elapsed().as_millis() as u64,
                    ..AgentMetrics::default()
                })
            }
            Err(err) => AgentResult::failed(FailureKind::Io, err),
        };
        self.finish(context, scope, lineage, started_at, result)
    }
}

impl DiscoveryAgent {
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

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
