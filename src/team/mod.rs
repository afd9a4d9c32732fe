mod routing;

pub use routing::{evaluate_condition, evaluate_routing, RoutingPolicy, RoutingRule, RoutingScope};

use crate::agents::{AgentRegistry, AgentResult, AgentServices, Context, FailureKind};
use crate::config::ConfigTree;
use crate::lineage::WorkflowLineage;
use crate::shared::ids::{AgentKind, TaskName, TeamId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: TaskName,
    pub agent: AgentKind,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    /// Per-task configuration overlay, highest merge precedence.
    #[serde(default)]
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDefinition {
    pub team_id: TeamId,
    pub display_name: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub routing: RoutingPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamResult {
    pub success: bool,
    pub data: Value,
    #[serde(default)]
    pub next_team: Option<TeamId>,
    pub tasks: Vec<AgentResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub halted_for_approval: bool,
}

/// Shared machinery a team needs to run its tasks.
pub struct TeamRuntime<'a> {
    pub registry: &'a AgentRegistry,
    pub services: &'a AgentServices,
    pub config: &'a ConfigTree,
    pub approvals_enabled: bool,
}

/// An ordered group of agent tasks plus a routing policy selecting the
/// next team.
#[derive(Debug, Clone)]
pub struct Team {
    definition: TeamDefinition,
}

impl Team {
    pub fn new(definition: TeamDefinition) -> Self {
        Self { definition }
    }

    pub fn team_id(&self) -> &TeamId {
        &self.definition.team_id
    }

    pub fn definition(&self) -> &TeamDefinition {
        &self.definition
    }

    /// Run the task list strictly in order, folding each task's output into
    /// `input_data` before the next one. Returns the team result and the
    /// derived context the next team starts from.
    pub fn execute(
        &self,
        context: &Context,
        runtime: &TeamRuntime<'_>,
        lineage: &mut WorkflowLineage,
    ) -> (TeamResult, Context) {
        log::info!(
            "team {}: starting {} tasks",
            self.definition.team_id,
            self.definition.tasks.len()
        );

        let mut ctx = context.clone();
        let mut task_results: Vec<AgentResult> = Vec::new();
        let mut team_data = Map::new();
        let mut team_error: Option<String> = None;
        let mut halted_for_approval = false;

        for task in &self.definition.tasks {
            if runtime.approvals_enabled && task.requires_approval {
                log::info!(
                    "team {}: task {} requires approval; pausing",
                    self.definition.team_id,
                    task.name
                );
                team_error = Some(format!("task `{}` is awaiting approval", task.name));
                halted_for_approval = true;
                break;
            }

            let task_config = match &task.config {
                Some(overlay) => runtime
                    .config
                    .merged_with(&ConfigTree::from_value(overlay.clone())),
                None => runtime.config.clone(),
            };

            let result = self.run_task(task, &task_config, &mut ctx, runtime, lineage);
            let succeeded = result.success;
            if succeeded {
                if let Value::Object(data) = &result.data {
                    for (key, value) in data {
                        team_data.insert(key.clone(), value.clone());
                    }
                }
                ctx = ctx.with_input_data(result.data.clone());
            } else {
                team_error = result.error.clone();
            }
            task_results.push(result);
            if !succeeded {
                break;
            }
        }

        let data = Value::Object(team_data);
        let next_team = evaluate_routing(
            &self.definition.routing,
            &RoutingScope {
                results: &task_results,
                data: &data,
            },
        );

        let success = !halted_for_approval && task_results.iter().all(|r| r.success);
        log::info!(
            "team {}: finished success={} next={}",
            self.definition.team_id,
            success,
            next_team
                .as_ref()
                .map(|t| t.as_str())
                .unwrap_or("none")
        );

        (
            TeamResult {
                success,
                data,
                next_team,
                tasks: task_results,
                error: team_error,
                halted_for_approval,
            },
            ctx,
        )
    }

    /// One task with its bounded retry budget. Every attempt is a fresh
    /// agent invocation with its own lineage event; retries parent-link to
    /// the prior attempt.
    fn run_task(
        &self,
        task: &TaskSpec,
        task_config: &ConfigTree,
        ctx: &mut Context,
        runtime: &TeamRuntime<'_>,
        lineage: &mut WorkflowLineage,
    ) -> AgentResult {
        let agent = match runtime
            .registry
            .build(task.agent.as_str(), task_config, runtime.services)
        {
            Ok(agent) => agent,
            Err(err) => return AgentResult::failed(FailureKind::Config, err),
        };

        let mut prior_scope = None;
        let mut attempt = 0u32;
        loop {
            let scope = match &prior_scope {
                None => lineage.agent_scope(),
                Some(prior) => lineage.retry_scope(prior),
            };
            let result = agent.process(ctx, &scope, lineage);
            *ctx = ctx.with_sequence_entry(task.agent.as_str(), &scope.execution_id, scope.step);

            if result.success || attempt >= task.max_retries {
                if !result.success {
                    log::warn!(
                        "team {}: task {} failed after {} attempts: {}",
                        self.definition.team_id,
                        task.name,
                        attempt + 1,
                        result.error_message()
                    );
                }
                return result;
            }

            log::warn!(
                "team {}: task {} attempt {} failed ({}); retrying in {}s",
                self.definition.team_id,
                task.name,
                attempt + 1,
                result.error_message(),
                task.retry_delay_seconds
            );
            if task.retry_delay_seconds > 0 {
                std::thread::sleep(Duration::from_secs(task.retry_delay_seconds));
            }
            prior_scope = Some(scope);
            attempt += 1;
        }
    }
}
