mod error;
mod store;
mod teams;

pub use error::OrchestratorError;
pub use store::{workflow_storage_dir, WorkflowRecord, WorkflowStatus, WorkflowStore};
pub use teams::load_teams;

use crate::agents::{AgentRegistry, AgentServices, Context};
use crate::config::{effective_config, AgentView, ConfigError, ConfigTree};
use crate::lineage::{FileSink, LineageRecorder, LineageSink, RemoteSink, WorkflowLineage};
use crate::llm::{ChatTransport, LlmAdapter, ProviderKind, RateLimitPolicy, RateLimiterSet};
use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::ids::{TeamId, WorkflowRunId};
use crate::skills::{
    AssetWriter, CommandScanner, ContentOnlyMerge, LlmMerge, MergeSkill, ProjectScanner,
};
use crate::team::{Team, TeamResult, TeamRuntime};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_ENTRY_TEAM: &str = "discovery";
const DEFAULT_MAX_TEAMS: usize = 10;
const DEFAULT_WORKFLOW_STORAGE_ROOT: &str = "workspaces/workflows";
const DEFAULT_LINEAGE_ROOT: &str = "workspaces/lineage";
const DEFAULT_BACKUP_ROOT: &str = "workspaces/backups";
const DEFAULT_SCANNER_COMMAND: &str = "tartxt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_files: Option<Vec<String>>,
}

/// A client's submission: project tree, refactoring intent, configuration
/// overlays.
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub project_path: PathBuf,
    pub intent: Intent,
    pub system_config: Option<ConfigTree>,
    pub app_config: Option<ConfigTree>,
}

/// Everything resolved at workflow start: effective configuration, initial
/// context, the team graph and the shared collaborators.
pub struct WorkflowInit {
    pub workflow_id: WorkflowRunId,
    pub effective: ConfigTree,
    pub context: Context,
    pub teams: BTreeMap<TeamId, Team>,
    pub entry_team: TeamId,
    pub max_teams: usize,
    pub retry_teams: bool,
    pub team_max_retries: u32,
    pub approvals_enabled: bool,
    pub services: AgentServices,
    pub recorder: Arc<LineageRecorder>,
    pub storage_dir: PathBuf,
}

/// Drives the team graph for one workflow at a time: merges overlays,
/// preflights the configuration, then follows routing until a terminal
/// state. One orchestrator serves many concurrent workflows; each `run`
/// call is independent.
pub struct Orchestrator {
    defaults: ConfigTree,
    registry: AgentRegistry,
    transport: Arc<dyn ChatTransport>,
    store: Arc<WorkflowStore>,
    scanner_override: Option<Arc<dyn ProjectScanner>>,
    merge_override: Option<Arc<dyn MergeSkill>>,
}

impl Orchestrator {
    pub fn new(
        defaults: ConfigTree,
        registry: AgentRegistry,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            defaults,
            registry,
            transport,
            store: Arc::new(WorkflowStore::new()),
            scanner_override: None,
            merge_override: None,
        }
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn ProjectScanner>) -> Self {
        self.scanner_override = Some(scanner);
        self
    }

    pub fn with_merge(mut self, merge: Arc<dyn MergeSkill>) -> Self {
        self.merge_override = Some(merge);
        self
    }

    pub fn store(&self) -> Arc<WorkflowStore> {
        self.store.clone()
    }

    pub fn teams_available(&self) -> usize {
        load_teams(&self.defaults).map(|teams| teams.len()).unwrap_or(0)
    }

    /// Full lifecycle for one work order. Configuration problems surface as
    /// a stored record with `status=error` rather than a transport failure.
    pub fn run(&self, order: &WorkOrder) -> Result<WorkflowRecord, OrchestratorError> {
        match self.initialize_workflow(order) {
            Ok(init) => Ok(self.execute_workflow(init)),
            Err(err) => {
                log::warn!("orchestrator: workflow rejected at initialization: {err}");
                let now = Utc::now();
                let mut record =
                    WorkflowRecord::pending(WorkflowRunId::generate(), String::new(), now);
                record.status = WorkflowStatus::Error;
                record.error = Some(err.to_string());
                record.finished_at = Some(now);
                self.store.put(record.clone())?;
                Ok(record)
            }
        }
    }

    pub fn initialize_workflow(&self, order: &WorkOrder) -> Result<WorkflowInit, OrchestratorError> {
        let effective = effective_config(
            &self.defaults,
            order.system_config.as_ref(),
            order.app_config.as_ref(),
        );
        let workflow_id = WorkflowRunId::generate();
        let started_at = Utc::now();

        let teams = load_teams(&effective)?;
        let entry_name = effective
            .get_str("orchestration.entry_team")
            .unwrap_or(DEFAULT_ENTRY_TEAM);
        let entry_team = TeamId::parse(entry_name)
            .map_err(ConfigError::Invalid)?;
        if !teams.contains_key(&entry_team) {
            return Err(ConfigError::UnknownEntryTeam(entry_name.to_string()).into());
        }

        let storage_root = PathBuf::from(
            effective
                .get_str("runtime.workflow_storage_root")
                .unwrap_or(DEFAULT_WORKFLOW_STORAGE_ROOT),
        );
        let storage_dir = workflow_storage_dir(&storage_root, &workflow_id, started_at);
        let effective_path = storage_dir.join("config/effective_config.json");
        atomic_write_json(&effective_path, effective.as_value())
            .map_err(|source| error::io_error(&effective_path, source))?;

        let recorder = Arc::new(self.build_recorder(&effective, &storage_dir));
        let services = self.build_services(order, &effective)?;
        self.preflight(&effective, &teams, &services)?;

        let intent_value = serde_json::to_value(&order.intent).map_err(|source| {
            OrchestratorError::Json {
                path: "intent".to_string(),
                source,
            }
        })?;
        let context = Context::new(
            workflow_id.as_str(),
            &order.project_path.display().to_string(),
            intent_value,
        );

        self.store.put(WorkflowRecord::pending(
            workflow_id.clone(),
            storage_dir.display().to_string(),
            started_at,
        ))?;

        log::info!(
            "orchestrator: workflow {workflow_id} initialized, entry team `{entry_team}`, {} teams loaded",
            teams.len()
        );

        Ok(WorkflowInit {
            workflow_id,
            context,
            teams,
            entry_team,
            max_teams: effective
                .get_u64("orchestration.max_teams")
                .unwrap_or(DEFAULT_MAX_TEAMS as u64) as usize,
            retry_teams: effective
                .get_bool("orchestration.error_handling.retry_teams")
                .unwrap_or(false),
            team_max_retries: effective
                .get_u64("orchestration.error_handling.max_retries")
                .unwrap_or(1) as u32,
            approvals_enabled: effective
                .get_bool("orchestration.approvals.enabled")
                .unwrap_or(false),
            services,
            recorder,
            storage_dir,
            effective,
        })
    }

    /// The driver loop: run the current team, track the execution path,
    /// follow routing. Terminates on `next_team=null`, the team cap, or a
    /// terminal failure no fallback rescues.
    pub fn execute_workflow(&self, init: WorkflowInit) -> WorkflowRecord {
        let mut lineage = WorkflowLineage::establish(
            init.recorder.clone(),
            init.workflow_id.as_str(),
            init.context.to_value(),
            Utc::now(),
        );
        let runtime = TeamRuntime {
            registry: &self.registry,
            services: &init.services,
            config: &init.effective,
            approvals_enabled: init.approvals_enabled,
        };

        let mut ctx = init.context.clone();
        let mut execution_path: Vec<TeamId> = Vec::new();
        let mut team_results: BTreeMap<String, TeamResult> = BTreeMap::new();
        let mut current = Some(init.entry_team.clone());
        let mut team_attempts = 0u32;
        let mut status = WorkflowStatus::Success;
        let mut error: Option<String> = None;

        while let Some(team_id) = current.take() {
            if execution_path.len() >= init.max_teams {
                status = WorkflowStatus::Error;
                error = Some(format!(
                    "team-cap exceeded: workflow ran {} teams (max_teams {})",
                    execution_path.len(),
                    init.max_teams
                ));
                break;
            }
            let Some(team) = init.teams.get(&team_id) else {
                status = WorkflowStatus::Error;
                error = Some(format!("routed to undefined team `{team_id}`"));
                break;
            };

            execution_path.push(team_id.clone());
            let team_input = ctx.clone();
            let (result, next_ctx) = team.execute(&team_input, &runtime, &mut lineage);

            if result.halted_for_approval {
                status = WorkflowStatus::Pending;
                error = result.error.clone();
                team_results.insert(team_id.as_str().to_string(), result);
                break;
            }

            let failed = !result.success;
            let next = result.next_team.clone();
            let first_task_error = result
                .tasks
                .iter()
                .find(|task| !task.success)
                .and_then(|task| task.error.clone())
                .or_else(|| result.error.clone());
            team_results.insert(team_id.as_str().to_string(), result);

            if failed && init.retry_teams && team_attempts < init.team_max_retries {
                team_attempts += 1;
                log::warn!(
                    "orchestrator: team `{team_id}` failed; team-level retry {team_attempts} of {}",
                    init.team_max_retries
                );
                // Re-execute with the same input context.
                current = Some(team_id);
                continue;
            }
            team_attempts = 0;
            ctx = next_ctx;

            match (failed, next) {
                (false, Some(next_team)) => current = Some(next_team),
                (false, None) => {
                    status = WorkflowStatus::Success;
                }
                (true, Some(next_team)) => {
                    log::warn!(
                        "orchestrator: team `{team_id}` failed terminally; routing to `{next_team}`"
                    );
                    current = Some(next_team);
                }
                (true, None) => {
                    status = WorkflowStatus::Error;
                    error = first_task_error
                        .or_else(|| Some(format!("team `{team_id}` failed")));
                }
            }
        }

        log::info!(
            "orchestrator: workflow {} finished status={status} path={:?}",
            init.workflow_id,
            execution_path.iter().map(TeamId::as_str).collect::<Vec<_>>()
        );

        match self.store.record_outcome(
            init.workflow_id.as_str(),
            status,
            error.clone(),
            execution_path.clone(),
            team_results.clone(),
        ) {
            Ok(record) => record,
            Err(err) => {
                log::warn!(
                    "orchestrator: failed to commit outcome for {}: {err}",
                    init.workflow_id
                );
                let mut record = WorkflowRecord::pending(
                    init.workflow_id.clone(),
                    init.storage_dir.display().to_string(),
                    Utc::now(),
                );
                record.status = status;
                record.error = error;
                record.execution_path = execution_path;
                record.team_results = team_results;
                record
            }
        }
    }

    fn build_recorder(&self, effective: &ConfigTree, storage_dir: &Path) -> LineageRecorder {
        if !effective.get_bool("lineage.enabled").unwrap_or(true) {
            return LineageRecorder::disabled();
        }
        let retry_budget = effective.get_u64("lineage.retry_attempts").unwrap_or(2) as u32;
        let lineage_root = effective
            .get_str("lineage.backend.path")
            .unwrap_or(DEFAULT_LINEAGE_ROOT);
        let mut mirrors: Vec<Box<dyn LineageSink>> =
            vec![Box::new(FileSink::flat(storage_dir))];
        if effective.get_str("lineage.backend.type") == Some("remote") {
            if let Some(url) = effective.get_str("lineage.backend.url") {
                mirrors.push(Box::new(RemoteSink::new(url, Duration::from_secs(10))));
            } else {
                log::warn!("lineage: remote backend selected without `lineage.backend.url`");
            }
        }
        LineageRecorder::new(Some(FileSink::new(lineage_root)), mirrors, retry_budget)
    }

    fn build_services(
        &self,
        order: &WorkOrder,
        effective: &ConfigTree,
    ) -> Result<AgentServices, OrchestratorError> {
        let limits = Arc::new(RateLimiterSet::new(rate_limit_policies(effective)));
        let adapter = LlmAdapter::new(self.transport.clone(), limits);

        let scanner: Arc<dyn ProjectScanner> = match &self.scanner_override {
            Some(scanner) => scanner.clone(),
            None => {
                let command = effective
                    .get_str("llm_config.agents.discovery.scanner.command")
                    .unwrap_or(DEFAULT_SCANNER_COMMAND);
                let timeout = effective
                    .get_u64("llm_config.agents.discovery.scanner.timeout_seconds")
                    .unwrap_or(120);
                Arc::new(CommandScanner::new(command, Duration::from_secs(timeout)))
            }
        };

        let merge: Arc<dyn MergeSkill> = match &self.merge_override {
            Some(merge) => merge.clone(),
            None => match AgentView::resolve(effective, "merge") {
                Ok(view) => Arc::new(LlmMerge::new(adapter.clone(), view)),
                Err(_) => Arc::new(ContentOnlyMerge),
            },
        };

        let backup_root = {
            let configured = effective
                .get_str("runtime.backup.root")
                .unwrap_or(DEFAULT_BACKUP_ROOT);
            let path = PathBuf::from(configured);
            if path.is_absolute() {
                path
            } else {
                order.project_path.join(path)
            }
        };
        let backup_enabled = effective.get_bool("runtime.backup.enabled").unwrap_or(true);
        let assets = Arc::new(AssetWriter::new(
            &order.project_path,
            backup_root,
            backup_enabled,
        ));

        Ok(AgentServices {
            adapter,
            scanner,
            merge,
            assets,
        })
    }

    /// Verify the workflow can run before any team does: the entry graph is
    /// constructible, every referenced agent kind is registered and builds
    /// against its task-scoped configuration, and provider secrets resolve
    /// by environment variable name (the contents are never read here).
    fn preflight(
        &self,
        effective: &ConfigTree,
        teams: &BTreeMap<TeamId, Team>,
        services: &AgentServices,
    ) -> Result<(), OrchestratorError> {
        for team in teams.values() {
            for task in &team.definition().tasks {
                if !self.registry.contains(task.agent.as_str()) {
                    return Err(
                        ConfigError::UnknownAgentKind(task.agent.as_str().to_string()).into(),
                    );
                }
                let task_config = match &task.config {
                    Some(overlay) => {
                        effective.merged_with(&ConfigTree::from_value(overlay.clone()))
                    }
                    None => effective.clone(),
                };
                self.registry
                    .build(task.agent.as_str(), &task_config, services)?;
            }
        }
        preflight_secrets(effective)?;
        Ok(())
    }
}

fn rate_limit_policies(effective: &ConfigTree) -> BTreeMap<ProviderKind, RateLimitPolicy> {
    let mut policies = BTreeMap::new();
    let Some(Value::Object(providers)) = effective.get("llm_config.providers") else {
        return policies;
    };
    for (name, subtree) in providers {
        let Ok(kind) = ProviderKind::parse(name) else {
            continue;
        };
        let Some(limit) = subtree.get("rate_limit") else {
            continue;
        };
        let tokens = limit.get("tokens").and_then(Value::as_u64);
        let requests = limit.get("requests").and_then(Value::as_u64);
        let period = limit.get("period_seconds").and_then(Value::as_u64);
        if let (Some(tokens), Some(requests), Some(period)) = (tokens, requests, period) {
            policies.insert(
                kind,
                RateLimitPolicy {
                    tokens,
                    requests,
                    period: Duration::from_secs(period),
                },
            );
        }
    }
    policies
}

/// Check that every provider an agent references has its secret variable
/// set, when one is declared. Only the variable name is inspected.
fn preflight_secrets(effective: &ConfigTree) -> Result<(), ConfigError> {
    let mut referenced: Vec<String> = Vec::new();
    if let Some(default_provider) = effective.get_str("llm_config.default_provider") {
        referenced.push(default_provider.to_string());
    }
    if let Some(Value::Object(agents)) = effective.get("llm_config.agents") {
        for agent in agents.values() {
            if let Some(provider) = agent.get("provider").and_then(Value::as_str) {
                referenced.push(provider.to_string());
            }
        }
    }
    referenced.sort();
    referenced.dedup();

    for provider in referenced {
        let variable_path = format!("llm_config.providers.{provider}.api_key_env");
        let Some(variable) = effective.get_str(&variable_path) else {
            continue;
        };
        if std::env::var(variable).is_err() {
            return Err(ConfigError::MissingSecret {
                provider,
                variable: variable.to_string(),
            });
        }
    }
    Ok(())
}
