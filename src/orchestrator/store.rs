use super::error::{io_error, OrchestratorError};
use crate::shared::fs_atomic::atomic_write_json;
use crate::shared::ids::{TeamId, WorkflowRunId};
use crate::team::TeamResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Success,
    Error,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Everything tracked about one workflow. Created on submission, mutated
/// only by the orchestrator that owns the run, terminal once status leaves
/// `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub workflow_id: WorkflowRunId,
    pub status: WorkflowStatus,
    pub storage_path: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_path: Vec<TeamId>,
    #[serde(default)]
    pub team_results: BTreeMap<String, TeamResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    pub fn pending(
        workflow_id: WorkflowRunId,
        storage_path: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id,
            status: WorkflowStatus::Pending,
            storage_path: storage_path.into(),
            error: None,
            execution_path: Vec::new(),
            team_results: BTreeMap::new(),
            started_at,
            finished_at: None,
        }
    }
}

/// Concurrent map of workflow records with a durable per-workflow mirror
/// (`result.json` in the workflow's storage directory). Readers always see
/// the last committed state.
#[derive(Default)]
pub struct WorkflowStore {
    records: RwLock<BTreeMap<String, WorkflowRecord>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, record: WorkflowRecord) -> Result<(), OrchestratorError> {
        self.persist_mirror(&record)?;
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(record.workflow_id.as_str().to_string(), record);
        Ok(())
    }

    pub fn get(&self, workflow_id: &str) -> Option<WorkflowRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.get(workflow_id).cloned()
    }

    pub fn set_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<WorkflowRecord, OrchestratorError> {
        let updated = {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            let record = records
                .get_mut(workflow_id)
                .ok_or_else(|| OrchestratorError::UnknownWorkflow(workflow_id.to_string()))?;
            record.status = status;
            record.error = error;
            if status != WorkflowStatus::Pending {
                record.finished_at = Some(Utc::now());
            }
            record.clone()
        };
        self.persist_mirror(&updated)?;
        Ok(updated)
    }

    /// Commit a finished (or paused) workflow: status, error, execution
    /// path and per-team results in one visible update. Mirror write
    /// failures are logged; the in-memory record is still committed.
    pub fn record_outcome(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        error: Option<String>,
        execution_path: Vec<TeamId>,
        team_results: BTreeMap<String, TeamResult>,
    ) -> Result<WorkflowRecord, OrchestratorError> {
        let updated = {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            let record = records
                .get_mut(workflow_id)
                .ok_or_else(|| OrchestratorError::UnknownWorkflow(workflow_id.to_string()))?;
            record.status = status;
            record.error = error;
            record.execution_path = execution_path;
            record.team_results = team_results;
            if status != WorkflowStatus::Pending {
                record.finished_at = Some(Utc::now());
            }
            record.clone()
        };
        if let Err(err) = self.persist_mirror(&updated) {
            log::warn!("workflow store: mirror write failed for {workflow_id}: {err}");
        }
        Ok(updated)
    }

    pub fn tracked(&self) -> usize {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.len()
    }

    /// Retention sweep: drop terminal records that finished before the
    /// cutoff. Pending workflows are never pruned. Returns how many records
    /// were removed; their durable mirrors stay on disk.
    pub fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let before = records.len();
        records.retain(|_, record| match record.finished_at {
            Some(finished_at) if record.status != WorkflowStatus::Pending => finished_at >= cutoff,
            _ => true,
        });
        before - records.len()
    }

    fn persist_mirror(&self, record: &WorkflowRecord) -> Result<(), OrchestratorError> {
        if record.storage_path.is_empty() {
            return Ok(());
        }
        let path = Path::new(&record.storage_path).join("result.json");
        atomic_write_json(&path, record).map_err(|source| io_error(&path, source))
    }
}

/// Storage directory for one workflow: `<root>/<yymmdd_hhmm>_<workflow_id>`.
pub fn workflow_storage_dir(
    root: &Path,
    workflow_id: &WorkflowRunId,
    started_at: DateTime<Utc>,
) -> PathBuf {
    root.join(format!(
        "{}_{}",
        started_at.format("%y%m%d_%H%M"),
        workflow_id
    ))
}
