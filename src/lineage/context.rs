use super::event::LineageEvent;
use super::recorder::LineageRecorder;
use crate::shared::ids::new_execution_id;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Agent,
    Skill,
}

/// Identity of one invocation inside a workflow's lineage forest. The
/// execution id doubles as the event id of the record eventually emitted
/// for this scope, so children can reference it before emission.
#[derive(Debug, Clone)]
pub struct ExecutionScope {
    pub workflow_run_id: String,
    pub execution_id: String,
    pub parent_id: Option<String>,
    pub step: u32,
    kind: ScopeKind,
}

/// Everything recorded about one finished invocation.
#[derive(Debug, Clone)]
pub struct EventBody {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_snapshot: Value,
    pub output_snapshot: Value,
    pub metrics: Value,
    pub error: Option<String>,
}

/// Per-workflow lineage cursor. Owned by the orchestrator driving the
/// workflow; steps are handed out monotonically and top-level agent events
/// chain parent-to-previous-sibling from the workflow root.
pub struct WorkflowLineage {
    recorder: Arc<LineageRecorder>,
    workflow_run_id: String,
    next_step: u32,
    last_sibling_id: String,
}

impl WorkflowLineage {
    /// Establish the workflow-root event (step 0) that parents the first
    /// agent invocation.
    pub fn establish(
        recorder: Arc<LineageRecorder>,
        workflow_run_id: &str,
        input_snapshot: Value,
        now: DateTime<Utc>,
    ) -> Self {
        let root_event_id = new_execution_id();
        let root = LineageEvent {
            event_id: root_event_id.clone(),
            workflow_run_id: workflow_run_id.to_string(),
            parent_id: None,
            agent_kind: "workflow".to_string(),
            step: 0,
            started_at: now,
            finished_at: now,
            input_snapshot,
            output_snapshot: Value::Null,
            metrics: Value::Null,
            error: None,
        };
        recorder.record(&root);
        Self {
            recorder,
            workflow_run_id: workflow_run_id.to_string(),
            next_step: 1,
            last_sibling_id: root_event_id,
        }
    }

    pub fn workflow_run_id(&self) -> &str {
        &self.workflow_run_id
    }

    /// Scope for a fresh top-level agent invocation; parented to the last
    /// emitted sibling (or the workflow root).
    pub fn agent_scope(&mut self) -> ExecutionScope {
        self.scope(Some(self.last_sibling_id.clone()), ScopeKind::Agent)
    }

    /// Scope for a retry attempt, parent-linked to the prior attempt.
    pub fn retry_scope(&mut self, prior: &ExecutionScope) -> ExecutionScope {
        self.scope(Some(prior.execution_id.clone()), ScopeKind::Agent)
    }

    /// Scope for a skill-level sub-invocation parented to the running agent.
    pub fn skill_scope(&mut self, parent: &ExecutionScope) -> ExecutionScope {
        self.scope(Some(parent.execution_id.clone()), ScopeKind::Skill)
    }

    fn scope(&mut self, parent_id: Option<String>, kind: ScopeKind) -> ExecutionScope {
        let step = self.next_step;
        self.next_step += 1;
        ExecutionScope {
            workflow_run_id: self.workflow_run_id.clone(),
            execution_id: new_execution_id(),
            parent_id,
            step,
            kind,
        }
    }

    /// Emit the event for a finished scope. Top-level agent events advance
    /// the sibling chain; skill events do not.
    pub fn record(&mut self, scope: &ExecutionScope, agent_kind: &str, body: EventBody) {
        let event = LineageEvent {
            event_id: scope.execution_id.clone(),
            workflow_run_id: scope.workflow_run_id.clone(),
            parent_id: scope.parent_id.clone(),
            agent_kind: agent_kind.to_string(),
            step: scope.step,
            started_at: body.started_at,
            finished_at: body.finished_at,
            input_snapshot: body.input_snapshot,
            output_snapshot: body.output_snapshot,
            metrics: body.metrics,
            error: body.error,
        };
        self.recorder.record(&event);
        if scope.kind == ScopeKind::Agent {
            self.last_sibling_id = scope.execution_id.clone();
        }
    }
}
