use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One append-only record of an agent (or skill) invocation. Events of a
/// workflow form a forest: `parent_id` always references an event with a
/// smaller step in the same workflow, rooted at the workflow-root event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEvent {
    pub event_id: String,
    pub workflow_run_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub agent_kind: String,
    pub step: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input_snapshot: Value,
    pub output_snapshot: Value,
    pub metrics: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl LineageEvent {
    pub fn file_name(&self) -> String {
        format!("{}_{}.json", self.step, self.agent_kind)
    }
}
