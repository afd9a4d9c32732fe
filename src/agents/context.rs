use crate::config::deep_merge;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const KEY_WORKFLOW_RUN_ID: &str = "workflow_run_id";
pub const KEY_PROJECT_PATH: &str = "project_path";
pub const KEY_INTENT: &str = "intent";
pub const KEY_INPUT_DATA: &str = "input_data";
pub const KEY_AGENT_SEQUENCE: &str = "agent_sequence";
pub const KEY_STEP: &str = "step";

/// The open mapping threaded through a workflow. Never mutated in place:
/// every stage derives a new context from the prior one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: Map<String, Value>,
}

impl Context {
    pub fn new(workflow_run_id: &str, project_path: &str, intent: Value) -> Self {
        let mut values = Map::new();
        values.insert(
            KEY_WORKFLOW_RUN_ID.to_string(),
            Value::String(workflow_run_id.to_string()),
        );
        values.insert(
            KEY_PROJECT_PATH.to_string(),
            Value::String(project_path.to_string()),
        );
        values.insert(KEY_INTENT.to_string(), intent);
        values.insert(KEY_AGENT_SEQUENCE.to_string(), Value::Array(Vec::new()));
        values.insert(KEY_STEP.to_string(), Value::from(1u32));
        Self { values }
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Dot-path lookup across nested mappings.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn workflow_run_id(&self) -> Option<&str> {
        self.get(KEY_WORKFLOW_RUN_ID).and_then(Value::as_str)
    }

    pub fn project_path(&self) -> Option<&str> {
        self.get(KEY_PROJECT_PATH).and_then(Value::as_str)
    }

    pub fn intent(&self) -> Option<&Value> {
        self.get(KEY_INTENT)
    }

    pub fn intent_description(&self) -> Option<&str> {
        self.get_path("intent.description").and_then(Value::as_str)
    }

    pub fn input_data(&self) -> Option<&Value> {
        self.get(KEY_INPUT_DATA)
    }

    pub fn step(&self) -> u64 {
        self.get(KEY_STEP).and_then(Value::as_u64).unwrap_or(1)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    pub fn with_value(&self, key: &str, value: Value) -> Self {
        let mut next = self.values.clone();
        next.insert(key.to_string(), value);
        Self { values: next }
    }

    /// Derive a context with `data` merged into `input_data`. Mappings merge
    /// key-wise; anything else replaces the slot.
    pub fn with_input_data(&self, data: Value) -> Self {
        let merged = match (self.values.get(KEY_INPUT_DATA), &data) {
            (Some(existing @ Value::Object(_)), Value::Object(_)) => deep_merge(existing, &data),
            _ => data,
        };
        self.with_value(KEY_INPUT_DATA, merged)
    }

    /// Derive a context with the step advanced and an agent appended to the
    /// execution sequence.
    pub fn with_sequence_entry(&self, agent_kind: &str, execution_id: &str, step: u32) -> Self {
        let mut sequence = self
            .get(KEY_AGENT_SEQUENCE)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        sequence.push(json!({
            "agent_kind": agent_kind,
            "execution_id": execution_id,
            "step": step,
        }));
        let next_step = self.step().saturating_add(1);
        self.with_value(KEY_AGENT_SEQUENCE, Value::Array(sequence))
            .with_value(KEY_STEP, Value::from(next_step))
    }
}
