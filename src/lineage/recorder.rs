use super::event::LineageEvent;
use crate::shared::fs_atomic::atomic_write_json;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LineageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("lineage endpoint {endpoint} rejected event: {detail}")]
    Remote { endpoint: String, detail: String },
}

pub trait LineageSink: Send + Sync {
    fn write(&self, event: &LineageEvent) -> Result<(), LineageError>;
    fn describe(&self) -> String;
}

/// File backend: one self-contained JSON document per event under
/// `<root>/<workflow_run_id>/events/<step>_<agent_kind>.json`, or directly
/// under `<root>/events/` for a flat per-workflow mirror directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
    per_run_dir: bool,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            per_run_dir: true,
        }
    }

    /// Sink rooted inside one workflow's own storage directory.
    pub fn flat(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            per_run_dir: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn events_dir(&self, workflow_run_id: &str) -> PathBuf {
        if self.per_run_dir {
            self.root.join(workflow_run_id).join("events")
        } else {
            self.root.join("events")
        }
    }

    fn event_path(&self, event: &LineageEvent) -> PathBuf {
        self.events_dir(&event.workflow_run_id).join(event.file_name())
    }
}

impl LineageSink for FileSink {
    fn write(&self, event: &LineageEvent) -> Result<(), LineageError> {
        let path = self.event_path(event);
        atomic_write_json(&path, event).map_err(|source| LineageError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn describe(&self) -> String {
        format!("file:{}", self.root.display())
    }
}

/// Remote backend: POSTs each event to a configured endpoint.
#[derive(Debug, Clone)]
pub struct RemoteSink {
    endpoint: String,
    timeout: Duration,
}

impl RemoteSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl LineageSink for RemoteSink {
    fn write(&self, event: &LineageEvent) -> Result<(), LineageError> {
        let body = serde_json::to_value(event).map_err(|source| LineageError::Json {
            path: self.endpoint.clone(),
            source,
        })?;
        ureq::builder()
            .timeout(self.timeout)
            .build()
            .post(&self.endpoint)
            .send_json(body)
            .map_err(|err| LineageError::Remote {
                endpoint: self.endpoint.clone(),
                detail: err.to_string(),
            })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("remote:{}", self.endpoint)
    }
}

/// Append-only event recorder. Recording never fails the caller: each sink
/// gets a bounded number of attempts and exhausted events are dropped with
/// a warning. Writes are serialized so events of one workflow land in
/// emission order.
pub struct LineageRecorder {
    primary: Option<FileSink>,
    mirrors: Vec<Box<dyn LineageSink>>,
    retry_budget: u32,
    write_lock: Mutex<()>,
}

impl LineageRecorder {
    pub fn new(
        primary: Option<FileSink>,
        mirrors: Vec<Box<dyn LineageSink>>,
        retry_budget: u32,
    ) -> Self {
        Self {
            primary,
            mirrors,
            retry_budget,
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Vec::new(), 0)
    }

    pub fn record(&self, event: &LineageEvent) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let primary_sink: Option<&dyn LineageSink> =
            self.primary.as_ref().map(|sink| sink as &dyn LineageSink);
        let sinks = primary_sink
            .into_iter()
            .chain(self.mirrors.iter().map(|sink| sink.as_ref()));
        for sink in sinks {
            let mut attempt = 0u32;
            loop {
                match sink.write(event) {
                    Ok(()) => break,
                    Err(err) if attempt < self.retry_budget => {
                        attempt += 1;
                        log::debug!(
                            "lineage: retrying write of step {} to {} (attempt {attempt}): {err}",
                            event.step,
                            sink.describe()
                        );
                    }
                    Err(err) => {
                        log::warn!(
                            "lineage: dropping event step {} agent {} for {} after {} attempts: {err}",
                            event.step,
                            event.agent_kind,
                            sink.describe(),
                            attempt + 1
                        );
                        break;
                    }
                }
            }
        }
    }

    /// All flushed events of one workflow from the file backend, in step
    /// order.
    pub fn workflow_events(&self, workflow_run_id: &str) -> Result<Vec<LineageEvent>, LineageError> {
        let Some(primary) = &self.primary else {
            return Ok(Vec::new());
        };
        let events_dir = primary.events_dir(workflow_run_id);
        let entries = match fs::read_dir(&events_dir) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LineageError::Io {
                    path: events_dir.display().to_string(),
                    source,
                })
            }
        };

        let mut events = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LineageError::Io {
                path: events_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path).map_err(|source| LineageError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let event: LineageEvent =
                serde_json::from_str(&raw).map_err(|source| LineageError::Json {
                    path: path.display().to_string(),
                    source,
                })?;
            events.push(event);
        }
        events.sort_by_key(|event| event.step);
        Ok(events)
    }
}
