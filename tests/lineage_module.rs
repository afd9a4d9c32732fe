use chrono::Utc;
use refactory::lineage::{EventBody, FileSink, LineageRecorder, WorkflowLineage};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn body(input: serde_json::Value, output: serde_json::Value) -> EventBody {
    EventBody {
        started_at: Utc::now(),
        finished_at: Utc::now(),
        input_snapshot: input,
        output_snapshot: output,
        metrics: json!({"total_tokens": 1}),
        error: None,
    }
}

#[test]
fn file_backend_writes_one_document_per_event_in_step_order() {
    let dir = tempdir().expect("tempdir");
    let recorder = Arc::new(LineageRecorder::new(
        Some(FileSink::new(dir.path())),
        Vec::new(),
        1,
    ));
    let mut lineage = WorkflowLineage::establish(
        recorder.clone(),
        "wf_11111111-1111-1111-1111-111111111111",
        json!({"intent": "demo"}),
        Utc::now(),
    );

    let first = lineage.agent_scope();
    lineage.record(&first, "discovery", body(json!({}), json!({"files": {}})));
    let second = lineage.agent_scope();
    lineage.record(&second, "solution_designer", body(json!({}), json!({})));

    let events_dir = dir
        .path()
        .join("wf_11111111-1111-1111-1111-111111111111")
        .join("events");
    let mut names: Vec<String> = fs::read_dir(&events_dir)
        .expect("events dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "0_workflow.json".to_string(),
            "1_discovery.json".to_string(),
            "2_solution_designer.json".to_string(),
        ]
    );

    let events = recorder
        .workflow_events("wf_11111111-1111-1111-1111-111111111111")
        .expect("read events");
    assert_eq!(events.len(), 3);
    let steps: Vec<u32> = events.iter().map(|e| e.step).collect();
    assert_eq!(steps, vec![0, 1, 2]);
}

#[test]
fn agent_events_chain_from_the_workflow_root() {
    let dir = tempdir().expect("tempdir");
    let recorder = Arc::new(LineageRecorder::new(
        Some(FileSink::new(dir.path())),
        Vec::new(),
        1,
    ));
    let run_id = "wf_22222222-2222-2222-2222-222222222222";
    let mut lineage =
        WorkflowLineage::establish(recorder.clone(), run_id, json!({}), Utc::now());

    let first = lineage.agent_scope();
    lineage.record(&first, "discovery", body(json!({}), json!({})));
    let second = lineage.agent_scope();
    lineage.record(&second, "coder", body(json!({}), json!({})));

    let events = recorder.workflow_events(run_id).expect("read events");
    let root = &events[0];
    assert_eq!(root.parent_id, None);
    assert_eq!(events[1].parent_id.as_deref(), Some(root.event_id.as_str()));
    assert_eq!(
        events[2].parent_id.as_deref(),
        Some(events[1].event_id.as_str())
    );

    // Every parent reference points at an event with a smaller step.
    for event in &events {
        if let Some(parent_id) = &event.parent_id {
            let parent = events
                .iter()
                .find(|candidate| &candidate.event_id == parent_id)
                .expect("parent exists");
            assert!(parent.step < event.step);
        }
    }
}

#[test]
fn retry_scopes_parent_link_to_the_prior_attempt() {
    let dir = tempdir().expect("tempdir");
    let recorder = Arc::new(LineageRecorder::new(
        Some(FileSink::new(dir.path())),
        Vec::new(),
        1,
    ));
    let run_id = "wf_33333333-3333-3333-3333-333333333333";
    let mut lineage =
        WorkflowLineage::establish(recorder.clone(), run_id, json!({}), Utc::now());

    let attempt_one = lineage.agent_scope();
    lineage.record(&attempt_one, "solution_designer", body(json!({}), json!({})));
    let attempt_two = lineage.retry_scope(&attempt_one);
    lineage.record(&attempt_two, "solution_designer", body(json!({}), json!({})));

    let events = recorder.workflow_events(run_id).expect("read events");
    assert_eq!(
        events[2].parent_id.as_deref(),
        Some(events[1].event_id.as_str())
    );
}

#[test]
fn skill_scopes_parent_to_their_agent_not_the_sibling_chain() {
    let dir = tempdir().expect("tempdir");
    let recorder = Arc::new(LineageRecorder::new(
        Some(FileSink::new(dir.path())),
        Vec::new(),
        1,
    ));
    let run_id = "wf_44444444-4444-4444-4444-444444444444";
    let mut lineage =
        WorkflowLineage::establish(recorder.clone(), run_id, json!({}), Utc::now());

    let coder = lineage.agent_scope();
    let merge_one = lineage.skill_scope(&coder);
    let merge_two = lineage.skill_scope(&coder);
    lineage.record(&coder, "coder", body(json!({}), json!({})));
    lineage.record(&merge_one, "merge", body(json!({}), json!({})));
    lineage.record(&merge_two, "merge", body(json!({}), json!({})));

    // The next top-level agent still chains to the coder, not a skill.
    let next = lineage.agent_scope();
    lineage.record(&next, "discovery", body(json!({}), json!({})));

    let events = recorder.workflow_events(run_id).expect("read events");
    let coder_event = events.iter().find(|e| e.agent_kind == "coder").expect("coder");
    for merge_event in events.iter().filter(|e| e.agent_kind == "merge") {
        assert_eq!(
            merge_event.parent_id.as_deref(),
            Some(coder_event.event_id.as_str())
        );
        assert!(coder_event.step < merge_event.step);
    }
    let tail = events.iter().find(|e| e.agent_kind == "discovery").expect("tail");
    assert_eq!(
        tail.parent_id.as_deref(),
        Some(coder_event.event_id.as_str())
    );

    // Steps stay distinct and monotonic in emission order.
    let steps: Vec<u32> = events.iter().map(|e| e.step).collect();
    let mut sorted = steps.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(steps, sorted);
}

#[test]
fn flat_mirror_sink_writes_into_the_storage_directory() {
    let dir = tempdir().expect("tempdir");
    let lineage_root = dir.path().join("lineage");
    let storage_dir = dir.path().join("workflows/250802_0000_wf_x");
    let recorder = Arc::new(LineageRecorder::new(
        Some(FileSink::new(&lineage_root)),
        vec![Box::new(FileSink::flat(&storage_dir))],
        1,
    ));
    let run_id = "wf_55555555-5555-5555-5555-555555555555";
    let mut lineage =
        WorkflowLineage::establish(recorder.clone(), run_id, json!({}), Utc::now());
    let scope = lineage.agent_scope();
    lineage.record(&scope, "discovery", body(json!({}), json!({})));

    assert!(lineage_root
        .join(run_id)
        .join("events/1_discovery.json")
        .is_file());
    assert!(storage_dir.join("events/1_discovery.json").is_file());
}

#[test]
fn recording_failures_never_surface_to_the_caller() {
    // Point the sink at a path that cannot be a directory.
    let dir = tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"file, not a dir").expect("write blocker");
    let recorder = Arc::new(LineageRecorder::new(
        Some(FileSink::new(&blocker)),
        Vec::new(),
        1,
    ));
    let mut lineage = WorkflowLineage::establish(
        recorder,
        "wf_66666666-6666-6666-6666-666666666666",
        json!({}),
        Utc::now(),
    );
    let scope = lineage.agent_scope();
    // Returns normally; the failure is logged and the event dropped.
    lineage.record(&scope, "discovery", body(json!({}), json!({})));
}
