use refactory::shared::ids::{validate_identifier_value, AgentKind, TeamId, WorkflowRunId};

#[test]
fn identifiers_accept_ascii_words_and_reject_the_rest() {
    assert!(validate_identifier_value("team id", "discovery").is_ok());
    assert!(validate_identifier_value("team id", "solution_designer-2").is_ok());
    assert!(validate_identifier_value("team id", "").is_err());
    assert!(validate_identifier_value("team id", "has space").is_err());
    assert!(validate_identifier_value("team id", "dot.ted").is_err());
}

#[test]
fn id_newtypes_round_trip_through_display() {
    let team = TeamId::parse("fallback").expect("team id");
    assert_eq!(team.to_string(), "fallback");
    assert_eq!(team.as_str(), "fallback");
    assert!(TeamId::parse("no/slash").is_err());

    let kind = AgentKind::parse("coder").expect("agent kind");
    assert_eq!(kind.as_str(), "coder");
}

#[test]
fn workflow_ids_are_uuid_derived_with_the_wf_prefix() {
    let generated = WorkflowRunId::generate();
    assert!(generated.as_str().starts_with("wf_"));
    assert!(WorkflowRunId::parse(generated.as_str()).is_ok());

    let distinct = WorkflowRunId::generate();
    assert_ne!(generated, distinct);

    assert!(WorkflowRunId::parse("wf_not-a-uuid").is_err());
    assert!(WorkflowRunId::parse("11111111-1111-1111-1111-111111111111").is_err());
    assert!(
        WorkflowRunId::parse("wf_11111111-1111-1111-1111-111111111111").is_ok()
    );
}

#[test]
fn serde_rejects_malformed_ids() {
    let ok: Result<TeamId, _> = serde_json::from_str("\"discovery\"");
    assert!(ok.is_ok());
    let bad: Result<TeamId, _> = serde_json::from_str("\"bad id\"");
    assert!(bad.is_err());
    let run: Result<WorkflowRunId, _> =
        serde_json::from_str("\"wf_11111111-1111-1111-1111-111111111111\"");
    assert!(run.is_ok());
}
