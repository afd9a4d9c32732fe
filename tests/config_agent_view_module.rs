use refactory::config::{parse_config_str, AgentView, ConfigError, ConfigTree};
use refactory::llm::ProviderKind;
use serde_json::json;

fn config(raw: &str) -> ConfigTree {
    parse_config_str(raw, "<test>").expect("parse test config")
}

#[test]
fn per_agent_override_beats_every_default() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  default_model: global-default
  providers:
    anthropic:
      default_model: provider-default
      default_temperature: 0.7
  agents:
    coder:
      model: per-agent
      temperature: 0.1
"#,
    );
    let view = AgentView::resolve(&config, "coder").expect("resolve");
    assert_eq!(view.provider, ProviderKind::Anthropic);
    assert_eq!(view.model, "per-agent");
    assert_eq!(view.temperature, 0.1);
}

#[test]
fn global_default_beats_provider_default() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  default_model: global-default
  providers:
    anthropic:
      default_model: provider-default
  agents:
    coder: {}
"#,
    );
    let view = AgentView::resolve(&config, "coder").expect("resolve");
    assert_eq!(view.model, "global-default");
}

#[test]
fn provider_default_applies_when_nothing_else_is_set() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: provider-default
      default_temperature: 0.4
"#,
    );
    let view = AgentView::resolve(&config, "coder").expect("resolve");
    assert_eq!(view.model, "provider-default");
    assert_eq!(view.temperature, 0.4);
}

#[test]
fn missing_model_with_no_default_is_a_config_error() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic: {}
"#,
    );
    let err = AgentView::resolve(&config, "coder").expect_err("should fail");
    assert!(matches!(
        err,
        ConfigError::MissingParameter { ref parameter, .. } if parameter == "model"
    ));
}

#[test]
fn unknown_provider_is_a_config_error() {
    let config = config(
        r#"
llm_config:
  default_provider: watson
  providers:
    anthropic:
      default_model: m
"#,
    );
    let err = AgentView::resolve(&config, "coder").expect_err("should fail");
    assert!(matches!(err, ConfigError::UnknownProvider { .. }));
}

#[test]
fn known_provider_without_config_section_is_a_config_error() {
    let config = config(
        r#"
llm_config:
  default_provider: openai
  providers:
    anthropic:
      default_model: m
"#,
    );
    let err = AgentView::resolve(&config, "coder").expect_err("should fail");
    assert!(matches!(err, ConfigError::UnknownProvider { .. }));
}

#[test]
fn non_mapping_agent_subtree_carries_the_offending_path() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: m
  agents:
    coder: "not a mapping"
"#,
    );
    let err = AgentView::resolve(&config, "coder").expect_err("should fail");
    match err {
        ConfigError::NotAMapping { path, .. } => {
            assert_eq!(path, "llm_config.agents.coder");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn overlay_precedence_resolves_coder_temperature_to_zero() {
    let base = config(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: m
  agents:
    coder:
      temperature: 0.2
"#,
    );
    let system = ConfigTree::from_value(json!({
        "llm_config": {"agents": {"coder": {"temperature": 0.5}}}
    }));
    let app = ConfigTree::from_value(json!({
        "llm_config": {"agents": {"coder": {"temperature": 0.0}}}
    }));
    let effective = refactory::config::effective_config(&base, Some(&system), Some(&app));
    let view = AgentView::resolve(&effective, "coder").expect("resolve");
    assert_eq!(view.temperature, 0.0);
}

#[test]
fn continuation_and_retry_settings_resolve_with_defaults() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: m
  agents:
    solution_designer:
      max_continuation_attempts: 2
      retry:
        initial_delay_ms: 5
        max_retries: 3
"#,
    );
    let view = AgentView::resolve(&config, "solution_designer").expect("resolve");
    assert!(view.continuation.enabled);
    assert_eq!(view.continuation.max_attempts, 2);
    assert_eq!(view.continuation.token_buffer, 1000);
    assert_eq!(view.retry.initial_delay.as_millis(), 5);
    assert_eq!(view.retry.max_retries, 3);
    assert_eq!(view.timeout.as_secs(), 30);

    let bare = AgentView::resolve(&config, "coder").expect("resolve");
    assert_eq!(bare.continuation.max_attempts, 5);
    assert_eq!(bare.retry.max_retries, 5);
    assert_eq!(bare.retry.initial_delay.as_secs(), 1);
    assert_eq!(bare.retry.max_delay.as_secs(), 30);
}

#[test]
fn prompts_resolve_through_the_flat_view() {
    let config = config(
        r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: m
      prompts:
        system: "provider system"
  agents:
    solution_designer:
      prompts:
        solution: "design {intent}"
"#,
    );
    let view = AgentView::resolve(&config, "solution_designer").expect("resolve");
    assert_eq!(view.prompt("system").expect("system"), "provider system");
    assert_eq!(view.prompt("solution").expect("solution"), "design {intent}");
    assert!(matches!(
        view.prompt("missing"),
        Err(ConfigError::MissingPrompt { .. })
    ));
}
