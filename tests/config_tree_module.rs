use refactory::config::{deep_merge, effective_config, parse_config_str, to_yaml_string, ConfigTree};
use serde_json::{json, Value};

fn tree(value: Value) -> ConfigTree {
    ConfigTree::from_value(value)
}

#[test]
fn overlay_wins_on_scalar_leaves() {
    let base = tree(json!({"a": 1, "b": {"c": "old", "d": true}}));
    let overlay = tree(json!({"b": {"c": "new"}}));
    let merged = base.merged_with(&overlay);
    assert_eq!(merged.get("b.c"), Some(&json!("new")));
    assert_eq!(merged.get("b.d"), Some(&json!(true)));
    assert_eq!(merged.get("a"), Some(&json!(1)));
}

#[test]
fn overlay_may_change_value_type() {
    let base = tree(json!({"timeout": 30}));
    let overlay = tree(json!({"timeout": "30s"}));
    assert_eq!(
        base.merged_with(&overlay).get("timeout"),
        Some(&json!("30s"))
    );
}

#[test]
fn lists_replace_wholesale() {
    let base = tree(json!({"paths": ["a", "b", "c"], "keep": [1]}));
    let overlay = tree(json!({"paths": ["z"]}));
    let merged = base.merged_with(&overlay);
    assert_eq!(merged.get("paths"), Some(&json!(["z"])));
    assert_eq!(merged.get("keep"), Some(&json!([1])));
}

#[test]
fn null_in_overlay_replaces() {
    let base = tree(json!({"a": {"b": 5}}));
    let overlay = tree(json!({"a": {"b": null}}));
    let merged = base.merged_with(&overlay);
    assert_eq!(merged.get("a.b"), Some(&Value::Null));
}

#[test]
fn absent_key_is_distinct_from_null() {
    let config = tree(json!({"present_null": null}));
    assert_eq!(config.get("present_null"), Some(&Value::Null));
    assert_eq!(config.get("missing"), None);
    assert_eq!(config.get("present_null.deeper"), None);
}

#[test]
fn empty_overlay_is_identity() {
    let base = tree(json!({"a": {"b": [1, 2]}, "c": "x"}));
    let merged = base.merged_with(&ConfigTree::empty());
    assert_eq!(merged, base);
}

#[test]
fn merge_is_associative_for_leaf_disjoint_overlays() {
    let base = json!({"root": {"x": 1}});
    let a = json!({"root": {"y": 2}});
    let b = json!({"root": {"z": {"w": 3}}});
    let left = deep_merge(&deep_merge(&base, &a), &b);
    let right = deep_merge(&base, &deep_merge(&a, &b));
    assert_eq!(left, right);
}

#[test]
fn layered_precedence_is_defaults_then_system_then_app() {
    let defaults = tree(json!({"llm_config": {"agents": {"coder": {"temperature": 0.2}}}}));
    let system = tree(json!({"llm_config": {"agents": {"coder": {"temperature": 0.5}}}}));
    let app = tree(json!({"llm_config": {"agents": {"coder": {"temperature": 0.0}}}}));

    let effective = effective_config(&defaults, Some(&system), Some(&app));
    assert_eq!(
        effective.get_f64("llm_config.agents.coder.temperature"),
        Some(0.0)
    );

    let without_app = effective_config(&defaults, Some(&system), None);
    assert_eq!(
        without_app.get_f64("llm_config.agents.coder.temperature"),
        Some(0.5)
    );
}

#[test]
fn yaml_round_trip_preserves_values_and_nesting() {
    let raw = r#"
llm_config:
  default_provider: anthropic
  providers:
    anthropic:
      default_model: sonnet
      rate_limit:
        tokens: 90000
        requests: 50
        period_seconds: 60
  agents:
    coder:
      temperature: 0.2
      scanner_globs: ["src/**", "lib/**"]
"#;
    let parsed = parse_config_str(raw, "<test>").expect("parse");
    let serialized = to_yaml_string(&parsed).expect("serialize");
    let reparsed = parse_config_str(&serialized, "<round-trip>").expect("reparse");
    assert_eq!(parsed, reparsed);
}

#[test]
fn env_references_expand_in_string_scalars() {
    std::env::set_var("REFACTORY_TEST_REGION", "eu-west");
    let raw = "endpoint: https://${REFACTORY_TEST_REGION}.example.com\nplain: \"${UNSET_REFACTORY_VAR}\"\n";
    let parsed = parse_config_str(raw, "<test>").expect("parse");
    assert_eq!(
        parsed.get_str("endpoint"),
        Some("https://eu-west.example.com")
    );
    // Unset variables stay literal; preflight reports the ones that matter.
    assert_eq!(parsed.get_str("plain"), Some("${UNSET_REFACTORY_VAR}"));
}

#[test]
fn non_string_mapping_keys_are_rejected() {
    let raw = "1: value\n";
    assert!(parse_config_str(raw, "<test>").is_err());
}

#[test]
fn subtree_of_missing_path_is_empty() {
    let config = tree(json!({"a": 1}));
    assert!(config.subtree("b.c").is_empty());
    assert_eq!(config.subtree("a"), tree(json!(1)));
}
