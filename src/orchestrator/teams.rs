use crate::config::{ConfigError, ConfigTree};
use crate::shared::ids::TeamId;
use crate::team::{RoutingPolicy, TaskSpec, Team, TeamDefinition};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct TeamConfig {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
    #[serde(default)]
    routing: RoutingPolicy,
}

/// Load the team graph from `orchestration.teams`. A configuration without
/// one gets the standard discovery -> solution -> coder graph with a
/// conservative fallback branch.
pub fn load_teams(config: &ConfigTree) -> Result<BTreeMap<TeamId, Team>, ConfigError> {
    let Some(teams_value) = config.get("orchestration.teams") else {
        return default_teams();
    };
    let Value::Object(entries) = teams_value else {
        return Err(ConfigError::NotAMapping {
            path: "orchestration.teams".to_string(),
            found: "non-mapping",
        });
    };
    if entries.is_empty() {
        return default_teams();
    }

    let mut teams = BTreeMap::new();
    for (raw_id, value) in entries {
        let team_id = TeamId::parse(raw_id).map_err(ConfigError::Invalid)?;
        let parsed: TeamConfig = serde_json::from_value(value.clone()).map_err(|err| {
            ConfigError::Invalid(format!("team `{raw_id}` is malformed: {err}"))
        })?;
        let definition = TeamDefinition {
            team_id: team_id.clone(),
            display_name: parsed.name.unwrap_or_else(|| raw_id.clone()),
            tasks: parsed.tasks,
            routing: parsed.routing,
        };
        teams.insert(team_id, Team::new(definition));
    }
    Ok(teams)
}

fn default_teams() -> Result<BTreeMap<TeamId, Team>, ConfigError> {
    let definitions = json!({
        "discovery": {
            "name": "Discovery Team",
            "tasks": [{ "name": "discovery", "agent": "discovery" }],
            "routing": { "default": "solution" },
        },
        "solution": {
            "name": "Solution Design Team",
            "tasks": [{ "name": "solution_designer", "agent": "solution_designer" }],
            "routing": {
                "rules": [{ "condition": "any_failure", "next_team": "fallback" }],
                "default": "coder",
            },
        },
        "coder": {
            "name": "Coder Team",
            "tasks": [{ "name": "coder", "agent": "coder" }],
            "routing": { "default": null },
        },
        "fallback": {
            "name": "Fallback Team",
            "tasks": [{
                "name": "coder_conservative",
                "agent": "coder",
                "config": { "llm_config": { "agents": { "coder": { "temperature": 0 } } } },
            }],
            "routing": { "default": null },
        },
    });

    let Value::Object(entries) = definitions else {
        unreachable!("default team graph is an object literal");
    };
    let mut teams = BTreeMap::new();
    for (raw_id, value) in &entries {
        let team_id = TeamId::parse(raw_id).map_err(ConfigError::Invalid)?;
        let parsed: TeamConfig = serde_json::from_value(value.clone())
            .map_err(|err| ConfigError::Invalid(format!("default team `{raw_id}`: {err}")))?;
        let definition = TeamDefinition {
            team_id: team_id.clone(),
            display_name: parsed.name.unwrap_or_else(|| raw_id.clone()),
            tasks: parsed.tasks,
            routing: parsed.routing,
        };
        teams.insert(team_id, Team::new(definition));
    }
    Ok(teams)
}
