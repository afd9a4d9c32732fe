use super::{ConfigError, ConfigTree};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

pub fn load_config_file(path: &Path) -> Result<ConfigTree, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_config_str(&raw, &path.display().to_string())
}

pub fn parse_config_str(raw: &str, origin: &str) -> Result<ConfigTree, ConfigError> {
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
    let value = yaml_to_value(parsed, "$")?;
    Ok(ConfigTree::from_value(expand_env(value)))
}

pub fn to_yaml_string(tree: &ConfigTree) -> Result<String, ConfigError> {
    serde_yaml::to_string(tree.as_value()).map_err(|source| ConfigError::Parse {
        path: "<serialize>".to_string(),
        source,
    })
}

fn yaml_to_value(yaml: serde_yaml::Value, path: &str) -> Result<Value, ConfigError> {
    match yaml {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(v) => Ok(Value::Bool(v)),
        serde_yaml::Value::Number(v) => serde_json::to_value(v).map_err(|err| {
            ConfigError::Unrepresentable {
                path: path.to_string(),
                reason: err.to_string(),
            }
        }),
        serde_yaml::Value::String(v) => Ok(Value::String(v)),
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                out.push(yaml_to_value(item, &format!("{path}[{index}]"))?);
            }
            Ok(Value::Array(out))
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, value) in mapping {
                let serde_yaml::Value::String(key) = key else {
                    return Err(ConfigError::Unrepresentable {
                        path: path.to_string(),
                        reason: "mapping keys must be strings".to_string(),
                    });
                };
                let child_path = format!("{path}.{key}");
                out.insert(key, yaml_to_value(value, &child_path)?);
            }
            Ok(Value::Object(out))
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_value(tagged.value, path),
    }
}

/// Expand `${VAR}` references inside string scalars. An unset variable is
/// left literal; preflight checks report the variables that matter by name.
fn expand_env(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(expand_env_str(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(expand_env).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, expand_env(value)))
                .collect(),
        ),
        other => other,
    }
}

fn expand_env_str(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut cursor = text;
    while let Some(start) = cursor.find("${") {
        result.push_str(&cursor[..start]);
        let after_open = &cursor[start + 2..];
        let Some(close) = after_open.find('}') else {
            result.push_str(&cursor[start..]);
            return result;
        };
        let name = &after_open[..close];
        match std::env::var(name) {
            Ok(value) => result.push_str(&value),
            Err(_) => {
                log::warn!("config: environment variable `{name}` is not set, leaving reference");
                result.push_str(&cursor[start..start + 2 + close + 1]);
            }
        }
        cursor = &after_open[close + 1..];
    }
    result.push_str(cursor);
    result
}
