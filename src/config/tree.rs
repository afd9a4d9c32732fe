use serde_json::{Map, Value};

/// Immutable configuration tree: scalars, mappings and lists with
/// dot-separated path lookup. Lookup never mutates; a missing path is
/// `None`, which is distinct from a present null.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::empty(),
            other => Self { root: other },
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        match &self.root {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            if segment.is_empty() {
                return None;
            }
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Clone of the subtree at `path`, or an empty tree when absent.
    pub fn subtree(&self, path: &str) -> ConfigTree {
        match self.get(path) {
            Some(value) => ConfigTree::from_value(value.clone()),
            None => ConfigTree::empty(),
        }
    }

    /// Deep-merge `overlay` over this tree; overlay wins on every leaf.
    pub fn merged_with(&self, overlay: &ConfigTree) -> ConfigTree {
        ConfigTree {
            root: deep_merge(&self.root, &overlay.root),
        }
    }
}

/// Deep-merge two values.
///
/// Mapping-with-mapping recurses per key; everything else is a leaf and the
/// overlay replaces the base wholesale. Lists are leaves (never concatenated
/// or zipped). A null in the overlay sets null; an absent key leaves the
/// base untouched.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut result = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.get(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        (_, replacement) => replacement.clone(),
    }
}

/// Layered assembly with the service's merge precedence, lowest first:
/// server defaults, then the request's system overlay, then its app overlay.
pub fn effective_config(
    server_defaults: &ConfigTree,
    system_overlay: Option<&ConfigTree>,
    app_overlay: Option<&ConfigTree>,
) -> ConfigTree {
    let mut result = server_defaults.clone();
    if let Some(overlay) = system_overlay {
        result = result.merged_with(overlay);
    }
    if let Some(overlay) = app_overlay {
        result = result.merged_with(overlay);
    }
    result
}
