//! Dotted-path access to the nested JSON configuration tree.

use serde_json::{Map, Value};

pub const FEATURES_PREFIX: &str = "features.";

/// Read access to configuration values by dotted key.
pub trait ConfigSource: Send + Sync {
    fn config_value(&self, key: &str) -> Option<Value>;

    /// Looks up `key` under `features.` unless it already carries the prefix.
    fn feature_value(&self, key: &str) -> Option<Value> {
        self.config_value(&feature_key(key))
    }

    /// True only when the value is a JSON `true`.
    fn is_enabled(&self, key: &str) -> bool {
        self.config_value(key).is_some_and(|v| is_truthy(&v))
    }
}

impl ConfigSource for Value {
    fn config_value(&self, key: &str) -> Option<Value> {
        lookup(self, key).cloned()
    }
}

impl ConfigSource for parking_lot::RwLock<Value> {
    fn config_value(&self, key: &str) -> Option<Value> {
        lookup(&self.read(), key).cloned()
    }
}

#[must_use]
pub fn feature_key(key: &str) -> String {
    if key.starts_with(FEATURES_PREFIX) {
        key.to_string()
    } else {
        format!("{FEATURES_PREFIX}{key}")
    }
}

/// JavaScript-style truthiness, which is how the settings UI stores flags.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Walks `tree` along the dot-separated `key`.
pub fn lookup<'a>(tree: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(tree, |node, part| node.as_object()?.get(part))
}

/// Writes `value` at `key`, creating intermediate objects and replacing any
/// non-object found along the way.
pub fn assign(tree: &mut Value, key: &str, value: Value) {
    let mut parts = key.split('.').peekable();
    let mut node = tree;
    while let Some(part) = parts.next() {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else { return };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        node = map.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Recursively overlays `overrides` onto `base`; objects merge, everything
/// else replaces.
pub fn merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}
