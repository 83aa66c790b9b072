//! Server-side configuration: shipped defaults overlaid with the user's
//! `draekz_config.json`.

use crate::error::Result;
use atomicwrites::{AtomicFile, OverwriteBehavior};
use draekz_core::config::{self, ConfigSource};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const USER_CONFIG_FILE_NAME: &str = "draekz_config.json";

/// Values used for any key the user has not set.
#[must_use]
pub fn default_config() -> Value {
    json!({
        "log_level": "WARN",
        "features": {
            "import_individual_nodes": {"enabled": true},
            "menu_queue_selected_nodes": true,
            "menu_auto_nest": {"subdirs": true, "threshold": 20},
            "menu_bookmarks": {"enabled": true},
            "group_header_fast_toggle": {
                "enabled": false,
                "toggles": ["queue", "bypass", "mute"],
                "show": "hover"
            },
            "show_alerts_for_corrupt_workflows": false,
            "monitor_for_corrupt_links": false,
            "monitor_bad_links": false,
            "invoke_extensions_async": {
                "node_created": true,
                "before_register_node_def": true
            }
        },
        "unreleased": {}
    })
}

struct Layers {
    user: Value,
    merged: Value,
}

/// The config file the settings routes read and write.
pub struct UserConfigFile {
    path: PathBuf,
    defaults: Value,
    layers: RwLock<Layers>,
}

impl UserConfigFile {
    /// Opens `draekz_config.json` in `dir`, which need not exist yet.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::with_defaults(dir.join(USER_CONFIG_FILE_NAME), default_config())
    }

    pub fn with_defaults(path: PathBuf, defaults: Value) -> Result<Self> {
        let user = read_user_file(&path)?;
        let merged = merged(&defaults, &user);
        Ok(Self {
            path,
            defaults,
            layers: RwLock::new(Layers { user, merged }),
        })
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The merged config.
    #[must_use]
    pub fn get_config(&self) -> Value {
        self.layers.read().merged.clone()
    }

    pub fn get_config_value(&self, key: &str) -> Option<Value> {
        self.config_value(key)
    }

    /// Applies `changes` (dotted keys) to the user layer and writes it out.
    /// The in-memory config only changes once the file has been written.
    pub fn set_user_config(&self, changes: &Map<String, Value>) -> Result<()> {
        let mut layers = self.layers.write();
        let mut user = layers.user.clone();
        for (key, value) in changes {
            config::assign(&mut user, key, value.clone());
        }
        write_user_file(&self.path, &user)?;
        layers.merged = merged(&self.defaults, &user);
        layers.user = user;
        tracing::info!(keys = changes.len(), path = ?self.path, "User config saved");
        Ok(())
    }

    /// Re-reads the user file from disk.
    pub fn refresh(&self) -> Result<()> {
        let user = read_user_file(&self.path)?;
        let mut layers = self.layers.write();
        layers.merged = merged(&self.defaults, &user);
        layers.user = user;
        tracing::debug!(path = ?self.path, "User config refreshed");
        Ok(())
    }

    /// The merged config as the `config.js` module the browser imports.
    #[must_use]
    pub fn to_js_module(&self) -> String {
        let sorted = sort_keys(&self.get_config());
        let body = serde_json::to_string_pretty(&sorted).unwrap_or_else(|_| "{}".to_string());
        format!("export const draekzConfig = {body}")
    }
}

impl ConfigSource for UserConfigFile {
    fn config_value(&self, key: &str) -> Option<Value> {
        config::lookup(&self.layers.read().merged, key).cloned()
    }
}

impl std::fmt::Debug for UserConfigFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfigFile").field("path", &self.path).finish()
    }
}

fn merged(defaults: &Value, user: &Value) -> Value {
    let mut merged = defaults.clone();
    config::merge(&mut merged, user);
    merged
}

fn read_user_file(path: &Path) -> Result<Value> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
        Err(e) => Err(e.into()),
    }
}

fn write_user_file(path: &Path, user: &Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(user)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(&bytes))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => e,
        })?;
    Ok(())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), sort_keys(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
