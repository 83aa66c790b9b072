//! The configurable keys the settings dialog lays out, grouped by section.

use draekz_core::log_level::{self, LogLevel, LOG_LEVEL_CONFIG_KEY};
use draekz_core::ConfigSource;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    Boolean,
    String,
    Number,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigInputType {
    /// Multi-select over `options`.
    Checklist,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigOption {
    pub value: Value,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OnSave {
    SetLogLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub key: &'static str,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<ConfigInputType>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ConfigOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subconfig: Vec<ConfigEntry>,
    pub is_dev_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_save: Option<OnSave>,
}

impl ConfigEntry {
    fn new(key: &'static str, config_type: ConfigType, label: &'static str) -> Self {
        Self {
            key,
            config_type,
            label,
            input_type: None,
            options: Vec::new(),
            description: None,
            subconfig: Vec::new(),
            is_dev_only: false,
            on_save: None,
        }
    }

    fn described(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    fn options<I: IntoIterator<Item = (Value, &'static str)>>(mut self, options: I) -> Self {
        self.options = options
            .into_iter()
            .map(|(value, label)| ConfigOption {
                value,
                label: label.to_string(),
            })
            .collect();
        self
    }

    fn sub(mut self, entry: ConfigEntry) -> Self {
        self.subconfig.push(entry);
        self
    }

    fn dev_only(mut self) -> Self {
        self.is_dev_only = true;
        self
    }

    /// Runs this entry's save hook, if any, with the saved value.
    pub fn run_on_save(&self, value: &Value) -> Option<LogLevel> {
        match self.on_save? {
            OnSave::SetLogLevel => log_level::apply_config_level(value),
        }
    }

    /// This entry and its subconfig, depth first.
    pub fn flatten(&self) -> Vec<&ConfigEntry> {
        let mut entries = vec![self];
        for child in &self.subconfig {
            entries.extend(child.flatten());
        }
        entries
    }

    /// True when `value` has the shape this entry expects.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        let shape_ok = match self.config_type {
            ConfigType::Boolean => value.is_boolean(),
            ConfigType::String => value.is_string(),
            ConfigType::Number => value.is_number(),
            ConfigType::Array => value.is_array(),
        };
        if !shape_ok || self.options.is_empty() {
            return shape_ok;
        }
        let allowed = |v: &Value| self.options.iter().any(|o| &o.value == v);
        match value {
            Value::Array(items) => items.iter().all(allowed),
            other => allowed(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSection {
    pub name: &'static str,
    pub entries: Vec<ConfigEntry>,
}

/// Every section of the settings dialog, in display order.
#[must_use]
pub fn configurable() -> Vec<ConfigSection> {
    use ConfigType::{Array, Boolean, Number};
    vec![
        ConfigSection {
            name: "features",
            entries: vec![ConfigEntry::new(
                "features.import_individual_nodes.enabled",
                Boolean,
                "Import Individual Nodes Widgets",
            )
            .described(
                "Dragging & Dropping a similar image/JSON workflow onto (most) current workflow \
                 nodes will allow you to import that workflow's node's widgets when it has the \
                 same id and type.",
            )],
        },
        ConfigSection {
            name: "menus",
            entries: vec![
                ConfigEntry::new(
                    "features.menu_queue_selected_nodes",
                    Boolean,
                    "Show 'Queue Selected Output Nodes'",
                )
                .described(
                    "Will show a menu item in the right-click context menus to queue (only) the \
                     selected output nodes.",
                ),
                ConfigEntry::new(
                    "features.menu_auto_nest.subdirs",
                    Boolean,
                    "Auto Nest Subdirectories in Menus",
                )
                .described(
                    "When a large, flat list of values contain sub-directories, auto nest them.",
                )
                .sub(ConfigEntry::new(
                    "features.menu_auto_nest.threshold",
                    Number,
                    "Number of items needed to trigger nesting.",
                )),
                ConfigEntry::new(
                    "features.menu_bookmarks.enabled",
                    Boolean,
                    "Show Bookmarks in context menu",
                )
                .described("Will list bookmarks in the draekz right-click context menu."),
            ],
        },
        ConfigSection {
            name: "groups",
            entries: vec![ConfigEntry::new(
                "features.group_header_fast_toggle.enabled",
                Boolean,
                "Show fast toggles in Group Headers",
            )
            .described("Show quick toggles in Groups' Headers to quickly mute, bypass or queue.")
            .sub({
                let mut toggles = ConfigEntry::new(
                    "features.group_header_fast_toggle.toggles",
                    Array,
                    "Which toggles to show.",
                )
                .options([
                    (Value::from("queue"), "queue"),
                    (Value::from("bypass"), "bypass"),
                    (Value::from("mute"), "mute"),
                ]);
                toggles.input_type = Some(ConfigInputType::Checklist);
                toggles
            })
            .sub(
                ConfigEntry::new(
                    "features.group_header_fast_toggle.show",
                    ConfigType::String,
                    "When to show them.",
                )
                .options([
                    (Value::from("hover"), "on hover"),
                    (Value::from("always"), "always"),
                ]),
            )],
        },
        ConfigSection {
            name: "advanced",
            entries: vec![
                ConfigEntry::new(
                    "features.show_alerts_for_corrupt_workflows",
                    Boolean,
                    "Detect Corrupt Workflows",
                )
                .described(
                    "Will show a message at the top of the screen when loading a workflow that \
                     has corrupt linking data.",
                ),
                ConfigEntry::new(
                    "features.monitor_bad_links",
                    Boolean,
                    "Monitor for Corrupt Links",
                )
                .described("Periodically checks the open workflow for corrupt links.")
                .dev_only(),
                {
                    let mut entry = ConfigEntry::new(
                        LOG_LEVEL_CONFIG_KEY,
                        ConfigType::String,
                        "Log level for browser dev console.",
                    )
                    .described(
                        "Further down the list, the more verbose logs to the console will be.",
                    )
                    .options(LogLevel::ALL.iter().map(|l| (Value::from(l.as_str()), l.as_str())))
                    .dev_only();
                    entry.on_save = Some(OnSave::SetLogLevel);
                    entry
                },
                ConfigEntry::new(
                    "features.invoke_extensions_async.node_created",
                    Boolean,
                    "Allow other extensions to call nodeCreated on draekz nodes.",
                )
                .described("Do not disable unless you are having trouble.")
                .dev_only(),
            ],
        },
    ]
}

/// Looks up the schema entry for `key` in any section.
#[must_use]
pub fn find_entry(sections: &[ConfigSection], key: &str) -> Option<ConfigEntry> {
    sections
        .iter()
        .flat_map(|s| s.entries.iter())
        .flat_map(ConfigEntry::flatten)
        .find(|e| e.key == key)
        .cloned()
}

/// Schema entries whose saved value differs from `initial`, paired with the
/// new value. Dev-only entries are skipped unless `dev_mode`.
pub fn changed_entries(
    sections: &[ConfigSection],
    initial: &dyn ConfigSource,
    edited: &dyn ConfigSource,
    dev_mode: bool,
) -> Vec<(&'static str, Value)> {
    sections
        .iter()
        .flat_map(|s| s.entries.iter())
        .flat_map(ConfigEntry::flatten)
        .filter(|e| dev_mode || !e.is_dev_only)
        .filter_map(|e| {
            let value = edited.config_value(e.key)?;
            (initial.config_value(e.key).as_ref() != Some(&value)).then_some((e.key, value))
        })
        .collect()
}
