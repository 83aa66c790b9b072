//! Canvas context menu composition and the extension's node catalogue.

use crate::config::ConfigSource;
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};

pub const NODE_TYPE_SUFFIX: &str = " (draekz)";
pub const HOST_REROUTE_TYPE: &str = "Reroute";
pub const PROJECT_URL: &str = "https://github.com/draekz/comfyui-draekz-nodez";

/// Base names of every node type the extension registers.
pub const NODE_TYPES: &[&str] = &[
    "Any Switch",
    "Context",
    "Context Big",
    "Context Switch",
    "Context Switch Big",
    "Context Merge",
    "Context Merge Big",
    "Dynamic Context",
    "Dynamic Context Switch",
    "Display Any",
    "Image or Latent Size",
    "Mute / Bypass Relay",
    "Mute / Bypass Repeater",
    "Fast Muter",
    "Fast Bypasser",
    "Fast Groups Muter",
    "Fast Groups Bypasser",
    "Fast Actions Button",
    "Label",
    "Power Primitive",
    "Power Prompt",
    "Power Prompt - Simple",
    "Power Puter",
    "Power Conductor",
    "SDXL Empty Latent Image",
    "SDXL Power Prompt - Positive",
    "SDXL Power Prompt - Simple / Negative",
    "Lora Loader",
    "KSampler Config",
    "Node Collector",
    "Reroute",
    "Random Unmuter",
    "Seed",
    "Bookmark",
    "Image Comparer",
    "Image Inset Crop",
];

/// Node types hidden until `unreleased.<key>.enabled` is set.
const UNRELEASED: &[(&str, &str)] = &[
    ("Dynamic Context", "dynamic_context"),
    ("Dynamic Context Switch", "dynamic_context"),
    ("Power Conductor", "power_conductor"),
];

#[must_use]
pub fn add_suffix(name: &str) -> String {
    format!("{name}{NODE_TYPE_SUFFIX}")
}

#[must_use]
pub fn strip_suffix(name: &str) -> &str {
    name.strip_suffix(NODE_TYPE_SUFFIX).unwrap_or(name).trim_end()
}

/// Sorted base names of the node types offered in the menu.
pub fn node_type_strings(config: &dyn ConfigSource) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = NODE_TYPES
        .iter()
        .copied()
        .filter(|name| match UNRELEASED.iter().find(|(n, _)| n == name) {
            Some((_, key)) => config.is_enabled(&format!("unreleased.{key}.enabled")),
            None => true,
        })
        .collect();
    names.sort_unstable();
    names
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MenuAction {
    AddNode { node_type: String },
    OpenSettings,
    ConvertReroutes { node_ids: Vec<NodeId> },
    GoToBookmark { node_id: NodeId },
    OpenUrl { url: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submenu: Option<Vec<MenuEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<MenuAction>,
}

/// A context menu row; the host renders `null` as a divider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MenuEntry {
    Item(MenuItem),
    Divider(Option<()>),
}

impl MenuEntry {
    pub const DIVIDER: MenuEntry = MenuEntry::Divider(None);

    pub fn item(content: &str) -> Self {
        MenuEntry::Item(MenuItem {
            content: content.to_string(),
            class_name: Some("draekz-contextmenu-item".to_string()),
            ..MenuItem::default()
        })
    }

    pub fn label(content: &str) -> Self {
        MenuEntry::Item(MenuItem {
            content: content.to_string(),
            class_name: Some("draekz-contextmenu-item draekz-contextmenu-label".to_string()),
            disabled: true,
            ..MenuItem::default()
        })
    }

    #[inline]
    #[must_use]
    pub fn is_divider(&self) -> bool {
        matches!(self, MenuEntry::Divider(_))
    }

    #[must_use]
    pub fn content(&self) -> Option<&str> {
        match self {
            MenuEntry::Item(item) => Some(&item.content),
            MenuEntry::Divider(_) => None,
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.content().is_some_and(|c| c.starts_with(prefix))
    }

    #[must_use]
    fn with(mut self, f: impl FnOnce(&mut MenuItem)) -> Self {
        if let MenuEntry::Item(item) = &mut self {
            f(item);
        }
        self
    }
}

/// Splices `extension_entry`, surrounded by dividers, into the host's canvas
/// menu and collapses the resulting runs of dividers.
pub fn compose_canvas_menu(mut existing: Vec<MenuEntry>, extension_entry: MenuEntry) -> Vec<MenuEntry> {
    let after = |prefix: &str| existing.iter().position(|e| e.starts_with(prefix)).map(|i| i + 1);
    let at = |prefix: &str| existing.iter().position(|e| e.starts_with(prefix)).filter(|i| *i > 0);

    // An absent anchor falls through to the next rule rather than landing
    // before the last entry.
    let index = after("Queue Group")
        .or_else(|| after("Queue Selected"))
        .or_else(|| at("Convert to Group"))
        .or_else(|| at("Arrange ("))
        .or_else(|| existing.iter().position(MenuEntry::is_divider).map(|i| i + 1))
        .unwrap_or(3)
        .min(existing.len());

    let insert = [
        MenuEntry::DIVIDER,
        MenuEntry::DIVIDER,
        MenuEntry::DIVIDER,
        extension_entry,
        MenuEntry::DIVIDER,
        MenuEntry::DIVIDER,
    ];
    existing.splice(index..index, insert);

    let mut composed: Vec<MenuEntry> = Vec::with_capacity(existing.len());
    for entry in existing {
        if entry.is_divider() && composed.last().is_some_and(MenuEntry::is_divider) {
            continue;
        }
        composed.push(entry);
    }
    composed
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub node_id: NodeId,
    pub shortcut_key: String,
    pub title: String,
}

/// What the extension submenu needs to know about the canvas right now.
#[derive(Debug, Clone, Default)]
pub struct MenuContext<'a> {
    /// `(id, type)` of the selected nodes.
    pub selected: Vec<(NodeId, &'a str)>,
    /// `(id, type)` of every node in the current graph.
    pub all: Vec<(NodeId, &'a str)>,
    pub settings_open: bool,
    pub bookmarks: Vec<Bookmark>,
}

/// Builds the extension's submenu entry.
pub fn extension_menu(context: &MenuContext<'_>, config: &dyn ConfigSource) -> MenuEntry {
    let (scope, pool) = if context.selected.is_empty() {
        ("all", &context.all)
    } else {
        ("selected", &context.selected)
    };
    let reroutes: Vec<NodeId> = pool
        .iter()
        .filter(|(_, node_type)| *node_type == HOST_REROUTE_TYPE)
        .map(|(id, _)| *id)
        .collect();

    let node_types: Vec<MenuEntry> = node_type_strings(config)
        .into_iter()
        .map(|name| {
            MenuEntry::item(name).with(|item| {
                item.action = Some(MenuAction::AddNode {
                    node_type: add_suffix(name),
                })
            })
        })
        .collect();

    let mut options = vec![
        MenuEntry::label("Nodes"),
        MenuEntry::item("All").with(|item| item.submenu = Some(node_types)),
        MenuEntry::label("Actions"),
        MenuEntry::item("Settings (draekz)").with(|item| {
            item.disabled = context.settings_open;
            item.action = Some(MenuAction::OpenSettings);
        }),
        MenuEntry::item(&format!("Convert {scope} Reroutes")).with(|item| {
            item.disabled = reroutes.is_empty();
            item.action = Some(MenuAction::ConvertReroutes { node_ids: reroutes });
        }),
    ];

    if config.is_enabled("features.menu_bookmarks.enabled") && !context.bookmarks.is_empty() {
        options.push(MenuEntry::label("Bookmarks"));
        options.extend(context.bookmarks.iter().map(|b| {
            MenuEntry::item(&format!("[{}] {}", b.shortcut_key, b.title)).with(|item| {
                item.action = Some(MenuAction::GoToBookmark { node_id: b.node_id })
            })
        }));
    }

    options.push(MenuEntry::label("More..."));
    options.push(MenuEntry::item("Star on Github").with(|item| {
        item.class_name = Some("draekz-contextmenu-item draekz-contextmenu-github".to_string());
        item.action = Some(MenuAction::OpenUrl {
            url: PROJECT_URL.to_string(),
        });
    }));

    MenuEntry::Item(MenuItem {
        content: "draekz".to_string(),
        class_name: Some("draekz-contextmenu-item draekz-contextmenu-main-item".to_string()),
        disabled: false,
        submenu: Some(options),
        action: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(contents: &[Option<&str>]) -> Vec<MenuEntry> {
        contents
            .iter()
            .map(|c| c.map_or(MenuEntry::DIVIDER, MenuEntry::item))
            .collect()
    }

    fn contents(menu: &[MenuEntry]) -> Vec<Option<&str>> {
        menu.iter().map(MenuEntry::content).collect()
    }

    #[test]
    fn test_inserts_after_queue_group() {
        let existing = entries(&[Some("Add Node"), None, Some("Queue Group Output Nodes"), Some("Arrange (float left)")]);
        let menu = compose_canvas_menu(existing, MenuEntry::item("draekz"));
        assert_eq!(
            contents(&menu),
            vec![Some("Add Node"), None, Some("Queue Group Output Nodes"), None, Some("draekz"), None, Some("Arrange (float left)")]
        );
    }

    #[test]
    fn test_inserts_at_arrange_before_divider() {
        let existing = entries(&[Some("Add Node"), Some("Add Group"), None, Some("Arrange (float left)")]);
        let menu = compose_canvas_menu(existing, MenuEntry::item("draekz"));
        assert_eq!(
            contents(&menu),
            vec![Some("Add Node"), Some("Add Group"), None, Some("draekz"), None, Some("Arrange (float left)")]
        );
    }

    #[test]
    fn test_falls_back_to_first_divider_then_index_three() {
        let existing = entries(&[Some("A"), None, Some("B")]);
        let menu = compose_canvas_menu(existing, MenuEntry::item("draekz"));
        assert_eq!(contents(&menu), vec![Some("A"), None, Some("draekz"), None, Some("B")]);

        let short = compose_canvas_menu(entries(&[Some("A")]), MenuEntry::item("draekz"));
        assert_eq!(contents(&short), vec![Some("A"), None, Some("draekz"), None]);
    }

    #[test]
    fn test_dividers_serialize_as_null() {
        let value = serde_json::to_value(vec![MenuEntry::DIVIDER, MenuEntry::item("x")]).unwrap();
        assert_eq!(value[0], serde_json::Value::Null);
        assert_eq!(value[1]["content"], "x");
    }

    #[test]
    fn test_node_types_hide_unreleased() {
        let names = node_type_strings(&json!({}));
        assert!(names.contains(&"Seed"));
        assert!(!names.contains(&"Power Conductor"));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));

        let enabled = node_type_strings(&json!({"unreleased": {"power_conductor": {"enabled": true}}}));
        assert!(enabled.contains(&"Power Conductor"));
        assert_eq!(strip_suffix(&add_suffix("Seed")), "Seed");
    }

    #[test]
    fn test_extension_menu_reroutes_and_bookmarks() {
        let context = MenuContext {
            selected: vec![],
            all: vec![(1, "Reroute"), (2, "KSampler"), (3, "Reroute")],
            settings_open: true,
            bookmarks: vec![Bookmark {
                node_id: 9,
                shortcut_key: "1".to_string(),
                title: "Start".to_string(),
            }],
        };
        let config = json!({"features": {"menu_bookmarks": {"enabled": true}}});
        let MenuEntry::Item(root) = extension_menu(&context, &config) else {
            panic!("expected an item");
        };
        let options = root.submenu.unwrap();
        let names = contents(&options);
        assert!(names.contains(&Some("Convert all Reroutes")));
        assert!(names.contains(&Some("[1] Start")));

        let convert = options
            .iter()
            .find(|e| e.content() == Some("Convert all Reroutes"))
            .unwrap();
        let MenuEntry::Item(convert) = convert else { unreachable!() };
        assert_eq!(convert.action, Some(MenuAction::ConvertReroutes { node_ids: vec![1, 3] }));

        let settings = options.iter().find(|e| e.content() == Some("Settings (draekz)")).unwrap();
        assert!(matches!(settings, MenuEntry::Item(item) if item.disabled));
    }
}
