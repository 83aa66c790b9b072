//! Toast messages shown at the top of the canvas.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Warn,
    #[default]
    Info,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAction {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Name of the handler the host invokes when the action is clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<String>,
}

impl MessageAction {
    pub fn link(label: &str, href: &str) -> Self {
        Self {
            label: label.to_string(),
            href: Some(href.to_string()),
            callback: None,
        }
    }

    #[must_use]
    pub fn with_callback(mut self, callback: &str) -> Self {
        self.callback = Some(callback.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: String,
    pub message: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Milliseconds until the message hides itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<MessageAction>,
}

impl UiMessage {
    pub fn new(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            message: message.to_string(),
            message_type: MessageType::Info,
            timeout: None,
            actions: Vec::new(),
        }
    }

    /// A message with a generated id, for toasts nobody hides by name.
    pub fn transient(message: &str, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout.as_millis() as u64),
            ..Self::new(&Uuid::new_v4().to_string(), message)
        }
    }

    #[must_use]
    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: MessageAction) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Debug)]
struct Shown {
    message: UiMessage,
    expires_at: Option<Instant>,
}

/// The messages currently on screen, oldest first.
#[derive(Debug, Default)]
pub struct MessageCenter {
    shown: RwLock<Vec<Shown>>,
}

impl MessageCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows `message`, replacing any message with the same id.
    pub fn show(&self, message: UiMessage) {
        let expires_at = message
            .timeout
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut shown = self.shown.write();
        shown.retain(|s| s.message.id != message.id);
        tracing::debug!(id = %message.id, "Showing message");
        shown.push(Shown { message, expires_at });
    }

    pub fn hide(&self, id: &str) -> bool {
        let mut shown = self.shown.write();
        let before = shown.len();
        shown.retain(|s| s.message.id != id);
        shown.len() != before
    }

    pub fn clear_all(&self) {
        self.shown.write().clear();
    }

    /// Visible messages, after dropping the ones that have timed out.
    pub fn visible(&self) -> Vec<UiMessage> {
        self.visible_at(Instant::now())
    }

    pub fn visible_at(&self, now: Instant) -> Vec<UiMessage> {
        let mut shown = self.shown.write();
        shown.retain(|s| s.expires_at.map_or(true, |at| at > now));
        shown.iter().map(|s| s.message.clone()).collect()
    }

    #[must_use]
    pub fn is_shown(&self, id: &str) -> bool {
        self.visible().iter().any(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_replaces_same_id() {
        let center = MessageCenter::new();
        center.show(UiMessage::new("bad-links", "first"));
        center.show(UiMessage::new("other", "other"));
        center.show(UiMessage::new("bad-links", "second").with_type(MessageType::Warn));

        let visible = center.visible();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[1].message, "second");
        assert_eq!(visible[1].message_type, MessageType::Warn);
    }

    #[test]
    fn test_hide_and_clear() {
        let center = MessageCenter::new();
        center.show(UiMessage::new("a", "a"));
        center.show(UiMessage::new("b", "b"));
        assert!(center.hide("a"));
        assert!(!center.hide("a"));
        assert!(center.is_shown("b"));
        center.clear_all();
        assert!(center.visible().is_empty());
    }

    #[test]
    fn test_timeout_expires() {
        let center = MessageCenter::new();
        let toast = UiMessage::transient("saved", Duration::from_millis(500));
        let id = toast.id.clone();
        center.show(toast);
        assert!(center.is_shown(&id));
        assert!(center.visible_at(Instant::now() + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_wire_format() {
        let message = UiMessage::new("bad-links", "corrupt")
            .with_type(MessageType::Warn)
            .with_action(MessageAction::link("Open fixer", "/draekz/link_fixer"));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "warn");
        assert_eq!(json["actions"][0]["href"], "/draekz/link_fixer");
        assert!(json.get("timeout").is_none());
    }
}
