//! Synchronous notification bus for hook lifecycle events.

use crate::hooks::MouseEvent;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    ProcessMouseDown { original_event: MouseEvent },
    Queue,
    QueueEnd,
    GraphToPrompt,
    GraphToPromptEnd,
    ApiQueuePromptBefore { workflow: Value, output: Value },
    ApiQueuePromptEnd,
    ConfigChange { key: String, value: Value },
    ModelInfoRefreshed { model_type: String, data: Value },
}

impl HookEvent {
    /// The name listeners in the host subscribe to.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            HookEvent::ProcessMouseDown { .. } => "on-process-mouse-down".to_string(),
            HookEvent::Queue => "queue".to_string(),
            HookEvent::QueueEnd => "queue-end".to_string(),
            HookEvent::GraphToPrompt => "graph-to-prompt".to_string(),
            HookEvent::GraphToPromptEnd => "graph-to-prompt-end".to_string(),
            HookEvent::ApiQueuePromptBefore { .. } => "comfy-api-queue-prompt-before".to_string(),
            HookEvent::ApiQueuePromptEnd => "comfy-api-queue-prompt-end".to_string(),
            HookEvent::ConfigChange { .. } => "config-change".to_string(),
            HookEvent::ModelInfoRefreshed { model_type, .. } => {
                format!("draekz-refreshed-{model_type}-info")
            }
        }
    }
}

pub type Listener = Arc<dyn Fn(&HookEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Delivers each event to every listener, in subscription order, before
/// `dispatch` returns.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&HookEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn dispatch(&self, event: HookEvent) {
        // Snapshot so listeners may subscribe or unsubscribe while handling.
        let listeners: Vec<Listener> = self.listeners.read().iter().map(|(_, l)| l.clone()).collect();
        tracing::trace!(event = %event.name(), listeners = listeners.len(), "Dispatching event");
        for listener in listeners {
            listener(&event);
        }
    }

    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
