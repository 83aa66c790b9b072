//! Periodic link check of the live graph.

use crate::config::ConfigSource;
use crate::graph::WorkflowGraph;
use crate::link_fixer;
use crate::messages::{MessageCenter, MessageType, UiMessage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const MONITOR_INTERVAL: Duration = Duration::from_secs(5);
pub const LIVE_BAD_LINKS_MESSAGE_ID: &str = "live-bad-links";

/// Config keys that turn monitoring on; either one is enough.
pub const MONITOR_CONFIG_KEYS: [&str; 2] = [
    "features.monitor_for_corrupt_links",
    "features.monitor_bad_links",
];

pub type LiveGraph = Arc<dyn Fn() -> Option<WorkflowGraph> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Clean,
    /// Bad links found and this is the first time since the graph was last clean.
    Alerted,
    /// Bad links found, already alerted.
    StillBad,
}

#[must_use]
pub fn monitoring_enabled(config: &dyn ConfigSource) -> bool {
    MONITOR_CONFIG_KEYS.iter().any(|key| config.is_enabled(key))
}

pub struct LinkMonitor {
    messages: Arc<MessageCenter>,
    interval: Duration,
    alerted: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LinkMonitor {
    pub fn new(messages: Arc<MessageCenter>) -> Self {
        Self::with_interval(messages, MONITOR_INTERVAL)
    }

    pub fn with_interval(messages: Arc<MessageCenter>, interval: Duration) -> Self {
        Self {
            messages,
            interval,
            alerted: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Checks `graph` once. Alerts on the first bad result and re-arms once
    /// the graph is clean again.
    pub fn tick(&self, graph: &WorkflowGraph) -> MonitorOutcome {
        if !link_fixer::check(graph).has_bad_links {
            self.alerted.store(false, Ordering::SeqCst);
            return MonitorOutcome::Clean;
        }
        if self.alerted.swap(true, Ordering::SeqCst) {
            return MonitorOutcome::StillBad;
        }
        tracing::warn!("Problematic links just found in live data");
        self.messages.show(
            UiMessage::new(
                LIVE_BAD_LINKS_MESSAGE_ID,
                "Problematic links just found in live data. Save your workflow and file a bug with the last few steps you took.",
            )
            .with_type(MessageType::Warn),
        );
        MonitorOutcome::Alerted
    }

    /// Starts checking `live_graph` every interval on the current tokio
    /// runtime, replacing any running schedule. Returns false outside a runtime.
    pub fn schedule(self: &Arc<Self>, live_graph: LiveGraph) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime available, link monitor not scheduled");
            return false;
        };
        let monitor = Arc::downgrade(self);
        let interval = self.interval;
        let handle = runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(monitor) = monitor.upgrade() else { break };
                if let Some(graph) = live_graph() {
                    monitor.tick(&graph);
                }
            }
        });
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(interval = ?self.interval, "Link monitor scheduled");
        true
    }

    pub fn cancel(&self) -> bool {
        match self.task.lock().take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Link monitor cancelled");
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for LinkMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for LinkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkMonitor")
            .field("interval", &self.interval)
            .field("alerted", &self.alerted.load(Ordering::SeqCst))
            .finish()
    }
}
