//! The extension facade: owns the shared state and builds every host wrapper.

use crate::config::ConfigSource;
use crate::error::{Error, Result};
use crate::events::{EventBus, HookEvent};
use crate::extensions::{DeliveryReport, Extension, ExtensionInvoker, ExtensionMethod};
use crate::graph::{NodeId, WorkflowGraph, WorkflowNode};
use crate::hooks::{api_url, AsyncOp, HookRegistry, MouseEvent, Operation, SyncOp};
use crate::link_fixer::{CheckReport, LinkFixer};
use crate::log_level::{self, LOG_LEVEL_CONFIG_KEY};
use crate::menu::{compose_canvas_menu, MenuEntry};
use crate::messages::{MessageAction, MessageCenter, MessageType, UiMessage};
use crate::monitor::{monitoring_enabled, LinkMonitor, LiveGraph};
use crate::selective::ApiPrompt;
use crate::state::{HookState, OnExit};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Weak};

pub const LINK_FIXER_ROUTE: &str = "/draekz/link_fixer";
pub const BAD_LINKS_MESSAGE_ID: &str = "bad-links";
pub const FIX_IN_PLACE_CALLBACK: &str = "fix-in-place";
pub const SHOW_CORRUPT_ALERTS_KEY: &str = "features.show_alerts_for_corrupt_workflows";

/// Arguments of the host's app-level queue call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRequest {
    pub number: i64,
    pub batch_count: u32,
}

/// Arguments of the host's API-level queue call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiQueueRequest {
    pub number: i64,
    pub prompt: ApiPrompt,
}

/// Arguments of the host's API-JSON load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiJsonLoad {
    pub api_data: Value,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct DraekzOptions {
    /// The host API's base path, used to resolve extension routes.
    pub api_base: String,
    /// Origin the link fixer page is served from, for log messages.
    pub origin: String,
}

impl Default for DraekzOptions {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            origin: "http://127.0.0.1:8188".to_string(),
        }
    }
}

/// A repaired graph ready to hand back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedInPlace {
    pub graph: WorkflowGraph,
    /// True when the host aborted the original load and must load `graph` itself.
    pub reload: bool,
}

struct PendingFix {
    fixer: LinkFixer<WorkflowGraph>,
    reload: bool,
    live_graph: LiveGraph,
}

pub struct Draekz {
    state: Arc<HookState>,
    events: Arc<EventBus>,
    messages: Arc<MessageCenter>,
    monitor: Arc<LinkMonitor>,
    registry: HookRegistry,
    extensions: ExtensionInvoker,
    config: Arc<dyn ConfigSource>,
    options: DraekzOptions,
    pending_fix: Mutex<Option<PendingFix>>,
}

impl Draekz {
    pub fn new(config: Arc<dyn ConfigSource>, options: DraekzOptions) -> Arc<Self> {
        Self::with_events(config, options, Arc::new(EventBus::new()))
    }

    /// Builds the facade on an existing bus, so config changes published
    /// by a config store reach the facade's listeners.
    pub fn with_events(
        config: Arc<dyn ConfigSource>,
        options: DraekzOptions,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let messages = Arc::new(MessageCenter::new());

        if let Some(level) = config.config_value(LOG_LEVEL_CONFIG_KEY) {
            log_level::apply_config_level(&level);
        }
        events.subscribe(|event| {
            if let HookEvent::ConfigChange { key, value } = event {
                if key == LOG_LEVEL_CONFIG_KEY {
                    log_level::apply_config_level(value);
                }
            }
        });

        Arc::new(Self {
            state: Arc::new(HookState::new()),
            monitor: Arc::new(LinkMonitor::new(messages.clone())),
            messages,
            events,
            registry: HookRegistry::new(),
            extensions: ExtensionInvoker::default(),
            config,
            options,
            pending_fix: Mutex::new(None),
        })
    }

    #[inline]
    pub fn state(&self) -> &Arc<HookState> {
        &self.state
    }

    #[inline]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    #[inline]
    pub fn messages(&self) -> &Arc<MessageCenter> {
        &self.messages
    }

    #[inline]
    pub fn monitor(&self) -> &Arc<LinkMonitor> {
        &self.monitor
    }

    #[inline]
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    #[inline]
    pub fn config(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }

    pub fn show_message(&self, message: UiMessage) {
        self.messages.show(message);
    }

    pub fn hide_message(&self, id: &str) -> bool {
        self.messages.hide(id)
    }

    pub fn clear_all_messages(&self) {
        self.messages.clear_all();
    }

    /// Remembers every workflow the host serializes.
    pub fn install_graph_serialize(
        &self,
        original: SyncOp<(), WorkflowGraph>,
    ) -> Result<SyncOp<(), WorkflowGraph>> {
        let state = self.state.clone();
        self.registry.install(Operation::GraphSerialize, original, move |inner| {
            Arc::new(move |()| {
                let workflow = inner(());
                state.set_serialized_workflow(workflow.clone());
                workflow
            }) as SyncOp<(), WorkflowGraph>
        })
    }

    pub fn install_process_mouse_down<R: 'static>(
        &self,
        original: SyncOp<MouseEvent, R>,
    ) -> Result<SyncOp<MouseEvent, R>> {
        let state = self.state.clone();
        let events = self.events.clone();
        self.registry.install(Operation::ProcessMouseDown, original, move |inner| {
            Arc::new(move |event: MouseEvent| {
                let _processing = state.scoped(
                    |f| f.processing_mouse_down = true,
                    |f| f.processing_mouse_down = false,
                );
                let value = inner(event.clone());
                events.dispatch(HookEvent::ProcessMouseDown {
                    original_event: event,
                });
                value
            }) as SyncOp<MouseEvent, R>
        })
    }

    /// Records the canvas position of the last adjusted pointer event.
    pub fn install_adjust_mouse_event(
        &self,
        original: SyncOp<MouseEvent, MouseEvent>,
    ) -> Result<SyncOp<MouseEvent, MouseEvent>> {
        let state = self.state.clone();
        self.registry.install(Operation::AdjustMouseEvent, original, move |inner| {
            Arc::new(move |event: MouseEvent| {
                let adjusted = inner(event);
                if let Some(point) = adjusted.canvas_point() {
                    state.update(|f| f.last_canvas_mouse = Some(point));
                }
                adjusted
            }) as SyncOp<MouseEvent, MouseEvent>
        })
    }

    pub fn install_copy_to_clipboard<R: 'static>(
        &self,
        original: SyncOp<Vec<NodeId>, R>,
    ) -> Result<SyncOp<Vec<NodeId>, R>> {
        let state = self.state.clone();
        self.registry.install(Operation::CopyToClipboard, original, move |inner| {
            Arc::new(move |nodes: Vec<NodeId>| {
                let multiple = nodes.len() > 1;
                let _copying = state.scoped(
                    |f| {
                        f.copying_to_clipboard = true;
                        f.copying_multiple_nodes = multiple;
                    },
                    |f| {
                        f.copying_to_clipboard = false;
                        f.copying_multiple_nodes = false;
                    },
                );
                inner(nodes)
            }) as SyncOp<Vec<NodeId>, R>
        })
    }

    /// Splices the entry `menu` builds into every canvas menu the host creates.
    pub fn install_canvas_menu_options(
        &self,
        original: SyncOp<(), Vec<MenuEntry>>,
        menu: Arc<dyn Fn() -> MenuEntry + Send + Sync>,
    ) -> Result<SyncOp<(), Vec<MenuEntry>>> {
        self.registry.install(Operation::CanvasMenuOptions, original, move |inner| {
            Arc::new(move |()| compose_canvas_menu(inner(()), menu())) as SyncOp<(), Vec<MenuEntry>>
        })
    }

    /// `Queue` fires before the call and `QueueEnd` after it, whatever the outcome.
    pub fn install_app_queue_prompt<R: Send + 'static>(
        &self,
        original: AsyncOp<QueueRequest, R>,
    ) -> Result<AsyncOp<QueueRequest, R>> {
        let state = self.state.clone();
        let events = self.events.clone();
        self.registry.install(Operation::AppQueuePrompt, original, move |inner| {
            Arc::new(move |request: QueueRequest| {
                let state = state.clone();
                let events = events.clone();
                let inner = inner.clone();
                async move {
                    state.update(|f| f.processing_queue = true);
                    let _end = OnExit::new(|| {
                        state.update(|f| f.processing_queue = false);
                        events.dispatch(HookEvent::QueueEnd);
                    });
                    events.dispatch(HookEvent::Queue);
                    inner(request).await
                }
                .boxed()
            }) as AsyncOp<QueueRequest, R>
        })
    }

    pub fn install_load_api_json<R: 'static>(
        &self,
        original: SyncOp<ApiJsonLoad, R>,
    ) -> Result<SyncOp<ApiJsonLoad, R>> {
        let state = self.state.clone();
        self.registry.install(Operation::LoadApiJson, original, move |inner| {
            Arc::new(move |load: ApiJsonLoad| {
                let api_data = load.api_data.clone();
                let _loading = state.scoped(
                    |f| f.loading_api_json = Some(api_data),
                    |f| f.loading_api_json = None,
                );
                inner(load)
            }) as SyncOp<ApiJsonLoad, R>
        })
    }

    pub fn install_graph_to_prompt<R: Send + 'static>(
        &self,
        original: AsyncOp<(), R>,
    ) -> Result<AsyncOp<(), R>> {
        let events = self.events.clone();
        self.registry.install(Operation::GraphToPrompt, original, move |inner| {
            Arc::new(move |()| {
                let events = events.clone();
                let inner = inner.clone();
                async move {
                    events.dispatch(HookEvent::GraphToPrompt);
                    let _end = OnExit::new(|| events.dispatch(HookEvent::GraphToPromptEnd));
                    inner(()).await
                }
                .boxed()
            }) as AsyncOp<(), R>
        })
    }

    /// Trims the prompt to the designated output nodes when a selective
    /// queue is in progress, and announces the prompt before sending it.
    pub fn install_api_queue_prompt<R: Send + 'static>(
        &self,
        original: AsyncOp<ApiQueueRequest, R>,
    ) -> Result<AsyncOp<ApiQueueRequest, R>> {
        let state = self.state.clone();
        let events = self.events.clone();
        self.registry.install(Operation::ApiQueuePrompt, original, move |inner| {
            Arc::new(move |mut request: ApiQueueRequest| {
                let state = state.clone();
                let events = events.clone();
                let inner = inner.clone();
                async move {
                    if let Some(ids) = state.queue_node_ids().filter(|ids| !ids.is_empty()) {
                        let before = request.prompt.output.len();
                        request.prompt.retain_outputs(&ids);
                        tracing::debug!(
                            ?ids,
                            before,
                            after = request.prompt.output.len(),
                            "Restricted prompt to selected output nodes"
                        );
                    }
                    events.dispatch(HookEvent::ApiQueuePromptBefore {
                        workflow: request.prompt.workflow.clone(),
                        output: serde_json::to_value(&request.prompt.output).unwrap_or_default(),
                    });
                    let _end = OnExit::new(|| events.dispatch(HookEvent::ApiQueuePromptEnd));
                    inner(request).await
                }
                .boxed()
            }) as AsyncOp<ApiQueueRequest, R>
        })
    }

    pub fn install_clean<R: 'static>(&self, original: SyncOp<(), R>) -> Result<SyncOp<(), R>> {
        let messages = self.messages.clone();
        self.registry.install(Operation::Clean, original, move |inner| {
            Arc::new(move |()| {
                messages.clear_all();
                inner(())
            }) as SyncOp<(), R>
        })
    }

    /// Wraps graph loading. After the host's load returns, the graph from
    /// `live_graph` (or the pre-load copy when the host aborted) is checked.
    pub fn install_load_graph_data<R: 'static>(
        self: &Arc<Self>,
        original: SyncOp<Option<WorkflowGraph>, R>,
        live_graph: LiveGraph,
    ) -> Result<SyncOp<Option<WorkflowGraph>, R>> {
        let draekz: Weak<Self> = Arc::downgrade(self);
        self.registry.install(Operation::LoadGraphData, original, move |inner| {
            Arc::new(move |graph: Option<WorkflowGraph>| {
                let Some(draekz) = draekz.upgrade() else {
                    return inner(graph);
                };
                draekz.monitor.cancel();
                draekz.clear_all_messages();
                let snapshot = graph.clone();
                let value = inner(graph);

                let (loaded, aborted) = match live_graph() {
                    Some(live) => (Some(live), false),
                    None => (snapshot, true),
                };
                if let Some(loaded) = loaded {
                    draekz.check_loaded_graph(loaded, aborted, live_graph.clone());
                }
                value
            }) as SyncOp<Option<WorkflowGraph>, R>
        })
    }

    pub fn install_api_url(&self, original: SyncOp<String, String>) -> Result<SyncOp<String, String>> {
        let api_base = self.options.api_base.clone();
        self.registry.install(Operation::ApiUrl, original, move |inner| {
            Arc::new(move |route: String| api_url(&api_base, &route, &|r: &str| inner(r.to_string())))
                as SyncOp<String, String>
        })
    }

    /// Checks a freshly loaded graph and offers a fix when it is corrupt.
    /// Clean graphs start the link monitor when it is configured.
    pub fn check_loaded_graph(
        self: &Arc<Self>,
        graph: WorkflowGraph,
        reload_on_fix: bool,
        live_graph: LiveGraph,
    ) -> CheckReport {
        let fixer = LinkFixer::new(graph);
        let report = fixer.check();

        if !report.has_bad_links {
            *self.pending_fix.lock() = None;
            if monitoring_enabled(self.config.as_ref()) {
                self.monitor.schedule(live_graph);
            }
            return report;
        }

        tracing::warn!(
            violations = report.details.len(),
            "The workflow you've loaded has corrupt linking data. Open {}{} to try to fix.",
            self.options.origin.trim_end_matches('/'),
            LINK_FIXER_ROUTE
        );
        if self.config.is_enabled(SHOW_CORRUPT_ALERTS_KEY) {
            self.messages.show(
                UiMessage::new(
                    BAD_LINKS_MESSAGE_ID,
                    "The workflow you've loaded has corrupt linking data that may be able to be fixed.",
                )
                .with_type(MessageType::Warn)
                .with_action(MessageAction::link("Open fixer", LINK_FIXER_ROUTE))
                .with_action(
                    MessageAction::link("Fix in place", LINK_FIXER_ROUTE)
                        .with_callback(FIX_IN_PLACE_CALLBACK),
                ),
            );
        }
        *self.pending_fix.lock() = Some(PendingFix {
            fixer,
            reload: reload_on_fix,
            live_graph,
        });
        report
    }

    /// Repairs the graph from the last corrupt load. The original graph is
    /// left untouched when the repair does not produce a clean graph.
    pub fn fix_in_place(self: &Arc<Self>) -> Result<FixedInPlace> {
        let pending = self.pending_fix.lock().take().ok_or(Error::NothingToFix)?;
        let result = pending.fixer.fix();
        self.hide_message(BAD_LINKS_MESSAGE_ID);

        if result.has_bad_links {
            tracing::error!(remaining = result.remaining.len(), "Unsuccessful at fixing corrupt data");
            return Err(Error::FixUnsuccessful(format!(
                "{} violations remain",
                result.remaining.len()
            )));
        }

        tracing::info!(
            patched = result.patched,
            deleted = result.deleted,
            "Fixed corrupt linking data in place"
        );
        if monitoring_enabled(self.config.as_ref()) {
            self.monitor.schedule(pending.live_graph);
        }
        Ok(FixedInPlace {
            graph: result.graph,
            reload: pending.reload,
        })
    }

    #[inline]
    pub fn has_pending_fix(&self) -> bool {
        self.pending_fix.lock().is_some()
    }

    /// Queues only `node_ids` (and what they depend on) through `app_queue`.
    /// Queue failures are logged, not returned.
    pub async fn queue_output_nodes<T, E: Display>(
        &self,
        node_ids: Vec<NodeId>,
        app_queue: AsyncOp<QueueRequest, std::result::Result<T, E>>,
    ) -> Option<T> {
        let _selected = self.state.scoped(
            |f| f.queue_node_ids = Some(node_ids.clone()),
            |f| f.queue_node_ids = None,
        );
        match app_queue(QueueRequest::default()).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(?node_ids, error = %e, "There was an error queuing nodes");
                None
            }
        }
    }

    /// Replaces each host reroute in turn; `replacing_reroute` names the node
    /// while its replacement runs. Returns how many were converted.
    pub async fn convert_reroutes<F, Fut>(&self, node_ids: &[NodeId], mut replace: F) -> usize
    where
        F: FnMut(NodeId) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut converted = 0;
        for &node_id in node_ids {
            let _replacing = self.state.scoped(
                |f| f.replacing_reroute = Some(node_id),
                |f| f.replacing_reroute = None,
            );
            match replace(node_id).await {
                Ok(()) => converted += 1,
                Err(e) => tracing::warn!(node_id, error = %e, "Failed to convert reroute"),
            }
        }
        converted
    }

    /// Finds a node in the workflow most recently produced by the host's serialize.
    pub fn serialized_node(&self, node_id: NodeId) -> Option<WorkflowNode> {
        self.state
            .with_serialized_workflow(|workflow| workflow?.node(node_id).cloned())
    }

    pub async fn invoke_extensions_async(
        &self,
        extensions: &[Arc<dyn Extension>],
        method: ExtensionMethod,
        args: &Value,
    ) -> Option<Vec<DeliveryReport>> {
        self.extensions
            .invoke_extensions_async(extensions, method, args, self.config.as_ref())
            .await
    }
}

impl std::fmt::Debug for Draekz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draekz")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowLink;
    use serde_json::json;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn draekz(config: Value) -> Arc<Draekz> {
        Draekz::new(Arc::new(config), DraekzOptions::default())
    }

    fn recorder(draekz: &Draekz) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        draekz.events().subscribe(move |event| sink.lock().push(event.name()));
        seen
    }

    fn corrupt_graph() -> WorkflowGraph {
        WorkflowGraph {
            nodes: vec![WorkflowNode::new(1), WorkflowNode::new(2).with_input(Some(5))],
            ..Default::default()
        }
    }

    #[test]
    fn test_mouse_down_flag_visible_during_call_and_cleared_on_panic() {
        let draekz = draekz(json!({}));
        let state = draekz.state().clone();
        let original: SyncOp<MouseEvent, bool> = Arc::new(move |event: MouseEvent| {
            assert!(state.is_processing_mouse_down());
            if event.button == 2 {
                panic!("host failure");
            }
            true
        });
        let wrapped = draekz.install_process_mouse_down(original).unwrap();
        let seen = recorder(&draekz);

        assert!(wrapped(MouseEvent::default()));
        assert!(!draekz.state().is_processing_mouse_down());
        assert_eq!(*seen.lock(), vec!["on-process-mouse-down"]);

        let failed = catch_unwind(AssertUnwindSafe(|| {
            wrapped(MouseEvent {
                button: 2,
                ..Default::default()
            })
        }));
        assert!(failed.is_err());
        assert!(!draekz.state().is_processing_mouse_down());
    }

    #[test]
    fn test_copy_flags_track_node_count() {
        let draekz = draekz(json!({}));
        let state = draekz.state().clone();
        let original: SyncOp<Vec<NodeId>, (bool, bool)> = Arc::new(move |_: Vec<NodeId>| {
            (state.is_copying_to_clipboard(), state.is_copying_multiple_nodes())
        });
        let wrapped = draekz.install_copy_to_clipboard(original).unwrap();
        assert_eq!(wrapped(vec![1]), (true, false));
        assert_eq!(wrapped(vec![1, 2]), (true, true));
        assert!(!draekz.state().is_copying_to_clipboard());
    }

    #[test]
    fn test_adjust_mouse_event_records_position() {
        let draekz = draekz(json!({}));
        let original: SyncOp<MouseEvent, MouseEvent> = Arc::new(|mut event: MouseEvent| {
            event.canvas_x = Some(event.client_x + 10.0);
            event.canvas_y = Some(event.client_y + 20.0);
            event
        });
        let wrapped = draekz.install_adjust_mouse_event(original).unwrap();
        wrapped(MouseEvent {
            client_x: 1.0,
            client_y: 2.0,
            ..Default::default()
        });
        let point = draekz.state().last_canvas_mouse().unwrap();
        assert_eq!((point.x, point.y), (11.0, 22.0));
    }

    #[tokio::test]
    async fn test_app_queue_events_wrap_failures() {
        let draekz = draekz(json!({}));
        let state = draekz.state().clone();
        let original: AsyncOp<QueueRequest, std::result::Result<(), String>> = Arc::new(move |_: QueueRequest| {
            let processing = state.is_processing_queue();
            async move {
                assert!(processing);
                Err::<(), String>("server down".to_string())
            }
            .boxed()
        });
        let wrapped = draekz.install_app_queue_prompt(original).unwrap();
        let seen = recorder(&draekz);

        let result = wrapped(QueueRequest::default()).await;
        assert_eq!(result, Err("server down".to_string()));
        assert!(!draekz.state().is_processing_queue());
        assert_eq!(*seen.lock(), vec!["queue", "queue-end"]);
    }

    #[tokio::test]
    async fn test_app_queue_flag_cleared_when_queue_listener_panics() {
        let draekz = draekz(json!({}));
        let original: AsyncOp<QueueRequest, ()> = Arc::new(|_: QueueRequest| async {}.boxed());
        let wrapped = draekz.install_app_queue_prompt(original).unwrap();
        let seen = recorder(&draekz);
        draekz.events().subscribe(|event| {
            if matches!(event, HookEvent::Queue) {
                panic!("listener failed");
            }
        });

        let outcome = AssertUnwindSafe(wrapped(QueueRequest::default())).catch_unwind().await;

        assert!(outcome.is_err());
        assert!(!draekz.state().is_processing_queue());
        assert_eq!(*seen.lock(), vec!["queue", "queue-end"]);
    }

    #[tokio::test]
    async fn test_selective_queue_rewrites_api_prompt() {
        let draekz = draekz(json!({}));
        let sent = Arc::new(Mutex::new(None));
        let capture = sent.clone();
        let api_queue: AsyncOp<ApiQueueRequest, ()> = Arc::new(move |request: ApiQueueRequest| {
            *capture.lock() = Some(request.prompt.output.keys().cloned().collect::<Vec<_>>());
            async {}.boxed()
        });
        let api_queue = draekz.install_api_queue_prompt(api_queue).unwrap();

        let prompt: ApiPrompt = serde_json::from_value(json!({
            "output": {
                "1": {"inputs": {}},
                "2": {"inputs": {"a": ["1", 0]}},
                "3": {"inputs": {"b": ["2", 0]}},
                "4": {"inputs": {}}
            }
        }))
        .unwrap();
        let app_queue: AsyncOp<QueueRequest, std::result::Result<(), String>> = Arc::new(move |request: QueueRequest| {
            let api_queue = api_queue.clone();
            let prompt = prompt.clone();
            async move {
                api_queue(ApiQueueRequest {
                    number: request.number,
                    prompt,
                })
                .await;
                Ok::<(), String>(())
            }
            .boxed()
        });

        assert_eq!(draekz.queue_output_nodes(vec![3], app_queue).await, Some(()));
        assert_eq!(sent.lock().clone().unwrap(), vec!["1", "2", "3"]);
        assert_eq!(draekz.state().queue_node_ids(), None);
    }

    #[tokio::test]
    async fn test_queue_failure_is_logged_and_ids_cleared() {
        let draekz = draekz(json!({}));
        let app_queue: AsyncOp<QueueRequest, std::result::Result<(), String>> =
            Arc::new(|_: QueueRequest| async { Err::<(), String>("rejected".to_string()) }.boxed());
        assert_eq!(draekz.queue_output_nodes(vec![7], app_queue).await, None);
        assert_eq!(draekz.state().queue_node_ids(), None);
    }

    #[test]
    fn test_load_graph_data_flags_corrupt_workflow() {
        let draekz = draekz(json!({"features": {"show_alerts_for_corrupt_workflows": true}}));
        draekz.show_message(UiMessage::new("stale", "from the previous workflow"));
        let original: SyncOp<Option<WorkflowGraph>, ()> = Arc::new(|_: Option<WorkflowGraph>| ());
        let live: LiveGraph = Arc::new(|| Some(corrupt_graph()));
        let wrapped = draekz.install_load_graph_data(original, live).unwrap();

        wrapped(Some(corrupt_graph()));
        let visible = draekz.messages().visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, BAD_LINKS_MESSAGE_ID);
        assert_eq!(visible[0].actions[1].callback.as_deref(), Some(FIX_IN_PLACE_CALLBACK));

        let fixed = draekz.fix_in_place().unwrap();
        assert!(!fixed.reload);
        assert_eq!(fixed.graph.node(2).unwrap().inputs[0].link, None);
        assert!(!draekz.messages().is_shown(BAD_LINKS_MESSAGE_ID));
        assert!(matches!(draekz.fix_in_place(), Err(Error::NothingToFix)));
    }

    #[test]
    fn test_aborted_load_checks_the_snapshot() {
        let draekz = draekz(json!({}));
        let original: SyncOp<Option<WorkflowGraph>, ()> = Arc::new(|_: Option<WorkflowGraph>| ());
        let wrapped = draekz
            .install_load_graph_data(original, Arc::new(|| None::<WorkflowGraph>))
            .unwrap();

        wrapped(Some(corrupt_graph()));
        // Alerts are off, but the fix is still offered.
        assert!(draekz.messages().visible().is_empty());
        assert!(draekz.fix_in_place().unwrap().reload);
    }

    #[test]
    fn test_clean_load_leaves_nothing_pending() {
        let draekz = draekz(json!({"features": {"show_alerts_for_corrupt_workflows": true}}));
        let graph = WorkflowGraph {
            nodes: vec![WorkflowNode::new(1).with_output(vec![1]), WorkflowNode::new(2).with_input(Some(1))],
            links: vec![WorkflowLink::new(1, (1, 0), (2, 0))],
            ..Default::default()
        };
        let report = draekz.check_loaded_graph(graph, false, Arc::new(|| None::<WorkflowGraph>));
        assert!(!report.has_bad_links);
        assert!(!draekz.has_pending_fix());
    }

    #[test]
    fn test_serialize_and_lookup() {
        let draekz = draekz(json!({}));
        let original: SyncOp<(), WorkflowGraph> = Arc::new(|()| WorkflowGraph {
            nodes: vec![WorkflowNode::new(8).with_type("KSampler")],
            ..Default::default()
        });
        let wrapped = draekz.install_graph_serialize(original).unwrap();
        assert!(draekz.serialized_node(8).is_none());
        wrapped(());
        assert_eq!(draekz.serialized_node(8).unwrap().node_type.as_deref(), Some("KSampler"));
    }

    #[test]
    fn test_clean_clears_messages_and_api_url() {
        let draekz = draekz(json!({}));
        draekz.show_message(UiMessage::new("x", "x"));
        let clean = draekz.install_clean(Arc::new(|()| 5) as SyncOp<(), i32>).unwrap();
        assert_eq!(clean(()), 5);
        assert!(draekz.messages().visible().is_empty());

        let url = draekz
            .install_api_url(Arc::new(|route: String| format!("/api{route}")) as SyncOp<String, String>)
            .unwrap();
        assert_eq!(url("/draekz/api/config".to_string()), "/draekz/api/config");
        assert_eq!(url("/prompt".to_string()), "/api/prompt");
    }

    #[tokio::test]
    async fn test_convert_reroutes_scopes_node_id() {
        let draekz = draekz(json!({}));
        let state = draekz.state().clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let converted = draekz
            .convert_reroutes(&[4, 5], move |id| {
                sink.lock().push(state.replacing_reroute());
                async move {
                    if id == 5 {
                        anyhow::bail!("node {id} vanished");
                    }
                    Ok(())
                }
            })
            .await;
        assert_eq!(converted, 1);
        assert_eq!(*seen.lock(), vec![Some(4), Some(5)]);
        assert_eq!(draekz.state().replacing_reroute(), None);
    }
}
