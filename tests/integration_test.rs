// Integration tests for draekz
use draekz_core::hooks::{AsyncOp, SyncOp};
use draekz_core::log_level::{self, LogLevel};
use draekz_core::{
    check, fix, ApiPrompt, ApiQueueRequest, Draekz, DraekzOptions, EventBus, HookEvent,
    QueueRequest, ViolationKind, WorkflowGraph,
};
use draekz_storage::{ConfigBackend, ConfigStore, StorageError, UserConfigFile};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn graph(json: Value) -> WorkflowGraph {
    serde_json::from_value(json).unwrap()
}

#[test]
fn test_missing_node_scenario() {
    let workflow = graph(json!({
        "nodes": [
            {"id": 1, "type": "CheckpointLoader", "outputs": [{"name": "MODEL", "links": [1]}]},
            {"id": 2, "type": "KSampler", "inputs": [{"name": "model", "link": 1}]},
            {"id": 3, "type": "SaveImage"}
        ],
        "links": [[1, 1, 0, 2, 0, "MODEL"], [2, 1, 0, 99, 0, "MODEL"]],
        "version": 0.4
    }));

    let report = check(&workflow);
    assert_eq!(report.details.len(), 1);
    assert_eq!(report.details[0].kind, ViolationKind::MissingNode);
    assert_eq!(report.details[0].link_id, 2);

    let result = fix(&workflow);
    assert!(!result.has_bad_links);
    let json = serde_json::to_value(&result.graph).unwrap();
    assert_eq!(json["links"], json!([[1, 1, 0, 2, 0, "MODEL"]]));
    assert_eq!(json["version"], json!(0.4));
    assert_eq!(json["nodes"][1]["inputs"][0]["name"], "model");
}

#[test]
fn test_dangling_input_scenario() {
    let workflow = graph(json!({
        "nodes": [{"id": 1}, {"id": 2, "inputs": [{"link": 5}]}],
        "links": []
    }));

    let report = check(&workflow);
    assert_eq!(report.count(ViolationKind::DanglingInput), 1);

    let result = fix(&workflow);
    assert!(!result.has_bad_links);
    assert_eq!(result.graph.node(2).unwrap().inputs[0].link, None);
    assert!(check(&result.graph).details.is_empty());
}

#[test]
fn test_fix_is_idempotent_on_messy_graph() {
    let workflow = graph(json!({
        "nodes": [
            {"id": 1, "outputs": [{"links": [1, 3, 7]}, {"links": null}]},
            {"id": 2, "inputs": [{"link": 1}, {"link": 4}]},
            {"id": 3, "inputs": [{"link": 3}]}
        ],
        "links": [
            {"id": 1, "origin_id": 1, "origin_slot": 0, "target_id": 2, "target_slot": 0, "type": "*"},
            [3, 1, 1, 3, 0, "*"],
            [6, 1, 0, 2, 1, "*"]
        ]
    }));
    assert!(check(&workflow).has_bad_links);

    let once = fix(&workflow);
    let twice = fix(&once.graph);
    assert!(!once.has_bad_links);
    assert_eq!(once.graph, twice.graph);
    assert_eq!(twice.patched + twice.deleted, 0);
}

/// A config backend standing in for the server, backed by a real user config file.
struct FileBackend {
    file: UserConfigFile,
}

#[async_trait::async_trait]
impl ConfigBackend for FileBackend {
    async fn load(&self, refresh: bool) -> draekz_storage::Result<Value> {
        if refresh {
            self.file.refresh()?;
        }
        Ok(self.file.get_config())
    }

    async fn save(&self, changes: &Map<String, Value>) -> draekz_storage::Result<Value> {
        self.file.set_user_config(changes)?;
        Ok(json!({"status": "ok"}))
    }
}

#[tokio::test]
async fn test_config_change_reaches_facade() {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(FileBackend {
        file: UserConfigFile::open(dir.path()).unwrap(),
    });
    let events = Arc::new(EventBus::new());
    let store = Arc::new(
        ConfigStore::connect(backend)
            .await
            .unwrap()
            .with_events(events.clone()),
    );
    let draekz = Draekz::with_events(store.clone(), DraekzOptions::default(), events);
    let previous = log_level::active_level();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    draekz.events().subscribe(move |event| sink.lock().push(event.name()));

    let mut changes = Map::new();
    changes.insert("log_level".to_string(), json!("DEV"));
    assert!(store.set_config_values(changes).await.unwrap());

    assert_eq!(log_level::active_level(), LogLevel::Dev);
    assert_eq!(*seen.lock(), vec!["config-change".to_string()]);
    log_level::set_active_level(previous);

    let reopened = UserConfigFile::open(dir.path()).unwrap();
    assert_eq!(reopened.get_config_value("log_level"), Some(json!("DEV")));
}

#[tokio::test]
async fn test_load_corrupt_graph_then_fix_in_place() {
    let config = json!({"features": {"show_alerts_for_corrupt_workflows": true}});
    let draekz = Draekz::new(Arc::new(config), DraekzOptions::default());
    let corrupt = graph(json!({
        "nodes": [{"id": 1}, {"id": 2, "inputs": [{"link": 5}]}],
        "links": []
    }));

    let live = Arc::new(Mutex::new(None::<WorkflowGraph>));
    let host_graph = live.clone();
    let original: SyncOp<Option<WorkflowGraph>, ()> = Arc::new(move |g: Option<WorkflowGraph>| {
        *host_graph.lock() = g;
    });
    let reader = live.clone();
    let load = draekz
        .install_load_graph_data(original, Arc::new(move || reader.lock().clone()))
        .unwrap();

    load(Some(corrupt));
    assert!(draekz.messages().is_shown("bad-links"));
    assert!(draekz.has_pending_fix());

    let fixed = draekz.fix_in_place().unwrap();
    assert!(!fixed.reload);
    assert!(!check(&fixed.graph).has_bad_links);
    assert!(!draekz.messages().is_shown("bad-links"));
}

#[tokio::test]
async fn test_selective_queue_end_to_end() {
    let draekz = Draekz::new(Arc::new(json!({})), DraekzOptions::default());
    let sent = Arc::new(Mutex::new(None::<ApiPrompt>));
    let sink = sent.clone();

    let api_queue: AsyncOp<ApiQueueRequest, Result<(), String>> =
        Arc::new(move |request: ApiQueueRequest| {
            *sink.lock() = Some(request.prompt);
            async { Ok::<(), String>(()) }.boxed()
        });
    let api_queue = draekz.install_api_queue_prompt(api_queue).unwrap();

    let prompt: ApiPrompt = serde_json::from_value(json!({
        "output": {
            "1": {"class_type": "CheckpointLoader", "inputs": {}},
            "2": {"class_type": "KSampler", "inputs": {"model": ["1", 0]}},
            "3": {"class_type": "SaveImage", "inputs": {"images": ["2", 0]}},
            "4": {"class_type": "PreviewImage", "inputs": {"images": ["2", 0]}}
        }
    }))
    .unwrap();

    let app_queue: AsyncOp<QueueRequest, Result<(), String>> =
        Arc::new(move |_request: QueueRequest| {
            let api_queue = api_queue.clone();
            let prompt = prompt.clone();
            async move { api_queue(ApiQueueRequest { number: 0, prompt }).await }.boxed()
        });
    let app_queue = draekz.install_app_queue_prompt(app_queue).unwrap();

    let names = Arc::new(Mutex::new(Vec::new()));
    let names_sink = names.clone();
    draekz.events().subscribe(move |event: &HookEvent| names_sink.lock().push(event.name()));

    assert_eq!(draekz.queue_output_nodes(vec![3], app_queue).await, Some(()));

    let sent = sent.lock().clone().unwrap();
    let ids: Vec<&str> = sent.output.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(
        *names.lock(),
        vec![
            "queue",
            "comfy-api-queue-prompt-before",
            "comfy-api-queue-prompt-end",
            "queue-end"
        ]
    );
    assert!(draekz.state().queue_node_ids().is_none());
}

#[test]
fn test_storage_error_is_remote_for_transport() {
    let error = StorageError::Remote("connection refused".to_string());
    assert!(error.to_string().contains("connection refused"));
}
