//! Model info records and the per-type cache in front of the info routes.

use crate::error::{Result, StorageError};
use ahash::AHashMap;
use async_trait::async_trait;
use draekz_core::{EventBus, HookEvent, SubscriptionId};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelInfoType {
    Checkpoints,
    Loras,
}

impl ModelInfoType {
    pub const ALL: [ModelInfoType; 2] = [ModelInfoType::Checkpoints, ModelInfoType::Loras];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelInfoType::Checkpoints => "checkpoints",
            ModelInfoType::Loras => "loras",
        }
    }

    /// Name of the push event the server sends after refreshing a record.
    #[must_use]
    pub fn refresh_event_name(&self) -> String {
        format!("draekz-refreshed-{}-info", self.as_str())
    }
}

impl fmt::Display for ModelInfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelInfoType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "checkpoints" => Ok(ModelInfoType::Checkpoints),
            "loras" => Ok(ModelInfoType::Loras),
            other => Err(format!("Unknown model type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainedWord {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub civitai: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub civitai_url: Option<String>,
    /// `"image"` or `"video"`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfg: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positive: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ImageResource>>,
}

/// Everything the server knows about one model file. Every field is optional
/// and unknown fields survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_info_file: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_model_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_words: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_words: Option<Vec<TrainedWord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ModelImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelInfo {
    pub fn for_file(file: &str) -> Self {
        Self {
            file: Some(file.to_string()),
            ..Default::default()
        }
    }

    /// Name, else file, else "Unknown". Empty strings count as missing.
    #[must_use]
    pub fn display_title(&self) -> &str {
        [self.name.as_deref(), self.file.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("Unknown")
    }

    /// The first link to the model's civitai page.
    #[must_use]
    pub fn civitai_link(&self) -> Option<&str> {
        self.links
            .as_ref()?
            .iter()
            .map(String::as_str)
            .find(|l| l.contains("civitai.com/models"))
    }

    /// The civitai lookup error stored in `raw`, if the lookup failed.
    #[must_use]
    pub fn civitai_error(&self) -> Option<&str> {
        self.raw.as_ref()?.get("civitai")?.get("error")?.as_str()
    }

    /// True once a civitai lookup has been attempted.
    #[must_use]
    pub fn has_civitai_data(&self) -> bool {
        self.raw.as_ref().and_then(|r| r.get("civitai")).is_some()
    }
}

/// The `{status, data}` wrapper every info route answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: Value,
    pub data: T,
}

/// Client side of the model info routes.
#[async_trait]
pub trait ModelInfoApi: Send + Sync {
    async fn get_models_info(
        &self,
        model_type: ModelInfoType,
        files: &[String],
        light: bool,
    ) -> Result<Vec<Option<ModelInfo>>>;

    async fn refresh_models_info(
        &self,
        model_type: ModelInfoType,
        files: &[String],
    ) -> Result<Vec<Option<ModelInfo>>>;

    async fn clear_models_info(&self, model_type: ModelInfoType, files: &[String]) -> Result<()>;

    async fn save_model_info(
        &self,
        model_type: ModelInfoType,
        file: &str,
        partial: &Value,
    ) -> Result<Option<ModelInfo>>;
}

pub struct HttpModelInfoApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpModelInfoApi {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, model_type: ModelInfoType, suffix: &str) -> String {
        format!("{}/draekz/api/{}/info{}", self.base_url, model_type, suffix)
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            return Err(StorageError::Remote(format!(
                "Model info request failed: HTTP {}",
                response.status()
            )));
        }
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl ModelInfoApi for HttpModelInfoApi {
    async fn get_models_info(
        &self,
        model_type: ModelInfoType,
        files: &[String],
        light: bool,
    ) -> Result<Vec<Option<ModelInfo>>> {
        let mut query = vec![("files", files.join(","))];
        if light {
            query.push(("light", "true".to_string()));
        }
        let response = self
            .client
            .get(self.url(model_type, ""))
            .query(&query)
            .send()
            .await?;
        Self::unwrap_envelope(response).await
    }

    async fn refresh_models_info(
        &self,
        model_type: ModelInfoType,
        files: &[String],
    ) -> Result<Vec<Option<ModelInfo>>> {
        let response = self
            .client
            .get(self.url(model_type, "/refresh"))
            .query(&[("files", files.join(","))])
            .send()
            .await?;
        Self::unwrap_envelope(response).await
    }

    async fn clear_models_info(&self, model_type: ModelInfoType, files: &[String]) -> Result<()> {
        let response = self
            .client
            .post(self.url(model_type, "/clear"))
            .query(&[("files", files.join(","))])
            .send()
            .await?;
        let _: Value = Self::unwrap_envelope(response).await?;
        Ok(())
    }

    async fn save_model_info(
        &self,
        model_type: ModelInfoType,
        file: &str,
        partial: &Value,
    ) -> Result<Option<ModelInfo>> {
        let response = self
            .client
            .post(self.url(model_type, ""))
            .query(&[("file", file)])
            .form(&[("json", serde_json::to_string(partial)?)])
            .send()
            .await?;
        Self::unwrap_envelope(response).await
    }
}

#[derive(Default)]
struct CacheState {
    /// `None` records an explicit "no info"; a missing key means not fetched.
    entries: AHashMap<String, Option<ModelInfo>>,
    /// Newest ticket whose result has been written, per file.
    applied: AHashMap<String, u64>,
}

/// Cache of model info for one model type.
///
/// Every write-producing request takes a ticket when it starts. Its result is
/// written only if no newer ticket has already been written for the same
/// file, so the most recently issued request wins regardless of the order
/// responses arrive in.
pub struct ModelInfoService {
    model_type: ModelInfoType,
    api: Arc<dyn ModelInfoApi>,
    state: Mutex<CacheState>,
    next_ticket: AtomicU64,
}

impl ModelInfoService {
    pub fn new(model_type: ModelInfoType, api: Arc<dyn ModelInfoApi>) -> Self {
        Self {
            model_type,
            api,
            state: Mutex::new(CacheState::default()),
            next_ticket: AtomicU64::new(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn model_type(&self) -> ModelInfoType {
        self.model_type
    }

    /// The cached value for `file`: `None` if never fetched, `Some(None)` if
    /// the server had no info.
    #[must_use]
    pub fn cached(&self, file: &str) -> Option<Option<ModelInfo>> {
        self.state.lock().entries.get(file).cloned()
    }

    pub async fn get_info(
        &self,
        file: &str,
        refresh: bool,
        light: bool,
    ) -> Result<Option<ModelInfo>> {
        if !refresh {
            if let Some(info) = self.cached(file) {
                return Ok(info);
            }
        }
        self.fetch_info(file, refresh, light).await
    }

    pub async fn refresh_info(&self, file: &str) -> Result<Option<ModelInfo>> {
        self.fetch_info(file, true, false).await
    }

    /// Clears the server's stored info and forgets the cached entry.
    pub async fn clear_fetched_info(&self, file: &str) -> Result<Option<ModelInfo>> {
        let ticket = self.take_ticket();
        self.api
            .clear_models_info(self.model_type, &[file.to_string()])
            .await?;
        self.apply(file, ticket, None);
        Ok(None)
    }

    pub async fn save_partial_info(
        &self,
        file: &str,
        partial: Value,
    ) -> Result<Option<ModelInfo>> {
        let ticket = self.take_ticket();
        let info = self
            .api
            .save_model_info(self.model_type, file, &partial)
            .await?;
        self.apply(file, ticket, Some(info.clone()));
        Ok(info)
    }

    /// Stores a record pushed by the server. Records without a file are ignored.
    pub fn handle_async_update(&self, data: &Value) -> bool {
        let info = match serde_json::from_value::<ModelInfo>(data.clone()) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(model_type = %self.model_type, error = %e, "Ignoring malformed model info push");
                return false;
            }
        };
        let Some(file) = info.file.clone().filter(|f| !f.is_empty()) else {
            return false;
        };
        let ticket = self.take_ticket();
        self.apply(&file, ticket, Some(Some(info)))
    }

    /// Routes this type's refresh pushes from `events` into the cache.
    pub fn subscribe(self: &Arc<Self>, events: &EventBus) -> SubscriptionId {
        let service: Weak<Self> = Arc::downgrade(self);
        events.subscribe(move |event| {
            let HookEvent::ModelInfoRefreshed { model_type, data } = event else {
                return;
            };
            let Some(service) = service.upgrade() else { return };
            if model_type == service.model_type.as_str() {
                service.handle_async_update(data);
            }
        })
    }

    async fn fetch_info(&self, file: &str, refresh: bool, light: bool) -> Result<Option<ModelInfo>> {
        let ticket = self.take_ticket();
        let files = [file.to_string()];
        let infos = if refresh {
            self.api.refresh_models_info(self.model_type, &files).await?
        } else {
            self.api.get_models_info(self.model_type, &files, light).await?
        };
        let info = infos.into_iter().next().flatten();
        if !light {
            self.apply(file, ticket, Some(info.clone()));
        }
        Ok(info)
    }

    fn take_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Writes `entry` (or removes the key when `entry` is `None`) unless a
    /// newer ticket already wrote this file.
    fn apply(&self, file: &str, ticket: u64, entry: Option<Option<ModelInfo>>) -> bool {
        let mut state = self.state.lock();
        if state.applied.get(file).is_some_and(|&applied| applied > ticket) {
            tracing::debug!(file, ticket, "Discarding stale model info response");
            return false;
        }
        state.applied.insert(file.to_string(), ticket);
        match entry {
            Some(info) => {
                state.entries.insert(file.to_string(), info);
            }
            None => {
                state.entries.remove(file);
            }
        }
        true
    }
}

impl std::fmt::Debug for ModelInfoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelInfoService")
            .field("model_type", &self.model_type)
            .field("cached", &self.state.lock().entries.len())
            .finish()
    }
}

/// One cache per model type, sharing a client.
#[derive(Debug, Clone)]
pub struct ModelInfoServices {
    pub checkpoints: Arc<ModelInfoService>,
    pub loras: Arc<ModelInfoService>,
}

impl ModelInfoServices {
    pub fn new(api: Arc<dyn ModelInfoApi>) -> Self {
        Self {
            checkpoints: Arc::new(ModelInfoService::new(ModelInfoType::Checkpoints, api.clone())),
            loras: Arc::new(ModelInfoService::new(ModelInfoType::Loras, api)),
        }
    }

    #[must_use]
    pub fn for_type(&self, model_type: ModelInfoType) -> &Arc<ModelInfoService> {
        match model_type {
            ModelInfoType::Checkpoints => &self.checkpoints,
            ModelInfoType::Loras => &self.loras,
        }
    }

    /// Subscribes both caches to refresh pushes on `events`.
    pub fn subscribe(&self, events: &EventBus) {
        for model_type in ModelInfoType::ALL {
            self.for_type(model_type).subscribe(events);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Serves records from a map, optionally delaying each call.
    #[derive(Default)]
    pub(crate) struct FakeModelInfoApi {
        pub records: Mutex<AHashMap<String, ModelInfo>>,
        pub calls: Mutex<Vec<String>>,
        pub delays: Mutex<VecDeque<Duration>>,
        pub fail: std::sync::atomic::AtomicBool,
    }

    impl FakeModelInfoApi {
        pub(crate) fn with_record(info: ModelInfo) -> Arc<Self> {
            let api = Self::default();
            let file = info.file.clone().unwrap_or_default();
            api.records.lock().insert(file, info);
            Arc::new(api)
        }

        async fn call(&self, name: String) -> Result<()> {
            self.calls.lock().push(name);
            let delay = self.delays.lock().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(StorageError::Remote("HTTP 500".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ModelInfoApi for FakeModelInfoApi {
        async fn get_models_info(
            &self,
            _model_type: ModelInfoType,
            files: &[String],
            light: bool,
        ) -> Result<Vec<Option<ModelInfo>>> {
            self.call(format!("get:{}:{light}", files.join(","))).await?;
            let records = self.records.lock();
            Ok(files.iter().map(|f| records.get(f).cloned()).collect())
        }

        async fn refresh_models_info(
            &self,
            _model_type: ModelInfoType,
            files: &[String],
        ) -> Result<Vec<Option<ModelInfo>>> {
            self.call(format!("refresh:{}", files.join(","))).await?;
            let mut records = self.records.lock();
            Ok(files
                .iter()
                .map(|f| {
                    let record = records.get_mut(f)?;
                    record.raw = Some(json!({"civitai": {"id": 1}}));
                    Some(record.clone())
                })
                .collect())
        }

        async fn clear_models_info(
            &self,
            _model_type: ModelInfoType,
            files: &[String],
        ) -> Result<()> {
            self.call(format!("clear:{}", files.join(","))).await
        }

        async fn save_model_info(
            &self,
            _model_type: ModelInfoType,
            file: &str,
            partial: &Value,
        ) -> Result<Option<ModelInfo>> {
            self.call(format!("save:{file}")).await?;
            let mut records = self.records.lock();
            let record = records
                .entry(file.to_string())
                .or_insert_with(|| ModelInfo::for_file(file));
            let mut merged = serde_json::to_value(&*record)?;
            draekz_core::config::merge(&mut merged, partial);
            *record = serde_json::from_value(merged)?;
            Ok(Some(record.clone()))
        }
    }

    fn lora(file: &str, name: &str) -> ModelInfo {
        ModelInfo {
            name: Some(name.to_string()),
            ..ModelInfo::for_file(file)
        }
    }

    #[test]
    fn test_wire_format_keeps_unknown_fields() {
        let json = json!({
            "file": "a.safetensors",
            "hasInfoFile": true,
            "strengthMin": 0.5,
            "trainedWords": [{"word": "cat", "count": 3}],
            "filterDir": "sdxl"
        });
        let info: ModelInfo = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(info.has_info_file, Some(true));
        assert_eq!(info.trained_words.as_ref().unwrap()[0].count, Some(3));
        assert_eq!(serde_json::to_value(&info).unwrap(), json);
    }

    #[test]
    fn test_display_title_fallbacks() {
        assert_eq!(lora("a.safetensors", "Alpha").display_title(), "Alpha");
        assert_eq!(lora("a.safetensors", "").display_title(), "a.safetensors");
        assert_eq!(ModelInfo::default().display_title(), "Unknown");
    }

    #[test]
    fn test_civitai_link() {
        let info = ModelInfo {
            links: Some(vec![
                "https://example.com/x".to_string(),
                "https://civitai.com/models/123".to_string(),
            ]),
            raw: Some(json!({"civitai": {"error": "Model not found"}})),
            ..Default::default()
        };
        assert_eq!(info.civitai_link(), Some("https://civitai.com/models/123"));
        assert_eq!(info.civitai_error(), Some("Model not found"));
        assert!(info.has_civitai_data());
        assert!(!ModelInfo::default().has_civitai_data());
    }

    #[tokio::test]
    async fn test_get_info_caches() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());

        let first = service.get_info("a", false, false).await.unwrap();
        let second = service.get_info("a", false, false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(*api.calls.lock(), vec!["get:a:false"]);
    }

    #[tokio::test]
    async fn test_missing_info_cached_as_none() {
        let api = Arc::new(FakeModelInfoApi::default());
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());

        assert_eq!(service.get_info("nope", false, false).await.unwrap(), None);
        assert_eq!(service.cached("nope"), Some(None));
        assert_eq!(service.get_info("nope", false, false).await.unwrap(), None);
        assert_eq!(api.calls.lock().len(), 1);
    }

    #[test]
    fn test_envelope_accepts_null_records() {
        let envelope: Envelope<Vec<Option<ModelInfo>>> = serde_json::from_value(json!({
            "status": 200,
            "data": [null, {"file": "b.safetensors"}]
        }))
        .unwrap();
        assert_eq!(envelope.data[0], None);
        assert_eq!(envelope.data[1].as_ref().unwrap().file.as_deref(), Some("b.safetensors"));
    }

    #[tokio::test]
    async fn test_unknown_file_cached_without_refetch() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());

        assert_eq!(service.get_info("unknown", false, false).await.unwrap(), None);
        assert_eq!(service.get_info("unknown", false, false).await.unwrap(), None);
        assert_eq!(service.cached("unknown"), Some(None));

        assert_eq!(service.refresh_info("unknown").await.unwrap(), None);
        assert_eq!(service.cached("unknown"), Some(None));
        assert_eq!(*api.calls.lock(), vec!["get:unknown:false", "refresh:unknown"]);
    }

    #[tokio::test]
    async fn test_light_fetch_not_cached() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());

        assert!(service.get_info("a", false, true).await.unwrap().is_some());
        assert_eq!(service.cached("a"), None);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());
        service.get_info("a", false, false).await.unwrap();

        let refreshed = service.refresh_info("a").await.unwrap().unwrap();

        assert!(refreshed.has_civitai_data());
        assert_eq!(service.cached("a"), Some(Some(refreshed)));
        assert_eq!(*api.calls.lock(), vec!["get:a:false", "refresh:a"]);
    }

    #[tokio::test]
    async fn test_clear_removes_entry() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());
        service.get_info("a", false, false).await.unwrap();

        assert_eq!(service.clear_fetched_info("a").await.unwrap(), None);
        assert_eq!(service.cached("a"), None);
    }

    #[tokio::test]
    async fn test_failed_request_leaves_cache() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());
        let cached = service.get_info("a", false, false).await.unwrap();

        api.fail.store(true, Ordering::SeqCst);
        let result = service.save_partial_info("a", json!({"userNote": "x"})).await;

        assert!(matches!(result, Err(StorageError::Remote(_))));
        assert_eq!(service.cached("a"), Some(cached));
    }

    #[tokio::test]
    async fn test_save_partial_writes_response() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());

        let saved = service
            .save_partial_info("a", json!({"strengthMin": 0.25}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(saved.strength_min, Some(0.25));
        assert_eq!(saved.name.as_deref(), Some("Alpha"));
        assert_eq!(service.cached("a"), Some(Some(saved)));
    }

    #[tokio::test]
    async fn test_newest_request_wins_out_of_order() {
        let api = FakeModelInfoApi::with_record(lora("a", "Alpha"));
        api.delays
            .lock()
            .extend([Duration::from_millis(80), Duration::from_millis(5)]);
        let service = ModelInfoService::new(ModelInfoType::Loras, api.clone());

        let (older, newer) = tokio::join!(
            service.save_partial_info("a", json!({"userNote": "older"})),
            service.save_partial_info("a", json!({"userNote": "newer"})),
        );
        older.unwrap();
        newer.unwrap();

        let cached = service.cached("a").unwrap().unwrap();
        assert_eq!(cached.user_note.as_deref(), Some("newer"));
    }

    #[tokio::test]
    async fn test_async_update_by_file() {
        let service = Arc::new(ModelInfoService::new(
            ModelInfoType::Loras,
            Arc::new(FakeModelInfoApi::default()),
        ));
        let events = EventBus::new();
        service.subscribe(&events);

        events.dispatch(HookEvent::ModelInfoRefreshed {
            model_type: "checkpoints".to_string(),
            data: json!({"file": "a", "name": "Wrong type"}),
        });
        assert_eq!(service.cached("a"), None);

        events.dispatch(HookEvent::ModelInfoRefreshed {
            model_type: "loras".to_string(),
            data: json!({"file": "a", "name": "Pushed"}),
        });
        assert_eq!(
            service.cached("a").unwrap().unwrap().name.as_deref(),
            Some("Pushed")
        );

        assert!(!service.handle_async_update(&json!({"name": "No file"})));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ModelInfoType::Loras.refresh_event_name(), "draekz-refreshed-loras-info");
        assert_eq!("checkpoints".parse::<ModelInfoType>(), Ok(ModelInfoType::Checkpoints));
        assert!("vae".parse::<ModelInfoType>().is_err());
    }
}
