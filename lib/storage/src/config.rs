//! Client-side accessor for the extension's configuration tree.
//!
//! Reads are served from a local copy of the tree. Writes go to the server
//! first and only touch the local copy once the server has accepted them.

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use draekz_core::config::{self, ConfigSource};
use draekz_core::{EventBus, HookEvent};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;

pub const CONFIG_ROUTE: &str = "/draekz/api/config";

/// Where configuration is loaded from and saved to.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Fetches the full merged tree. `refresh` asks the server to re-read its file first.
    async fn load(&self, refresh: bool) -> Result<Value>;

    /// Sends changed values keyed by dotted path and returns the server's reply.
    async fn save(&self, changes: &Map<String, Value>) -> Result<Value>;
}

/// Talks to the `/draekz/api/config` routes.
pub struct HttpConfigBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConfigBackend {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, CONFIG_ROUTE)
    }
}

#[async_trait]
impl ConfigBackend for HttpConfigBackend {
    async fn load(&self, refresh: bool) -> Result<Value> {
        let mut request = self.client.get(self.url());
        if refresh {
            request = request.query(&[("refresh", "true")]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StorageError::Remote(format!(
                "Failed to load config: HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn save(&self, changes: &Map<String, Value>) -> Result<Value> {
        let json = serde_json::to_string(changes)?;
        let response = self
            .client
            .post(self.url())
            .form(&[("json", json)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::Remote(format!(
                "Failed to save config: HTTP {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

pub struct ConfigStore {
    tree: RwLock<Value>,
    backend: Arc<dyn ConfigBackend>,
    events: Arc<EventBus>,
}

impl ConfigStore {
    pub fn new(backend: Arc<dyn ConfigBackend>, initial: Value) -> Self {
        Self {
            tree: RwLock::new(initial),
            backend,
            events: Arc::new(EventBus::new()),
        }
    }

    /// Loads the initial tree from `backend`.
    pub async fn connect(backend: Arc<dyn ConfigBackend>) -> Result<Self> {
        let initial = backend.load(false).await?;
        Ok(Self::new(backend, initial))
    }

    /// Publishes config changes on `events` instead of a private bus.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    #[inline]
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn get_config_value(&self, key: &str) -> Option<Value> {
        self.config_value(key)
    }

    pub fn get_config_value_or(&self, key: &str, default: Value) -> Value {
        self.config_value(key).unwrap_or(default)
    }

    pub fn get_feature_value(&self, key: &str) -> Option<Value> {
        self.feature_value(key)
    }

    #[must_use]
    pub fn snapshot(&self) -> Value {
        self.tree.read().clone()
    }

    /// Saves `changes` remotely, then applies them locally and emits one
    /// `ConfigChange` per key. Returns false, changing nothing, when the
    /// server does not answer `{"status": "ok"}`.
    pub async fn set_config_values(&self, changes: Map<String, Value>) -> Result<bool> {
        let response = self.backend.save(&changes).await?;
        if response.get("status").and_then(Value::as_str) != Some("ok") {
            tracing::warn!(?response, "Config save was not accepted");
            return Ok(false);
        }

        {
            let mut tree = self.tree.write();
            for (key, value) in &changes {
                config::assign(&mut tree, key, value.clone());
            }
        }
        for (key, value) in changes {
            tracing::debug!(%key, "Config changed");
            self.events.dispatch(HookEvent::ConfigChange { key, value });
        }
        Ok(true)
    }

    /// Replaces the local tree with the server's.
    pub async fn reload(&self, refresh: bool) -> Result<()> {
        let tree = self.backend.load(refresh).await?;
        *self.tree.write() = tree;
        Ok(())
    }
}

impl ConfigSource for ConfigStore {
    fn config_value(&self, key: &str) -> Option<Value> {
        config::lookup(&self.tree.read(), key).cloned()
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("tree", &*self.tree.read())
            .finish_non_exhaustive()
    }
}
