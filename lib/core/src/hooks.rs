//! Registry of wrapped host operations.
//!
//! The host adapter hands over its original callable for an [`Operation`]
//! and receives the augmented callable back. The registry remembers both, so
//! installing the same operation twice returns the wrapper already in place
//! instead of wrapping it again.

use crate::error::{Error, Result};
use ahash::AHashMap;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A synchronous host operation.
pub type SyncOp<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;

/// An asynchronous host operation.
pub type AsyncOp<A, R> = Arc<dyn Fn(A) -> BoxFuture<'static, R> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    GraphSerialize,
    ProcessMouseDown,
    AdjustMouseEvent,
    CopyToClipboard,
    CanvasMenuOptions,
    AppQueuePrompt,
    LoadApiJson,
    GraphToPrompt,
    ApiQueuePrompt,
    Clean,
    LoadGraphData,
    ApiUrl,
}

impl Operation {
    pub const ALL: [Operation; 12] = [
        Operation::GraphSerialize,
        Operation::ProcessMouseDown,
        Operation::AdjustMouseEvent,
        Operation::CopyToClipboard,
        Operation::CanvasMenuOptions,
        Operation::AppQueuePrompt,
        Operation::LoadApiJson,
        Operation::GraphToPrompt,
        Operation::ApiQueuePrompt,
        Operation::Clean,
        Operation::LoadGraphData,
        Operation::ApiUrl,
    ];

    /// The host member this operation replaces.
    #[must_use]
    pub fn host_member(&self) -> &'static str {
        match self {
            Operation::GraphSerialize => "LGraph.prototype.serialize",
            Operation::ProcessMouseDown => "LGraphCanvas.prototype.processMouseDown",
            Operation::AdjustMouseEvent => "LGraphCanvas.prototype.adjustMouseEvent",
            Operation::CopyToClipboard => "LGraphCanvas.prototype.copyToClipboard",
            Operation::CanvasMenuOptions => "LGraphCanvas.prototype.getCanvasMenuOptions",
            Operation::AppQueuePrompt => "app.queuePrompt",
            Operation::LoadApiJson => "app.loadApiJson",
            Operation::GraphToPrompt => "app.graphToPrompt",
            Operation::ApiQueuePrompt => "api.queuePrompt",
            Operation::Clean => "app.clean",
            Operation::LoadGraphData => "app.loadGraphData",
            Operation::ApiUrl => "api.apiURL",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.host_member())
    }
}

/// Canvas-space coordinates of a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

/// The parts of a host pointer event the wrappers look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseEvent {
    #[serde(default)]
    pub button: i16,
    #[serde(default)]
    pub client_x: f64,
    #[serde(default)]
    pub client_y: f64,
    /// Filled in by the host's `adjustMouseEvent`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_y: Option<f64>,
}

impl MouseEvent {
    #[must_use]
    pub fn canvas_point(&self) -> Option<CanvasPoint> {
        Some(CanvasPoint {
            x: self.canvas_x?,
            y: self.canvas_y?,
        })
    }
}

struct Installed {
    original: Arc<dyn Any + Send + Sync>,
    wrapper: Arc<dyn Any + Send + Sync>,
}

/// Remembers the original and the wrapper for every installed operation.
#[derive(Default)]
pub struct HookRegistry {
    installed: RwLock<AHashMap<Operation, Installed>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `original` wrapped by `wrap`, or returns the wrapper already
    /// installed for `op`. `wrap` is not called on re-installation.
    pub fn install<T, W>(&self, op: Operation, original: T, wrap: W) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        W: FnOnce(T) -> T,
    {
        if let Some(existing) = self.installed.read().get(&op) {
            tracing::debug!(operation = %op, "Operation already wrapped, reusing wrapper");
            return existing
                .wrapper
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| Error::SignatureMismatch(op.to_string()));
        }

        let mut installed = self.installed.write();
        // Another caller may have won the race between the two locks.
        if let Some(existing) = installed.get(&op) {
            return existing
                .wrapper
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| Error::SignatureMismatch(op.to_string()));
        }
        let wrapper = wrap(original.clone());
        installed.insert(
            op,
            Installed {
                original: Arc::new(original),
                wrapper: Arc::new(wrapper.clone()),
            },
        );
        tracing::debug!(operation = %op, "Installed wrapper");
        Ok(wrapper)
    }

    /// The host's callable captured when `op` was installed.
    pub fn original<T: Clone + 'static>(&self, op: Operation) -> Result<T> {
        let installed = self.installed.read();
        let entry = installed
            .get(&op)
            .ok_or_else(|| Error::NotInstalled(op.to_string()))?;
        entry
            .original
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| Error::SignatureMismatch(op.to_string()))
    }

    /// The wrapper currently installed for `op`.
    pub fn wrapper<T: Clone + 'static>(&self, op: Operation) -> Result<T> {
        let installed = self.installed.read();
        let entry = installed
            .get(&op)
            .ok_or_else(|| Error::NotInstalled(op.to_string()))?;
        entry
            .wrapper
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| Error::SignatureMismatch(op.to_string()))
    }

    /// Forgets `op` and hands back the original so the host can restore it.
    pub fn uninstall<T: Clone + 'static>(&self, op: Operation) -> Result<T> {
        let original = self.original::<T>(op)?;
        self.installed.write().remove(&op);
        Ok(original)
    }

    #[inline]
    pub fn is_installed(&self, op: Operation) -> bool {
        self.installed.read().contains_key(&op)
    }

    pub fn installed(&self) -> Vec<Operation> {
        let installed = self.installed.read();
        Operation::ALL
            .iter()
            .copied()
            .filter(|op| installed.contains_key(op))
            .collect()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("installed", &self.installed())
            .finish()
    }
}

/// Resolves extension routes against the API base; anything else goes to `original`.
pub fn api_url(api_base: &str, route: &str, original: &dyn Fn(&str) -> String) -> String {
    if route.contains("draekz/") {
        format!("{api_base}/{route}").replace("//", "/")
    } else {
        original(route)
    }
}
