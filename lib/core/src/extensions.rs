//! Forwarding lifecycle callbacks to third-party extensions.
//!
//! Each extension runs independently. A failing or panicking extension is
//! logged and never stops delivery to the others; extensions on the deny-list
//! are skipped with a rate-limited warning.

use crate::config::ConfigSource;
use crate::log_level::LogLevel;
use crate::throttle::LogThrottle;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

pub const BLOCKED_WARNING_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtensionMethod {
    NodeCreated,
    BeforeRegisterNodeDef,
}

impl ExtensionMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionMethod::NodeCreated => "nodeCreated",
            ExtensionMethod::BeforeRegisterNodeDef => "beforeRegisterNodeDef",
        }
    }

    /// Config key that, when exactly `false`, disables forwarding this method.
    #[must_use]
    pub fn config_key(&self) -> &'static str {
        match self {
            ExtensionMethod::NodeCreated => "features.invoke_extensions_async.node_created",
            ExtensionMethod::BeforeRegisterNodeDef => {
                "features.invoke_extensions_async.before_register_node_def"
            }
        }
    }
}

impl fmt::Display for ExtensionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A third-party extension registered with the host.
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    fn handles(&self, method: ExtensionMethod) -> bool;

    fn invoke(&self, method: ExtensionMethod, args: &Value) -> BoxFuture<'static, anyhow::Result<()>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedExtension {
    pub name: String,
    pub reason: String,
}

impl BlockedExtension {
    pub fn new(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Case-insensitive prefix match on the extension name.
    #[must_use]
    pub fn matches(&self, extension_name: &str) -> bool {
        extension_name
            .to_lowercase()
            .starts_with(&self.name.to_lowercase())
    }
}

/// Extensions known to break when handed this crate's nodes.
pub fn default_blocklist() -> Vec<BlockedExtension> {
    vec![
        BlockedExtension::new(
            "Comfy.WidgetInputs",
            "Major conflict with draekz nodes' inputs causing instability and repeated link disconnections.",
        ),
        BlockedExtension::new(
            "efficiency.widgethider",
            "Overrides value getter before widget getter is prepared.",
        ),
    ]
}

/// Outcome of delivering to one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Completed,
    Failed(String),
    /// `warned` is false when the suppression warning was throttled.
    Blocked { warned: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub extension: String,
    pub delivery: Delivery,
}

pub struct ExtensionInvoker {
    blocklist: Vec<BlockedExtension>,
    throttle: LogThrottle,
}

impl Default for ExtensionInvoker {
    fn default() -> Self {
        Self::new(default_blocklist())
    }
}

impl ExtensionInvoker {
    pub fn new(blocklist: Vec<BlockedExtension>) -> Self {
        Self {
            blocklist,
            throttle: LogThrottle::new(BLOCKED_WARNING_WINDOW),
        }
    }

    #[inline]
    pub fn blocklist(&self) -> &[BlockedExtension] {
        &self.blocklist
    }

    /// Calls `method` on every extension that handles it and waits for all of
    /// them. Returns `None` when the method is switched off in config.
    pub async fn invoke_extensions_async(
        &self,
        extensions: &[Arc<dyn Extension>],
        method: ExtensionMethod,
        args: &Value,
        config: &dyn ConfigSource,
    ) -> Option<Vec<DeliveryReport>> {
        if config.config_value(method.config_key()) == Some(Value::Bool(false)) {
            tracing::info!(%method, "Skipping invokeExtensionsAsync for applicable draekz nodes");
            return None;
        }

        let calls = extensions
            .iter()
            .filter(|extension| extension.handles(method))
            .map(|extension| self.deliver(extension.clone(), method, args));
        Some(join_all(calls).await)
    }

    async fn deliver(
        &self,
        extension: Arc<dyn Extension>,
        method: ExtensionMethod,
        args: &Value,
    ) -> DeliveryReport {
        let name = extension.name().to_string();

        if let Some(blocked) = self.blocklist.iter().find(|b| b.matches(&name)) {
            let message = format!(
                "Blocked extension '{name}' method '{method}' for draekz because: {}",
                blocked.reason
            );
            let warned = self.throttle.should_log(LogLevel::Warn, &message);
            if warned {
                tracing::warn!("{message}");
            }
            return DeliveryReport {
                extension: name,
                delivery: Delivery::Blocked { warned },
            };
        }

        // The call itself may panic before handing back a future.
        let call = std::panic::catch_unwind(AssertUnwindSafe(|| extension.invoke(method, args)));
        let outcome = match call {
            Ok(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(panic) => Err(panic_message(panic.as_ref())),
            },
            Err(panic) => Err(panic_message(panic.as_ref())),
        };

        let delivery = match outcome {
            Ok(()) => Delivery::Completed,
            Err(error) => {
                tracing::error!(
                    extension = %name,
                    %method,
                    args = %args,
                    error = %error,
                    "Error calling extension method for draekz node"
                );
                Delivery::Failed(error)
            }
        };
        DeliveryReport {
            extension: name,
            delivery,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "extension panicked".to_string())
}
