//! # Draekz Core
//!
//! Host-independent core of the draekz node-graph editor extension.
//!
//! This crate provides:
//!
//! - [`link_fixer`] - Workflow link integrity checking and repair
//! - [`Draekz`] - The facade that wraps host operations and keeps their transient state
//! - [`HookRegistry`] - Originals and wrappers for every intercepted host operation
//! - [`selective`] - Restricting a queued prompt to chosen output nodes
//! - [`ExtensionInvoker`] - Fault-isolated fan-out to third-party extensions
//! - [`MessageCenter`], [`LinkMonitor`], [`menu`] - State models behind the UI surface
//!
//! ## Example
//!
//! ```rust
//! use draekz_core::{check, fix, WorkflowGraph};
//!
//! let graph = WorkflowGraph::from_json(
//!     r#"{"nodes": [{"id": 1, "outputs": [{"links": [1]}]}, {"id": 2, "inputs": [{"link": 1}]}],
//!         "links": [[1, 1, 0, 2, 0, "MODEL"], [2, 1, 0, 99, 0, "MODEL"]]}"#,
//! )
//! .unwrap();
//!
//! let report = check(&graph);
//! assert!(report.has_bad_links);
//!
//! let fixed = fix(&graph);
//! assert!(!fixed.has_bad_links);
//! assert_eq!(fixed.graph.links.len(), 1);
//! ```

pub mod config;
pub mod draekz;
pub mod error;
pub mod events;
pub mod extensions;
pub mod graph;
pub mod hooks;
pub mod link_fixer;
pub mod log_level;
pub mod menu;
pub mod messages;
pub mod monitor;
pub mod selective;
pub mod state;
pub mod throttle;

pub use config::ConfigSource;
pub use draekz::{ApiJsonLoad, ApiQueueRequest, Draekz, DraekzOptions, FixedInPlace, QueueRequest};
pub use error::{Error, Result};
pub use events::{EventBus, HookEvent, SubscriptionId};
pub use extensions::{BlockedExtension, Extension, ExtensionInvoker, ExtensionMethod};
pub use graph::{
    GraphLike, GraphRepair, LinkId, LinkLike, NodeId, NodeLike, WorkflowGraph, WorkflowLink,
    WorkflowNode,
};
pub use hooks::{AsyncOp, CanvasPoint, HookRegistry, MouseEvent, Operation, SyncOp};
pub use link_fixer::{check, fix, CheckReport, FixResult, LinkFixer, Violation, ViolationKind};
pub use log_level::LogLevel;
pub use messages::{MessageAction, MessageCenter, MessageType, UiMessage};
pub use monitor::{LinkMonitor, MonitorOutcome};
pub use selective::{ApiNode, ApiPrompt};
pub use state::{HookFlags, HookState};
pub use throttle::LogThrottle;
