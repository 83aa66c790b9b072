//! # draekz
//!
//! The host-independent core of the draekz node-graph editor extension.
//!
//! draekz keeps workflow graphs consistent, wraps the host's operations with
//! extra behavior, and serves the extension's configuration.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! draekz --config-dir ./config --http-port 8189 serve
//! ```
//!
//! ### Checking a Workflow
//!
//! ```bash
//! draekz check workflow.json
//! draekz fix workflow.json --output fixed.json
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use draekz::prelude::*;
//!
//! let graph = WorkflowGraph::from_json(
//!     r#"{"nodes": [{"id": 2, "inputs": [{"link": 5}]}], "links": []}"#,
//! )
//! .unwrap();
//!
//! let report = check(&graph);
//! assert_eq!(report.count(ViolationKind::DanglingInput), 1);
//!
//! let fixed = fix(&graph);
//! assert!(!fixed.has_bad_links);
//! ```
//!
//! ## Crate Structure
//!
//! - [`draekz-core`](draekz_core) - Graph model, link checker/fixer, hook layer, selective queue
//! - [`draekz-storage`](draekz_storage) - Config store, user config file, model info cache
//! - [`draekz-api`](draekz_api) - REST routes

// Re-export core types
pub use draekz_core::{
    check, fix, ApiPrompt, CheckReport, Draekz, DraekzOptions, Error, EventBus, FixResult,
    HookEvent, HookRegistry, HookState, LinkFixer, LogLevel, MessageCenter, Operation, Result,
    Violation, ViolationKind, WorkflowGraph, WorkflowLink, WorkflowNode,
};

// Re-export storage
pub use draekz_storage::{
    ConfigStore, ModelInfo, ModelInfoService, ModelInfoType, StorageError, UserConfigFile,
};

// Re-export API
pub use draekz_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        check, fix, ApiPrompt, CheckReport, ConfigStore, Draekz, DraekzOptions, Error, EventBus,
        FixResult, HookEvent, LinkFixer, ModelInfoService, ModelInfoType, Result, RestApi,
        UserConfigFile, Violation, ViolationKind, WorkflowGraph,
    };
    pub use draekz_core::ConfigSource;
}
