//! Transient state the hook wrappers keep while a host operation runs.
//!
//! Every field has exactly one owning wrapper. Owners set a field through
//! [`HookState::scoped`], which returns a guard that restores the field when
//! dropped, so the state is cleared on normal return, on error, and while a
//! panic unwinds.

use crate::graph::{NodeId, WorkflowGraph};
use crate::hooks::CanvasPoint;
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookFlags {
    pub processing_mouse_down: bool,
    pub processing_queue: bool,
    pub loading_api_json: Option<Value>,
    pub replacing_reroute: Option<NodeId>,
    pub copying_to_clipboard: bool,
    pub copying_multiple_nodes: bool,
    pub last_canvas_mouse: Option<CanvasPoint>,
    pub queue_node_ids: Option<Vec<NodeId>>,
}

#[derive(Debug, Default)]
pub struct HookState {
    flags: Mutex<HookFlags>,
    serialized_workflow: Mutex<Option<WorkflowGraph>>,
}

impl HookState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the current flags.
    pub fn snapshot(&self) -> HookFlags {
        self.flags.lock().clone()
    }

    pub fn update<F: FnOnce(&mut HookFlags)>(&self, f: F) {
        f(&mut self.flags.lock());
    }

    /// Applies `enter` now and `exit` when the returned guard drops.
    pub fn scoped<'a, E>(&'a self, enter: impl FnOnce(&mut HookFlags), exit: E) -> ScopeGuard<'a, E>
    where
        E: FnOnce(&mut HookFlags),
    {
        self.update(enter);
        ScopeGuard {
            state: self,
            exit: Some(exit),
        }
    }

    #[inline]
    pub fn is_processing_mouse_down(&self) -> bool {
        self.flags.lock().processing_mouse_down
    }

    #[inline]
    pub fn is_processing_queue(&self) -> bool {
        self.flags.lock().processing_queue
    }

    #[inline]
    pub fn is_loading_api_json(&self) -> bool {
        self.flags.lock().loading_api_json.is_some()
    }

    #[inline]
    pub fn replacing_reroute(&self) -> Option<NodeId> {
        self.flags.lock().replacing_reroute
    }

    #[inline]
    pub fn is_copying_to_clipboard(&self) -> bool {
        self.flags.lock().copying_to_clipboard
    }

    #[inline]
    pub fn is_copying_multiple_nodes(&self) -> bool {
        self.flags.lock().copying_multiple_nodes
    }

    #[inline]
    pub fn last_canvas_mouse(&self) -> Option<CanvasPoint> {
        self.flags.lock().last_canvas_mouse
    }

    #[inline]
    pub fn queue_node_ids(&self) -> Option<Vec<NodeId>> {
        self.flags.lock().queue_node_ids.clone()
    }

    pub fn set_serialized_workflow(&self, workflow: WorkflowGraph) {
        *self.serialized_workflow.lock() = Some(workflow);
    }

    pub fn serialized_workflow(&self) -> Option<WorkflowGraph> {
        self.serialized_workflow.lock().clone()
    }

    pub fn with_serialized_workflow<R>(&self, f: impl FnOnce(Option<&WorkflowGraph>) -> R) -> R {
        f(self.serialized_workflow.lock().as_ref())
    }
}

/// Runs the exit half of a [`HookState::scoped`] pair when dropped.
#[must_use = "the state is restored as soon as the guard drops"]
pub struct ScopeGuard<'a, E: FnOnce(&mut HookFlags)> {
    state: &'a HookState,
    exit: Option<E>,
}

impl<E: FnOnce(&mut HookFlags)> Drop for ScopeGuard<'_, E> {
    fn drop(&mut self) {
        if let Some(exit) = self.exit.take() {
            self.state.update(exit);
        }
    }
}

/// Runs a closure when dropped. Used where cleanup is more than a flag reset.
#[must_use = "the closure runs as soon as the guard drops"]
pub struct OnExit<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnExit<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnExit<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn test_scoped_flag_cleared_on_return() {
        let state = HookState::new();
        {
            let _guard = state.scoped(|f| f.processing_queue = true, |f| f.processing_queue = false);
            assert!(state.is_processing_queue());
        }
        assert!(!state.is_processing_queue());
    }

    #[test]
    fn test_scoped_flag_cleared_on_panic() {
        let state = HookState::new();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _guard = state.scoped(
                |f| f.replacing_reroute = Some(4),
                |f| f.replacing_reroute = None,
            );
            panic!("host failure");
        }));
        assert!(result.is_err());
        assert_eq!(state.replacing_reroute(), None);
    }

    #[test]
    fn test_on_exit_runs_once() {
        let count = std::cell::Cell::new(0);
        {
            let _exit = OnExit::new(|| count.set(count.get() + 1));
        }
        assert_eq!(count.get(), 1);
    }
}
