//! Selective queueing: trimming an API prompt down to chosen output nodes
//! and everything they depend on.

use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// One node of the host's API prompt format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiNode {
    /// Ids of nodes this node reads from. Linked inputs are `[node_id, slot]`,
    /// where the id may be written as a string or a number.
    pub fn upstream_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.inputs.values().filter_map(|value| match value.as_array()?.as_slice() {
            [Value::String(id), slot] if slot.is_i64() || slot.is_u64() => Some(id.clone()),
            [Value::Number(id), slot] if slot.is_i64() || slot.is_u64() => Some(id.to_string()),
            _ => None,
        })
    }
}

pub type ApiOutput = BTreeMap<String, ApiNode>;

/// The body the host sends to its queue endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiPrompt {
    #[serde(default)]
    pub output: ApiOutput,
    #[serde(default)]
    pub workflow: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Returns the designated nodes plus every node reachable backwards through
/// their inputs. Ids absent from `output` are skipped.
pub fn input_closure(output: &ApiOutput, node_ids: &[NodeId]) -> ApiOutput {
    let mut visited = BTreeSet::new();
    let mut stack: Vec<String> = node_ids.iter().rev().map(ToString::to_string).collect();
    let mut closure = ApiOutput::new();

    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(node) = output.get(&id) else {
            tracing::debug!(node_id = %id, "Queued node missing from prompt output, skipping");
            continue;
        };
        stack.extend(node.upstream_ids().filter(|upstream| !visited.contains(upstream)));
        closure.insert(id, node.clone());
    }
    closure
}

impl ApiPrompt {
    /// Restricts `output` to `node_ids` and their dependencies. An empty
    /// selection or empty output leaves the prompt untouched.
    pub fn retain_outputs(&mut self, node_ids: &[NodeId]) {
        if node_ids.is_empty() || self.output.is_empty() {
            return;
        }
        self.output = input_closure(&self.output, node_ids);
    }
}
