//! Workflow graph model and the capability traits the link checker depends on.
//!
//! The host owns the real graph objects. Anything that can answer the
//! [`GraphLike`] questions can be checked, and anything that also implements
//! [`GraphRepair`] can be fixed. [`WorkflowGraph`] is the adapter for the
//! serialized LiteGraph workflow JSON the host produces.

use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub type NodeId = i64;
pub type LinkId = i64;

/// Read access to a link record in the flat link table.
///
/// Slots are signed so malformed input (negative indices) is representable
/// and reported instead of rejected.
pub trait LinkLike {
    fn id(&self) -> LinkId;
    fn origin_id(&self) -> NodeId;
    fn origin_slot(&self) -> i64;
    fn target_id(&self) -> NodeId;
    fn target_slot(&self) -> i64;
}

/// Read access to a node's ports.
pub trait NodeLike {
    fn id(&self) -> NodeId;
    fn input_count(&self) -> usize;
    fn input_link(&self, slot: usize) -> Option<LinkId>;
    fn output_count(&self) -> usize;
    fn output_links(&self, slot: usize) -> &[LinkId];
}

/// Read access to a whole graph.
pub trait GraphLike {
    type Node: NodeLike;
    type Link: LinkLike;

    fn nodes(&self) -> impl Iterator<Item = &Self::Node> + '_;
    fn links(&self) -> impl Iterator<Item = &Self::Link> + '_;
}

/// Write access used by the fixer. Nodes are addressed by their position in
/// [`GraphLike::nodes`], links by their position in [`GraphLike::links`].
pub trait GraphRepair: GraphLike + Clone {
    fn set_input_link(&mut self, node_index: usize, slot: usize, link: Option<LinkId>);
    fn set_output_links(&mut self, node_index: usize, slot: usize, links: Vec<LinkId>);
    fn set_link_endpoints(
        &mut self,
        link_index: usize,
        origin: (NodeId, usize),
        target: (NodeId, usize),
    );
    /// Keeps only the links whose table position is in `keep` (sorted ascending).
    fn retain_links(&mut self, keep: &[usize]);
}

/// A serialized workflow as produced by the host's `graph.serialize()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub links: Vec<WorkflowLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    #[serde(default)]
    pub outputs: Vec<NodeOutput>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    #[serde(default)]
    pub link: Option<LinkId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// The host writes `null` for outputs that were never connected.
    #[serde(default)]
    pub links: Option<Vec<LinkId>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A link table entry. Read from either the array or the object form, always
/// written back in the array form `[id, origin_id, origin_slot, target_id, target_slot, type]`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowLink {
    pub id: LinkId,
    pub origin_id: NodeId,
    pub origin_slot: i64,
    pub target_id: NodeId,
    pub target_slot: i64,
    pub link_type: Value,
}

impl WorkflowGraph {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[inline]
    #[must_use]
    pub fn link(&self, id: LinkId) -> Option<&WorkflowLink> {
        self.links.iter().find(|l| l.id == id)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }
}

impl WorkflowNode {
    #[must_use]
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, node_type: &str) -> Self {
        self.node_type = Some(node_type.to_string());
        self
    }

    #[must_use]
    pub fn with_input(mut self, link: Option<LinkId>) -> Self {
        self.inputs.push(NodeInput {
            link,
            extra: Map::new(),
        });
        self
    }

    #[must_use]
    pub fn with_output(mut self, links: Vec<LinkId>) -> Self {
        self.outputs.push(NodeOutput {
            links: Some(links),
            extra: Map::new(),
        });
        self
    }
}

impl WorkflowLink {
    #[must_use]
    pub fn new(id: LinkId, origin: (NodeId, i64), target: (NodeId, i64)) -> Self {
        Self {
            id,
            origin_id: origin.0,
            origin_slot: origin.1,
            target_id: target.0,
            target_slot: target.1,
            link_type: Value::String("*".to_string()),
        }
    }
}

impl LinkLike for WorkflowLink {
    fn id(&self) -> LinkId {
        self.id
    }

    fn origin_id(&self) -> NodeId {
        self.origin_id
    }

    fn origin_slot(&self) -> i64 {
        self.origin_slot
    }

    fn target_id(&self) -> NodeId {
        self.target_id
    }

    fn target_slot(&self) -> i64 {
        self.target_slot
    }
}

impl NodeLike for WorkflowNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn input_link(&self, slot: usize) -> Option<LinkId> {
        self.inputs.get(slot).and_then(|i| i.link)
    }

    fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn output_links(&self, slot: usize) -> &[LinkId] {
        self.outputs
            .get(slot)
            .and_then(|o| o.links.as_deref())
            .unwrap_or(&[])
    }
}

impl GraphLike for WorkflowGraph {
    type Node = WorkflowNode;
    type Link = WorkflowLink;

    fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> + '_ {
        self.nodes.iter()
    }

    fn links(&self) -> impl Iterator<Item = &WorkflowLink> + '_ {
        self.links.iter()
    }
}

impl GraphRepair for WorkflowGraph {
    fn set_input_link(&mut self, node_index: usize, slot: usize, link: Option<LinkId>) {
        if let Some(input) = self
            .nodes
            .get_mut(node_index)
            .and_then(|n| n.inputs.get_mut(slot))
        {
            input.link = link;
        }
    }

    fn set_output_links(&mut self, node_index: usize, slot: usize, links: Vec<LinkId>) {
        if let Some(output) = self
            .nodes
            .get_mut(node_index)
            .and_then(|n| n.outputs.get_mut(slot))
        {
            output.links = Some(links);
        }
    }

    fn set_link_endpoints(
        &mut self,
        link_index: usize,
        origin: (NodeId, usize),
        target: (NodeId, usize),
    ) {
        if let Some(link) = self.links.get_mut(link_index) {
            link.origin_id = origin.0;
            link.origin_slot = origin.1 as i64;
            link.target_id = target.0;
            link.target_slot = target.1 as i64;
        }
    }

    fn retain_links(&mut self, keep: &[usize]) {
        let mut position = 0;
        self.links.retain(|_| {
            let kept = keep.binary_search(&position).is_ok();
            position += 1;
            kept
        });
    }
}

impl Serialize for WorkflowLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(6)?;
        tuple.serialize_element(&self.id)?;
        tuple.serialize_element(&self.origin_id)?;
        tuple.serialize_element(&self.origin_slot)?;
        tuple.serialize_element(&self.target_id)?;
        tuple.serialize_element(&self.target_slot)?;
        tuple.serialize_element(&self.link_type)?;
        tuple.end()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLink {
    Array(Vec<Value>),
    Object {
        id: LinkId,
        origin_id: NodeId,
        origin_slot: i64,
        target_id: NodeId,
        target_slot: i64,
        #[serde(default, rename = "type")]
        link_type: Value,
    },
}

impl<'de> Deserialize<'de> for WorkflowLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawLink::deserialize(deserializer)? {
            RawLink::Object {
                id,
                origin_id,
                origin_slot,
                target_id,
                target_slot,
                link_type,
            } => Ok(Self {
                id,
                origin_id,
                origin_slot,
                target_id,
                target_slot,
                link_type,
            }),
            RawLink::Array(values) => {
                let int = |i: usize| {
                    values
                        .get(i)
                        .and_then(Value::as_i64)
                        .ok_or_else(|| D::Error::custom(format!("link array field {i} is not an integer")))
                };
                Ok(Self {
                    id: int(0)?,
                    origin_id: int(1)?,
                    origin_slot: int(2)?,
                    target_id: int(3)?,
                    target_slot: int(4)?,
                    link_type: values.get(5).cloned().unwrap_or(Value::Null),
                })
            }
        }
    }
}
