//! Workflow link integrity checking and repair.
//!
//! A graph stores every connection twice: once in the flat link table and
//! once on the nodes (`inputs[slot].link` and `outputs[slot].links`). The
//! host's editing surface mutates nodes directly, so when the two disagree
//! the node side is treated as authoritative and the table is rebuilt from it.
//!
//! ```rust
//! use draekz_core::graph::{WorkflowGraph, WorkflowNode};
//! use draekz_core::link_fixer::{check, fix};
//!
//! let graph = WorkflowGraph {
//!     nodes: vec![WorkflowNode::new(1).with_output(vec![]), WorkflowNode::new(2).with_input(Some(5))],
//!     ..Default::default()
//! };
//! assert!(check(&graph).has_bad_links);
//! let fixed = fix(&graph);
//! assert!(!fixed.has_bad_links);
//! assert_eq!(fixed.graph.nodes[1].inputs[0].link, None);
//! ```

use crate::graph::{GraphLike, GraphRepair, LinkId, LinkLike, NodeId, NodeLike};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    DanglingInput,
    DanglingOutput,
    OrphanedLink,
    MismatchedEndpoint,
    MissingNode,
    DuplicateLink,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::DanglingInput => "DANGLING_INPUT",
            ViolationKind::DanglingOutput => "DANGLING_OUTPUT",
            ViolationKind::OrphanedLink => "ORPHANED_LINK",
            ViolationKind::MismatchedEndpoint => "MISMATCHED_ENDPOINT",
            ViolationKind::MissingNode => "MISSING_NODE",
            ViolationKind::DuplicateLink => "DUPLICATE_LINK",
        };
        f.write_str(name)
    }
}

/// A single inconsistency between the link table and node ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub link_id: LinkId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    #[serde(rename = "hasBadLinks")]
    pub has_bad_links: bool,
    pub details: Vec<Violation>,
}

impl CheckReport {
    fn from_details(details: Vec<Violation>) -> Self {
        Self {
            has_bad_links: !details.is_empty(),
            details,
        }
    }

    #[must_use]
    pub fn count(&self, kind: ViolationKind) -> usize {
        self.details.iter().filter(|v| v.kind == kind).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult<G> {
    pub graph: G,
    #[serde(rename = "hasBadLinks")]
    pub has_bad_links: bool,
    /// Violations found before repair.
    pub fixed: Vec<Violation>,
    /// Violations still present after repair.
    pub remaining: Vec<Violation>,
    /// Node slots or link records rewritten.
    pub patched: usize,
    /// Link records or node references removed.
    pub deleted: usize,
}

/// Holds a graph so it can be checked now and fixed later, the way a load
/// notification offers "fix in place" after the fact.
#[derive(Debug, Clone)]
pub struct LinkFixer<G> {
    graph: G,
}

impl<G: GraphRepair> LinkFixer<G> {
    pub fn new(graph: G) -> Self {
        Self { graph }
    }

    #[inline]
    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn check(&self) -> CheckReport {
        check(&self.graph)
    }

    pub fn fix(&self) -> FixResult<G> {
        fix(&self.graph)
    }
}

/// Checks a graph without modifying it. Never panics on malformed input.
pub fn check<G: GraphLike>(graph: &G) -> CheckReport {
    let model = Model::from_graph(graph);
    CheckReport::from_details(model.violations())
}

/// Returns a repaired copy of `graph`; the argument is never modified.
pub fn fix<G: GraphRepair>(graph: &G) -> FixResult<G> {
    let original = Model::from_graph(graph);
    let fixed = original.violations();

    let mut model = original.clone();
    let mut stats = RepairStats::default();
    model.repair(&mut stats);
    let remaining = model.violations();

    let mut repaired = graph.clone();
    model.apply(&original, &mut repaired);

    if !fixed.is_empty() {
        tracing::debug!(
            found = fixed.len(),
            remaining = remaining.len(),
            patched = stats.patched,
            deleted = stats.deleted,
            "Repaired workflow links"
        );
    }

    FixResult {
        graph: repaired,
        has_bad_links: !remaining.is_empty(),
        fixed,
        remaining,
        patched: stats.patched,
        deleted: stats.deleted,
    }
}

#[derive(Default)]
struct RepairStats {
    patched: usize,
    deleted: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct NodePorts {
    id: NodeId,
    inputs: Vec<Option<LinkId>>,
    outputs: Vec<Vec<LinkId>>,
}

#[derive(Debug, Clone, PartialEq)]
struct LinkRecord {
    /// Position in the host's link table.
    position: usize,
    id: LinkId,
    origin_id: NodeId,
    origin_slot: i64,
    target_id: NodeId,
    target_slot: i64,
}

/// Owned, index-friendly copy of the parts of a graph the checker reads.
#[derive(Debug, Clone)]
struct Model {
    nodes: Vec<NodePorts>,
    node_index: AHashMap<NodeId, usize>,
    /// First occurrence of each link id, in table order.
    links: Vec<LinkRecord>,
    duplicates: Vec<LinkRecord>,
}

fn slot_index(slot: i64, len: usize) -> Option<usize> {
    usize::try_from(slot).ok().filter(|s| *s < len)
}

impl Model {
    fn from_graph<G: GraphLike>(graph: &G) -> Self {
        let mut nodes = Vec::new();
        let mut node_index = AHashMap::new();
        for (position, node) in graph.nodes().enumerate() {
            node_index.entry(node.id()).or_insert(position);
            nodes.push(NodePorts {
                id: node.id(),
                inputs: (0..node.input_count()).map(|s| node.input_link(s)).collect(),
                outputs: (0..node.output_count())
                    .map(|s| node.output_links(s).to_vec())
                    .collect(),
            });
        }

        let mut seen = AHashSet::new();
        let mut links = Vec::new();
        let mut duplicates = Vec::new();
        for (position, link) in graph.links().enumerate() {
            let record = LinkRecord {
                position,
                id: link.id(),
                origin_id: link.origin_id(),
                origin_slot: link.origin_slot(),
                target_id: link.target_id(),
                target_slot: link.target_slot(),
            };
            if seen.insert(record.id) {
                links.push(record);
            } else {
                duplicates.push(record);
            }
        }

        Self {
            nodes,
            node_index,
            links,
            duplicates,
        }
    }

    fn node(&self, id: NodeId) -> Option<&NodePorts> {
        self.node_index.get(&id).map(|i| &self.nodes[*i])
    }

    fn link_ids(&self) -> AHashSet<LinkId> {
        self.links.iter().map(|l| l.id).collect()
    }

    fn violations(&self) -> Vec<Violation> {
        let table: AHashMap<LinkId, &LinkRecord> = self.links.iter().map(|l| (l.id, l)).collect();
        let mut dangling_inputs = Vec::new();
        let mut dangling_outputs = Vec::new();
        let mut orphaned = Vec::new();
        let mut mismatched = Vec::new();
        let mut missing = Vec::new();

        for node in &self.nodes {
            for (slot, link) in node.inputs.iter().enumerate() {
                let Some(link) = *link else { continue };
                match table.get(&link) {
                    None => dangling_inputs.push(Violation {
                        kind: ViolationKind::DanglingInput,
                        link_id: link,
                        node_id: Some(node.id),
                        slot: Some(slot as i64),
                        message: format!("node {} input {slot} references missing link {link}", node.id),
                    }),
                    Some(record)
                        if record.target_id != node.id || record.target_slot != slot as i64 =>
                    {
                        mismatched.push(Violation {
                            kind: ViolationKind::MismatchedEndpoint,
                            link_id: link,
                            node_id: Some(node.id),
                            slot: Some(slot as i64),
                            message: format!(
                                "node {} input {slot} references link {link}, which targets node {} slot {}",
                                node.id, record.target_id, record.target_slot
                            ),
                        });
                    }
                    Some(_) => {}
                }
            }
            for (slot, links) in node.outputs.iter().enumerate() {
                for &link in links {
                    match table.get(&link) {
                        None => dangling_outputs.push(Violation {
                            kind: ViolationKind::DanglingOutput,
                            link_id: link,
                            node_id: Some(node.id),
                            slot: Some(slot as i64),
                            message: format!("node {} output {slot} lists missing link {link}", node.id),
                        }),
                        Some(record)
                            if record.origin_id != node.id || record.origin_slot != slot as i64 =>
                        {
                            mismatched.push(Violation {
                                kind: ViolationKind::MismatchedEndpoint,
                                link_id: link,
                                node_id: Some(node.id),
                                slot: Some(slot as i64),
                                message: format!(
                                    "node {} output {slot} lists link {link}, which originates at node {} slot {}",
                                    node.id, record.origin_id, record.origin_slot
                                ),
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        for link in &self.links {
            let (Some(origin), Some(target)) = (self.node(link.origin_id), self.node(link.target_id))
            else {
                let absent = if self.node(link.origin_id).is_none() {
                    link.origin_id
                } else {
                    link.target_id
                };
                missing.push(Violation {
                    kind: ViolationKind::MissingNode,
                    link_id: link.id,
                    node_id: Some(absent),
                    slot: None,
                    message: format!("link {} references missing node {absent}", link.id),
                });
                continue;
            };

            let target_refs = target.inputs.contains(&Some(link.id));
            let origin_refs = origin.outputs.iter().any(|links| links.contains(&link.id));
            if !target_refs && !origin_refs {
                orphaned.push(Violation {
                    kind: ViolationKind::OrphanedLink,
                    link_id: link.id,
                    node_id: None,
                    slot: None,
                    message: format!("link {} is not referenced by either endpoint", link.id),
                });
                continue;
            }

            let target_ok = slot_index(link.target_slot, target.inputs.len())
                .is_some_and(|s| target.inputs[s] == Some(link.id));
            if !target_ok {
                mismatched.push(Violation {
                    kind: ViolationKind::MismatchedEndpoint,
                    link_id: link.id,
                    node_id: Some(link.target_id),
                    slot: Some(link.target_slot),
                    message: format!(
                        "link {} targets node {} input {}, which does not reference it",
                        link.id, link.target_id, link.target_slot
                    ),
                });
            }
            let origin_ok = slot_index(link.origin_slot, origin.outputs.len())
                .is_some_and(|s| origin.outputs[s].contains(&link.id));
            if !origin_ok {
                mismatched.push(Violation {
                    kind: ViolationKind::MismatchedEndpoint,
                    link_id: link.id,
                    node_id: Some(link.origin_id),
                    slot: Some(link.origin_slot),
                    message: format!(
                        "link {} originates at node {} output {}, which does not list it",
                        link.id, link.origin_id, link.origin_slot
                    ),
                });
            }
        }

        let duplicates = self.duplicates.iter().map(|link| Violation {
            kind: ViolationKind::DuplicateLink,
            link_id: link.id,
            node_id: None,
            slot: None,
            message: format!("link {} appears more than once in the link table", link.id),
        });

        let mut details = dangling_inputs;
        details.extend(dangling_outputs);
        details.extend(orphaned);
        details.extend(mismatched);
        details.extend(missing);
        details.extend(duplicates);
        details
    }

    fn remove_node_refs(&mut self, link: LinkId) {
        for node in &mut self.nodes {
            for input in node.inputs.iter_mut().filter(|i| **i == Some(link)) {
                *input = None;
            }
            for links in &mut node.outputs {
                links.retain(|l| *l != link);
            }
        }
    }

    fn repair(&mut self, stats: &mut RepairStats) {
        stats.deleted += self.duplicates.len();
        self.duplicates.clear();

        // Dangling references and repeated ids within one output slot.
        let known = self.link_ids();
        for node in &mut self.nodes {
            for input in &mut node.inputs {
                if input.is_some_and(|l| !known.contains(&l)) {
                    *input = None;
                    stats.deleted += 1;
                }
            }
            for links in &mut node.outputs {
                let before = links.len();
                let mut seen = AHashSet::new();
                links.retain(|l| known.contains(l) && seen.insert(*l));
                stats.deleted += before - links.len();
            }
        }

        // Links with a missing endpoint node.
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.links)
            .into_iter()
            .partition(|l| {
                self.node_index.contains_key(&l.origin_id) && self.node_index.contains_key(&l.target_id)
            });
        self.links = kept;
        for link in dropped {
            self.remove_node_refs(link.id);
            stats.deleted += 1;
        }

        // Reconcile the rest against node-side claims.
        let mut survivors = Vec::with_capacity(self.links.len());
        for mut link in std::mem::take(&mut self.links) {
            let target = self.resolve_target_claim(&link, stats);
            let origin = self.resolve_origin_claim(&link, stats);
            let endpoints = match (origin, target) {
                (Some(origin), Some(target)) => Some((origin, target)),
                (None, Some(target)) => {
                    let origin_node = self.node_index[&link.origin_id];
                    match slot_index(link.origin_slot, self.nodes[origin_node].outputs.len()) {
                        Some(slot) => {
                            self.nodes[origin_node].outputs[slot].push(link.id);
                            stats.patched += 1;
                            Some(((origin_node, slot), target))
                        }
                        None => {
                            self.nodes[target.0].inputs[target.1] = None;
                            None
                        }
                    }
                }
                (Some(origin), None) => {
                    let target_node = self.node_index[&link.target_id];
                    let free = slot_index(link.target_slot, self.nodes[target_node].inputs.len())
                        .filter(|s| self.nodes[target_node].inputs[*s].is_none());
                    match free {
                        Some(slot) => {
                            self.nodes[target_node].inputs[slot] = Some(link.id);
                            stats.patched += 1;
                            Some((origin, (target_node, slot)))
                        }
                        None => {
                            self.nodes[origin.0].outputs[origin.1].retain(|l| *l != link.id);
                            None
                        }
                    }
                }
                (None, None) => None,
            };

            let Some(((origin_node, origin_slot), (target_node, target_slot))) = endpoints else {
                stats.deleted += 1;
                continue;
            };
            let origin_id = self.nodes[origin_node].id;
            let target_id = self.nodes[target_node].id;
            if link.origin_id != origin_id
                || link.origin_slot != origin_slot as i64
                || link.target_id != target_id
                || link.target_slot != target_slot as i64
            {
                link.origin_id = origin_id;
                link.origin_slot = origin_slot as i64;
                link.target_id = target_id;
                link.target_slot = target_slot as i64;
                stats.patched += 1;
            }
            survivors.push(link);
        }
        self.links = survivors;
    }

    /// Picks the single input slot that owns `link`, clearing competing claims.
    /// The claim matching the link record wins, otherwise the first in node order.
    fn resolve_target_claim(&mut self, link: &LinkRecord, stats: &mut RepairStats) -> Option<(usize, usize)> {
        let claims: Vec<(usize, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(n, node)| {
                node.inputs
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| **l == Some(link.id))
                    .map(move |(s, _)| (n, s))
            })
            .collect();
        let chosen = claims
            .iter()
            .copied()
            .find(|(n, s)| self.nodes[*n].id == link.target_id && *s as i64 == link.target_slot)
            .or_else(|| claims.first().copied())?;
        for &(n, s) in claims.iter().filter(|c| **c != chosen) {
            self.nodes[n].inputs[s] = None;
            stats.deleted += 1;
        }
        Some(chosen)
    }

    /// Picks the single output slot that lists `link`, removing it from the others.
    fn resolve_origin_claim(&mut self, link: &LinkRecord, stats: &mut RepairStats) -> Option<(usize, usize)> {
        let claims: Vec<(usize, usize)> = self
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(n, node)| {
                node.outputs
                    .iter()
                    .enumerate()
                    .filter(|(_, links)| links.contains(&link.id))
                    .map(move |(s, _)| (n, s))
            })
            .collect();
        let chosen = claims
            .iter()
            .copied()
            .find(|(n, s)| self.nodes[*n].id == link.origin_id && *s as i64 == link.origin_slot)
            .or_else(|| claims.first().copied())?;
        for &(n, s) in claims.iter().filter(|c| **c != chosen) {
            self.nodes[n].outputs[s].retain(|l| *l != link.id);
            stats.deleted += 1;
        }
        Some(chosen)
    }

    /// Writes the differences between `original` and `self` into `graph`.
    fn apply<G: GraphRepair>(&self, original: &Model, graph: &mut G) {
        for (index, (now, before)) in self.nodes.iter().zip(&original.nodes).enumerate() {
            for (slot, (link, old)) in now.inputs.iter().zip(&before.inputs).enumerate() {
                if link != old {
                    graph.set_input_link(index, slot, *link);
                }
            }
            for (slot, (links, old)) in now.outputs.iter().zip(&before.outputs).enumerate() {
                if links != old {
                    graph.set_output_links(index, slot, links.clone());
                }
            }
        }

        let before: AHashMap<usize, &LinkRecord> =
            original.links.iter().map(|l| (l.position, l)).collect();
        for link in &self.links {
            let unchanged = before.get(&link.position).is_some_and(|old| *old == link);
            if !unchanged {
                graph.set_link_endpoints(
                    link.position,
                    (link.origin_id, link.origin_slot as usize),
                    (link.target_id, link.target_slot as usize),
                );
            }
        }

        let total = original.links.len() + original.duplicates.len();
        let keep: Vec<usize> = self.links.iter().map(|l| l.position).collect();
        if keep.len() != total {
            let mut keep = keep;
            keep.sort_unstable();
            graph.retain_links(&keep);
        }
    }
}
