//! Lazy cache graph.
//!
//! Every member map of every space (own cells, derived refs, merged
//! namespace, ...) is a [`LazyNode`] stored in one arena and addressed by
//! [`NodeId`]. A node holds a name → value map, a dirty flag and the handles
//! of the nodes it reads (`sources`) and of the nodes that read it
//! (`observers`).
//!
//! Invalidation is pushed eagerly through `observers`; recomputation is
//! pulled on read by the model, which knows how to rebuild each
//! [`NodeKind`].

use std::collections::BTreeMap;

use modelspace_common::{SpaceId, Value};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::space::MemberKind;

/// Handle of a node in the [`LazyGraph`] arena.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// What a node computes when it is read while dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Written directly by the model (own members, arguments, globals).
    Source,
    /// Ordered merge of its sources; later sources override earlier ones.
    Layered,
    /// Members of `kind` that `space` may inherit from its linearization.
    Inheritable { space: SpaceId, kind: MemberKind },
    /// Members of `kind` synthesized into `space` from its inheritable set.
    Derived { space: SpaceId, kind: MemberKind },
}

pub type NodeData = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LazyNode {
    pub kind: NodeKind,
    pub data: NodeData,
    pub dirty: bool,
    pub sources: SmallVec<[NodeId; 4]>,
    pub observers: SmallVec<[NodeId; 4]>,
}

/// Arena of lazy nodes. Removed nodes leave a tombstone so ids stay stable.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LazyGraph {
    nodes: Vec<Option<LazyNode>>,
}

impl LazyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node reading `sources`, registering it as their observer.
    /// Computed nodes start dirty, sources start clean.
    pub fn add_node(&mut self, kind: NodeKind, sources: &[NodeId]) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Some(LazyNode {
            kind,
            data: NodeData::new(),
            dirty: kind != NodeKind::Source,
            sources: SmallVec::new(),
            observers: SmallVec::new(),
        }));
        for &source in sources {
            self.add_observer(source, id);
        }
        id
    }

    pub fn add_source(&mut self, data: NodeData) -> NodeId {
        let id = self.add_node(NodeKind::Source, &[]);
        if let Some(node) = self.get_mut(id) {
            node.data = data;
        }
        id
    }

    /// Register `observer` as a dependent of `source`.
    pub fn add_observer(&mut self, source: NodeId, observer: NodeId) {
        if let Some(node) = self.get_mut(source) {
            if !node.observers.contains(&observer) {
                node.observers.push(observer);
            }
        }
        if let Some(node) = self.get_mut(observer) {
            if !node.sources.contains(&source) {
                node.sources.push(source);
            }
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&LazyNode> {
        self.nodes.get(id.as_index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut LazyNode> {
        self.nodes.get_mut(id.as_index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| n.dirty)
    }

    /// Current data of a node, without recomputing it.
    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.get(id).map(|n| &n.data)
    }

    pub fn sources(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        self.get(id).map(|n| n.sources.clone()).unwrap_or_default()
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.get(id).map(|n| n.kind)
    }

    /// Replace a node's data and clear its dirty flag.
    pub fn store(&mut self, id: NodeId, data: NodeData) {
        if let Some(node) = self.get_mut(id) {
            node.data = data;
            node.dirty = false;
        }
    }

    /// Mark `id` dirty and propagate to every transitive observer.
    ///
    /// With `skip_self` the node keeps its flag (its data was edited in
    /// place) while its observers are still invalidated. Returns every node
    /// visited, the starting node included.
    pub fn mark_dirty(&mut self, id: NodeId, skip_self: bool) -> Vec<NodeId> {
        let mut affected = FxHashSet::default();
        let mut order = Vec::new();
        let mut to_visit = vec![id];

        while let Some(current) = to_visit.pop() {
            if !affected.insert(current) {
                continue;
            }
            order.push(current);

            if let Some(node) = self.get_mut(current) {
                if !(skip_self && current == id) && node.kind != NodeKind::Source {
                    node.dirty = true;
                }
                to_visit.extend(node.observers.iter().copied());
            }
        }

        order
    }

    /// Unlink a node from the graph in both directions and tombstone it.
    pub fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id.as_index()).and_then(Option::take) else {
            return;
        };
        for source in node.sources {
            if let Some(src) = self.get_mut(source) {
                src.observers.retain(|o| *o != id);
            }
        }
        for observer in node.observers {
            if let Some(obs) = self.get_mut(observer) {
                obs.sources.retain(|s| *s != id);
            }
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
