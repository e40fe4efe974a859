//! Layered adjacency storage.
//!
//! Vertices live in an append-only arena addressed by dense 32-bit ids, so
//! the graph can be cyclic without owning pointers and ids stay stable for
//! the life of the index. Each vertex keeps one outgoing neighbor list per
//! layer it appears in, individually locked: batch construction mutates
//! disjoint lists from many workers while concurrent searches read them.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Dense index into the vertex pool.
pub type NodeId = u32;

/// Per-layer out-degree cap: `2 * m` at layer 0, `m` above.
#[inline]
pub(crate) fn threshold_m(m: u32, layer: u32) -> u32 {
    if layer == 0 { m * 2 } else { m }
}

#[inline]
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A vertex: its level, its point, and one neighbor list per layer
/// `0..=level`. The point and level are immutable after creation; only the
/// neighbor lists change, and only under their locks.
pub(crate) struct Node<P> {
    pub level: u32,
    pub point: P,
    neighbors: Box<[RwLock<Vec<NodeId>>]>,
}

impl<P> Node<P> {
    pub fn new(level: u32, point: P) -> Self {
        let neighbors = (0..=level).map(|_| RwLock::new(Vec::new())).collect();
        Self {
            level,
            point,
            neighbors,
        }
    }

    pub fn with_neighbors(level: u32, point: P, lists: Vec<Vec<NodeId>>) -> Self {
        debug_assert_eq!(lists.len(), level as usize + 1);
        let neighbors = lists.into_iter().map(RwLock::new).collect();
        Self {
            level,
            point,
            neighbors,
        }
    }

    /// Shared access to the outgoing edges at `layer`.
    ///
    /// Callers must respect the level invariant: `layer <= self.level`.
    pub fn read_neighbors(&self, layer: u32) -> RwLockReadGuard<'_, Vec<NodeId>> {
        read_lock(&self.neighbors[layer as usize])
    }

    /// Exclusive access to the outgoing edges at `layer`.
    pub fn write_neighbors(&self, layer: u32) -> RwLockWriteGuard<'_, Vec<NodeId>> {
        write_lock(&self.neighbors[layer as usize])
    }
}

/// Append-only vertex pool plus the entrance set.
pub(crate) struct GraphStore<P> {
    nodes: Vec<Node<P>>,
    entrance: Vec<NodeId>,
}

impl<P> GraphStore<P> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            entrance: Vec::new(),
        }
    }

    pub fn from_parts(nodes: Vec<Node<P>>, entrance: Vec<NodeId>) -> Self {
        Self { nodes, entrance }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node<P> {
        &self.nodes[id as usize]
    }

    pub fn push(&mut self, node: Node<P>) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        id
    }

    pub fn extend(&mut self, nodes: impl IntoIterator<Item = Node<P>>) {
        self.nodes.extend(nodes);
    }

    pub fn nodes(&self) -> &[Node<P>] {
        &self.nodes
    }

    pub fn entrance(&self) -> &[NodeId] {
        &self.entrance
    }

    pub fn set_entrance(&mut self, entrance: Vec<NodeId>) {
        self.entrance = entrance;
    }

    pub fn push_entrance(&mut self, id: NodeId) {
        self.entrance.push(id);
    }

    /// Level of the entrance set, i.e. the graph height. Zero when empty.
    pub fn height(&self) -> u32 {
        self.entrance
            .first()
            .map(|&e| self.node(e).level)
            .unwrap_or(0)
    }

    /// Number of vertices appearing at `layer`.
    pub fn vertex_count(&self, layer: u32) -> usize {
        self.nodes.iter().filter(|n| n.level >= layer).count()
    }

    /// Sum of out-degrees at `layer`.
    pub fn degree_total(&self, layer: u32) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.level >= layer)
            .map(|n| n.read_neighbors(layer).len())
            .sum()
    }

    /// Largest out-degree at `layer`.
    pub fn degree_max(&self, layer: u32) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.level >= layer)
            .map(|n| n.read_neighbors(layer).len())
            .max()
            .unwrap_or(0)
    }
}
