//! paths.rs - Closed-loop waypoint path topology and derived curves.
//!
//! This module owns the canonical node sequences and nothing else; all
//! editing goes through the coordinator and all derived geometry hangs off
//! the visualization side.
//!
//! # Invariants
//! - Ids are monotonically increasing and never reused
//! - Node order in a container is loop order; "next" is index + 1 mod count
//! - The derived curve is `None` or matches the current node topology; any
//!   topology or position mutation drops it until `rebuild_curve` runs

use crate::paths::path_structs::{IdAllocator, NodeId, PathId};
use crate::paths::spline::{PathSpline, NUM_BACKTRACK_POINTS};
use glam::{Quat, Vec3};

/// Ceiling for node target speeds, engine defined.
pub const MAX_TARGET_SPEED: i32 = 200;

/// Fewest nodes a loop needs before a curve is derived for it.
pub const MIN_COMPLETE_NODES: usize = 3;

/// A single waypoint on a path: position, facing and the speed vehicles aim
/// for when passing it.
#[derive(Debug, Clone)]
pub struct PathNode {
    id: NodeId,
    position: Vec3,
    rotation: Quat,
    target_speed: i32,
}

impl PathNode {
    pub fn new(id: NodeId, position: Vec3, rotation: Quat, target_speed: i32) -> Self {
        Self {
            id,
            position,
            rotation,
            target_speed: target_speed.clamp(0, MAX_TARGET_SPEED),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn target_speed(&self) -> i32 {
        self.target_speed
    }
}

/// Ordered cyclic collection of waypoint nodes plus the curve derived from
/// them. Nodes are exclusively owned by their container.
pub struct PathContainer {
    id: PathId,
    name: String,
    nodes: Vec<PathNode>,
    /// Derived count, recomputed on demand. Zero means "no data yet"; on
    /// proxies the replication layer decides when to derive it.
    node_count: usize,
    spline: Option<PathSpline>,
}

impl PathContainer {
    pub fn new(id: PathId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            nodes: Vec::new(),
            node_count: 0,
            spline: None,
        }
    }

    #[inline]
    pub fn id(&self) -> PathId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn nodes(&self) -> &[PathNode] {
        &self.nodes
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// The readiness predicate: enough nodes to form a meaningful loop.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.nodes.len() >= MIN_COMPLETE_NODES
    }

    #[inline]
    pub fn has_data(&self) -> bool {
        self.node_count > 0
    }

    #[inline]
    pub fn path(&self) -> Option<&PathSpline> {
        self.spline.as_ref()
    }

    pub fn node(&self, id: NodeId) -> Option<&PathNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Successor in loop order; the last node's next is the first.
    pub fn next_of(&self, id: NodeId) -> Option<&PathNode> {
        let index = self.node_index(id)?;
        self.nodes.get((index + 1) % self.nodes.len())
    }

    /// Predecessor in loop order; the first node's previous is the last.
    pub fn prev_of(&self, id: NodeId) -> Option<&PathNode> {
        let index = self.node_index(id)?;
        self.nodes.get((index + self.nodes.len() - 1) % self.nodes.len())
    }

    /// Re-derive the cached node count from the actual sequence.
    pub fn calculate_node_count(&mut self) {
        self.node_count = self.nodes.len();
    }

    /// Append a node at the end of the loop. Host-side path authoring and
    /// replication use this; the edit coordinator inserts mid-loop instead.
    pub fn push_node(&mut self, node: PathNode) {
        self.nodes.push(node);
        self.spline = None;
    }

    /// Insert a node immediately after an existing one. Returns false when
    /// the anchor node is unknown.
    pub fn insert_after(&mut self, after: NodeId, node: PathNode) -> bool {
        let Some(index) = self.node_index(after) else {
            return false;
        };
        self.nodes.insert(index + 1, node);
        self.spline = None;
        true
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<PathNode> {
        let index = self.node_index(id)?;
        self.spline = None;
        Some(self.nodes.remove(index))
    }

    pub fn set_node_transform(&mut self, id: NodeId, position: Vec3, rotation: Quat) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        node.position = position;
        node.rotation = rotation;
        self.spline = None;
        true
    }

    pub fn set_node_target_speed(&mut self, id: NodeId, target_speed: i32) -> bool {
        let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        node.target_speed = target_speed.clamp(0, MAX_TARGET_SPEED);
        true
    }

    /// Rebuild the derived curve from the current node sequence. Callers
    /// guard with `is_complete`/`has_data`; an incomplete loop clears it.
    pub fn rebuild_curve(&mut self) {
        self.spline = if self.is_complete() {
            let positions: Vec<Vec3> = self.nodes.iter().map(|n| n.position).collect();
            PathSpline::from_loop(&positions)
        } else {
            None
        };
    }

    /// Node that begins the segment containing the given curve point,
    /// compensating for the backtrack points at the head of the curve.
    pub fn node_at_curve_point(&self, point_index: usize) -> Option<NodeId> {
        let count = self.nodes.len();
        if count == 0 {
            return None;
        }

        // The curve prefixes the loop with its last NUM_BACKTRACK_POINTS
        // node positions, so point i sits on node (i - backtrack) mod count.
        let index = (point_index + count.saturating_sub(NUM_BACKTRACK_POINTS)) % count;
        Some(self.nodes[index].id)
    }
}

/// Owns every path container in the world plus the shared id allocator.
pub struct PathManager {
    paths: Vec<PathContainer>,
    allocator: IdAllocator,
}

impl PathManager {
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            allocator: IdAllocator::new(),
        }
    }

    pub fn create_path(&mut self, name: impl Into<String>) -> PathId {
        let id = self.allocator.alloc_path();
        self.paths.push(PathContainer::new(id, name));
        id
    }

    pub fn remove_path(&mut self, id: PathId) -> Option<PathContainer> {
        let index = self.paths.iter().position(|p| p.id() == id)?;
        Some(self.paths.remove(index))
    }

    #[inline]
    pub fn contains(&self, id: PathId) -> bool {
        self.paths.iter().any(|p| p.id() == id)
    }

    pub fn path(&self, id: PathId) -> Option<&PathContainer> {
        self.paths.iter().find(|p| p.id() == id)
    }

    pub fn path_mut(&mut self, id: PathId) -> Option<&mut PathContainer> {
        self.paths.iter_mut().find(|p| p.id() == id)
    }

    #[inline]
    pub fn paths(&self) -> &[PathContainer] {
        &self.paths
    }

    pub fn path_ids(&self) -> Vec<PathId> {
        self.paths.iter().map(|p| p.id()).collect()
    }

    pub fn alloc_node_id(&mut self) -> NodeId {
        self.allocator.alloc_node()
    }

    /// Reserve an externally assigned node id, for replicated content.
    pub fn reserve_node_id(&mut self, id: NodeId) {
        self.allocator.reserve_node(id);
    }
}

impl Default for PathManager {
    fn default() -> Self {
        Self::new()
    }
}
