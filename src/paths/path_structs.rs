use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable, monotonically increasing path container identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PathId(pub u32);

impl PathId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for PathId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<PathId> for u32 {
    #[inline]
    fn from(id: PathId) -> Self {
        id.0
    }
}

/// Stable, monotonically increasing waypoint node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u32 {
    #[inline]
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// Identifier of an observer (a connected viewer) registered with the
/// subsystem. Doubles as the routing id for remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ObserverId(pub u32);

impl ObserverId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// The two independent per-segment visualization bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PathVisualizationFlags: u8 {
        /// Renderable curve primitive along the segment.
        const VISUALIZATION = 1 << 0;
        /// Box collision volumes for picking the segment.
        const COLLISION = 1 << 1;
    }
}

impl PathVisualizationFlags {
    pub const ALL_TYPES: [PathVisualizationFlags; 2] =
        [PathVisualizationFlags::VISUALIZATION, PathVisualizationFlags::COLLISION];
}

/// Identity of one segment across the whole subsystem: the owning path plus
/// the segment's index in that path's node sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub path: PathId,
    pub segment_index: u32,
}

/// Result of tracing the screen against a path visualization: the node that
/// begins the hit segment and the curve key of the impact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSegmentHit {
    pub path: PathId,
    /// Node immediately before the impact along the curve.
    pub point_after: NodeId,
    /// Curve input key at the impact.
    pub progress: f32,
}

/// Per-observer state supplied by the host each frame.
#[derive(Debug, Clone, Copy)]
pub struct ObserverState {
    /// Eye location the interest distance checks measure from.
    pub view_location: Vec3,
    /// Only local viewers keep trackers alive; remote peers run their own.
    pub local: bool,
    /// How far this observer can interact, feeds pick trace length.
    pub interaction_distance: f32,
}

/// Which role this process plays for path data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetMode {
    /// Holds the canonical, validated path state.
    Authority,
    /// Non-authoritative copy, forwards edits and may predict moves.
    Proxy,
}

impl NetMode {
    #[inline]
    pub fn is_authority(self) -> bool {
        matches!(self, NetMode::Authority)
    }
}

/// Validation failures of the edit operations. Messages are user facing.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PathEditError {
    #[error("cannot create path node as it would be too far from either of its adjacent path nodes")]
    CreateTooFar,
    #[error("cannot move path node as it would be too far from its adjacent path nodes")]
    MoveTooFar,
    #[error("cannot remove path node as its adjacent path nodes would end up too far from each other")]
    RemoveTooFar,
    #[error("path node is missing its owning path or its neighbors")]
    InvalidTarget,
    #[error("no remote channel available to reach the authority")]
    NoChannel,
}

/// Allocates stable ids for paths and nodes. Ids are never reused.
pub struct IdAllocator {
    next_path: u32,
    next_node: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            next_path: 0,
            next_node: 0,
        }
    }

    pub fn alloc_path(&mut self) -> PathId {
        let id = PathId::new(self.next_path);
        self.next_path += 1;
        id
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        id
    }

    /// Bump the node counter past an externally supplied id so replicated
    /// content and locally allocated ids never collide.
    pub fn reserve_node(&mut self, id: NodeId) {
        self.next_node = self.next_node.max(id.raw() + 1);
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
