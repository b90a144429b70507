//! Capability surface between the path core and whatever rendering/physics
//! host is plugged in. The core only holds opaque handles and calls
//! create/update/destroy; it never interprets them.

use crate::data::AssetRef;
use crate::paths::path_structs::{NodeId, ObserverId, PathId};
use glam::{Quat, Vec2, Vec3};

/// Stable handle to a spawned anchor entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AnchorId(pub u64);

/// Stable handle to a renderable curve-segment primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CurvePrimitiveId(pub u64);

/// Stable handle to a box-shaped collision volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CollisionBoxId(pub u64);

/// Trace channels the host understands. Collision boxes overlap only the
/// interaction channel so picking hits them without blocking anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceChannel {
    Interaction,
    WorldStatic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBoxParams {
    pub location: Vec3,
    /// Direction of the box's long axis, normalized.
    pub direction: Vec3,
    /// Half extents: x = half length along `direction`, y/z = half thickness.
    pub half_extents: Vec3,
    /// The only channel the box responds to, as an overlap.
    pub overlap_channel: TraceChannel,
}

/// Creation/destruction of the visual and physical primitives backing path
/// visualization. Implemented by the host renderer; [`NullBackend`] serves
/// headless hosts such as dedicated authorities.
pub trait VisualizationBackend {
    fn spawn_anchor(&mut self, name: &str) -> AnchorId;
    fn destroy_anchor(&mut self, anchor: AnchorId);

    fn create_curve_primitive(
        &mut self,
        anchor: AnchorId,
        mesh: &AssetRef,
        material: &AssetRef,
        color_parameter: &str,
        color: [f32; 3],
    ) -> CurvePrimitiveId;
    fn set_curve_endpoints(
        &mut self,
        primitive: CurvePrimitiveId,
        start: Vec3,
        start_tangent: Vec3,
        end: Vec3,
        end_tangent: Vec3,
    );
    fn set_curve_visibility(&mut self, primitive: CurvePrimitiveId, visible: bool);
    fn destroy_curve_primitive(&mut self, primitive: CurvePrimitiveId);

    fn create_collision_box(&mut self, anchor: AnchorId, params: CollisionBoxParams) -> CollisionBoxId;
    fn update_collision_box(&mut self, collider: CollisionBoxId, params: CollisionBoxParams);
    fn destroy_collision_box(&mut self, collider: CollisionBoxId);
}

/// What a screen-space trace reported hitting. Hits the core does not care
/// about come back as `Other` and are skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitActor {
    PathNode { path: PathId, node: NodeId },
    PathAnchor { path: PathId },
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenHit {
    pub actor: HitActor,
    pub impact_point: Vec3,
}

/// Externally supplied screen position to world hit function. Hit order is
/// not guaranteed to be nearest first.
pub trait ScreenTracer {
    fn trace_multi(
        &self,
        observer: ObserverId,
        screen_position: Vec2,
        channel: TraceChannel,
        max_distance: f32,
    ) -> Vec<ScreenHit>;

    /// Single trace against solid world geometry, for placing nodes on the
    /// ground. Returns the hit location and surface orientation.
    fn trace_solid(
        &self,
        observer: ObserverId,
        screen_position: Vec2,
        max_distance: f32,
    ) -> Option<(Vec3, Quat)>;
}

/// Backend that allocates handles and discards every call. Lets a headless
/// authority run the full reconciliation path without a renderer.
#[derive(Default)]
pub struct NullBackend {
    next_handle: u64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl VisualizationBackend for NullBackend {
    fn spawn_anchor(&mut self, _name: &str) -> AnchorId {
        AnchorId(self.next())
    }
    fn destroy_anchor(&mut self, _anchor: AnchorId) {}

    fn create_curve_primitive(
        &mut self,
        _anchor: AnchorId,
        _mesh: &AssetRef,
        _material: &AssetRef,
        _color_parameter: &str,
        _color: [f32; 3],
    ) -> CurvePrimitiveId {
        CurvePrimitiveId(self.next())
    }
    fn set_curve_endpoints(
        &mut self,
        _primitive: CurvePrimitiveId,
        _start: Vec3,
        _start_tangent: Vec3,
        _end: Vec3,
        _end_tangent: Vec3,
    ) {
    }
    fn set_curve_visibility(&mut self, _primitive: CurvePrimitiveId, _visible: bool) {}
    fn destroy_curve_primitive(&mut self, _primitive: CurvePrimitiveId) {}

    fn create_collision_box(&mut self, _anchor: AnchorId, _params: CollisionBoxParams) -> CollisionBoxId {
        CollisionBoxId(self.next())
    }
    fn update_collision_box(&mut self, _collider: CollisionBoxId, _params: CollisionBoxParams) {}
    fn destroy_collision_box(&mut self, _collider: CollisionBoxId) {}
}
