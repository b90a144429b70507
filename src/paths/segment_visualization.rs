//! Per-segment visualization state: cached curve endpoints, request
//! reference counters and the primitives derived from them.

use crate::data::Settings;
use crate::paths::spline::{PathSpline, NUM_BACKTRACK_POINTS};
use crate::render::{
    CollisionBoxId, CollisionBoxParams, CurvePrimitiveId, TraceChannel, VisualizationBackend,
};
use glam::Vec3;

const LOCATION_TOLERANCE: f32 = 1.0;
const TANGENT_TOLERANCE: f32 = 0.1;

const CHUNK_LOCATION_TOLERANCE: f32 = 1.0;
const CHUNK_DIRECTION_TOLERANCE: f32 = 0.01;
const CHUNK_LENGTH_TOLERANCE: f32 = 1.0;

#[inline]
fn within_tolerance(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    (a - b).abs().max_element() <= tolerance
}

/// One collision slot produced by the angular subdivision walk.
struct CollisionChunk {
    location: Vec3,
    direction: Vec3,
    length: f32,
    primitive: Option<CollisionBoxId>,
    needs_update: bool,
}

/// Lazily spawned anchor entity the primitives of one path attach to.
pub struct VisualAnchor {
    id: Option<crate::render::AnchorId>,
}

impl VisualAnchor {
    pub fn new() -> Self {
        Self { id: None }
    }

    #[inline]
    pub fn id(&self) -> Option<crate::render::AnchorId> {
        self.id
    }

    pub fn get_or_spawn(
        &mut self,
        backend: &mut dyn VisualizationBackend,
        path_name: &str,
    ) -> crate::render::AnchorId {
        match self.id {
            Some(id) => id,
            None => {
                let id = backend.spawn_anchor(&format!("visualization_anchor_{path_name}"));
                self.id = Some(id);
                id
            }
        }
    }

    pub fn destroy(&mut self, backend: &mut dyn VisualizationBackend) {
        if let Some(id) = self.id.take() {
            backend.destroy_anchor(id);
        }
    }
}

impl Default for VisualAnchor {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared styling the owning visualization hands down when a segment builds
/// its curve primitive.
pub struct SegmentStyle<'a> {
    pub settings: &'a Settings,
    pub path_name: &'a str,
    pub color: [f32; 3],
}

pub struct SegmentVisualization {
    segment_index: usize,

    arrive_location: Vec3,
    arrive_tangent: Vec3,
    leave_location: Vec3,
    leave_tangent: Vec3,

    visualization_requests: i32,
    collision_requests: i32,

    needs_visualization_rebuild: bool,
    needs_collision_rebuild: bool,

    curve_primitive: Option<CurvePrimitiveId>,
    collision_chunks: Vec<CollisionChunk>,
}

impl SegmentVisualization {
    pub fn new(segment_index: usize) -> Self {
        Self {
            segment_index,
            arrive_location: Vec3::ZERO,
            arrive_tangent: Vec3::ZERO,
            leave_location: Vec3::ZERO,
            leave_tangent: Vec3::ZERO,
            visualization_requests: 0,
            collision_requests: 0,
            needs_visualization_rebuild: false,
            needs_collision_rebuild: false,
            curve_primitive: None,
            collision_chunks: Vec::new(),
        }
    }

    #[inline]
    pub fn segment_index(&self) -> usize {
        self.segment_index
    }

    #[inline]
    pub fn arrive_location(&self) -> Vec3 {
        self.arrive_location
    }

    #[inline]
    pub fn leave_location(&self) -> Vec3 {
        self.leave_location
    }

    #[inline]
    pub fn visualization_requests(&self) -> i32 {
        self.visualization_requests
    }

    #[inline]
    pub fn collision_requests(&self) -> i32 {
        self.collision_requests
    }

    #[inline]
    pub fn is_up_to_date(&self) -> bool {
        !self.needs_visualization_rebuild && !self.needs_collision_rebuild
    }

    #[inline]
    pub fn collision_chunk_count(&self) -> usize {
        self.collision_chunks.len()
    }

    /// Additive interest counter for the curve primitive. Only the
    /// zero/non-zero transition marks the segment stale.
    pub fn add_remove_visualization_request(&mut self, remove: bool) {
        let wanted_before = self.visualization_requests != 0;
        self.visualization_requests += if remove { -1 } else { 1 };

        if (self.visualization_requests != 0) != wanted_before {
            self.needs_visualization_rebuild = true;
        }
    }

    /// Additive interest counter for the collision volumes.
    pub fn add_remove_collision_request(&mut self, remove: bool) {
        let wanted_before = self.collision_requests != 0;
        self.collision_requests += if remove { -1 } else { 1 };

        if (self.collision_requests != 0) != wanted_before {
            self.needs_collision_rebuild = true;
        }
    }

    /// True when either cached endpoint is within the distance of the
    /// observer. The nearer endpoint wins by the `||`.
    pub fn is_relevant_for_observer(&self, observer_location: Vec3, relevance_distance: f32) -> bool {
        self.arrive_location.distance(observer_location) <= relevance_distance
            || self.leave_location.distance(observer_location) <= relevance_distance
    }

    /// Curve point indices spanning this segment. The end wraps back to the
    /// first real point when the segment starts at the final curve point.
    fn curve_points_for_segment(&self, spline: &PathSpline) -> (usize, usize) {
        let start = NUM_BACKTRACK_POINTS + self.segment_index;
        let end = if start + 1 < spline.point_count() {
            start + 1
        } else {
            NUM_BACKTRACK_POINTS
        };
        (start, end)
    }

    /// Re-sample the cached endpoints from the curve. Tolerances debounce
    /// floating point jitter so an unchanged curve never marks anything
    /// stale; a real change only marks the primitives someone wants.
    pub fn refresh_geometry(&mut self, spline: &PathSpline) {
        let (start_point, end_point) = self.curve_points_for_segment(spline);

        let new_arrive_location = spline.location_at_point(start_point);
        let new_arrive_tangent = spline.tangent_at_point(start_point);
        let new_leave_location = spline.location_at_point(end_point);
        let new_leave_tangent = spline.tangent_at_point(end_point);

        if !within_tolerance(self.arrive_location, new_arrive_location, LOCATION_TOLERANCE)
            || !within_tolerance(self.leave_location, new_leave_location, LOCATION_TOLERANCE)
            || !within_tolerance(self.arrive_tangent, new_arrive_tangent, TANGENT_TOLERANCE)
            || !within_tolerance(self.leave_tangent, new_leave_tangent, TANGENT_TOLERANCE)
        {
            self.arrive_location = new_arrive_location;
            self.arrive_tangent = new_arrive_tangent;
            self.leave_location = new_leave_location;
            self.leave_tangent = new_leave_tangent;

            self.needs_visualization_rebuild |= self.visualization_requests != 0;
            self.needs_collision_rebuild |= self.collision_requests != 0;
        }
    }

    /// Run the pending rebuilds against the current cache.
    pub fn update(
        &mut self,
        spline: &PathSpline,
        backend: &mut dyn VisualizationBackend,
        anchor: &mut VisualAnchor,
        style: &SegmentStyle,
    ) {
        if self.needs_visualization_rebuild {
            self.force_update_visualization(backend, anchor, style);
        }
        if self.needs_collision_rebuild {
            self.force_update_collision(spline, backend, anchor, style);
        }
    }

    fn force_update_visualization(
        &mut self,
        backend: &mut dyn VisualizationBackend,
        anchor: &mut VisualAnchor,
        style: &SegmentStyle,
    ) {
        let wants_visualization = self.visualization_requests != 0;

        if self.curve_primitive.is_none() && wants_visualization {
            let anchor_id = anchor.get_or_spawn(backend, style.path_name);
            let primitive = backend.create_curve_primitive(
                anchor_id,
                &style.settings.path_visualization_mesh,
                &style.settings.path_visualization_material,
                &style.settings.path_visualization_color_parameter,
                style.color,
            );
            self.curve_primitive = Some(primitive);
        }

        // Geometry updates run even while hidden, so a primitive that later
        // becomes wanted is already positioned.
        if let Some(primitive) = self.curve_primitive {
            backend.set_curve_endpoints(
                primitive,
                self.arrive_location,
                self.arrive_tangent,
                self.leave_location,
                self.leave_tangent,
            );
            backend.set_curve_visibility(primitive, wants_visualization);
        }
        self.needs_visualization_rebuild = false;
    }

    fn force_update_collision(
        &mut self,
        spline: &PathSpline,
        backend: &mut dyn VisualizationBackend,
        anchor: &mut VisualAnchor,
        style: &SegmentStyle,
    ) {
        let produced = if self.collision_requests != 0 {
            self.rebuild_chunks_for_curve(spline, style.settings)
        } else {
            0
        };

        // Destroy primitives for pruned slots.
        while self.collision_chunks.len() > produced {
            if let Some(chunk) = self.collision_chunks.pop() {
                if let Some(primitive) = chunk.primitive {
                    backend.destroy_collision_box(primitive);
                }
            }
        }

        let thickness = style.settings.collision_thickness;
        for chunk in &mut self.collision_chunks {
            let params = CollisionBoxParams {
                location: chunk.location,
                direction: chunk.direction,
                half_extents: Vec3::new(chunk.length / 2.0, thickness, thickness),
                overlap_channel: TraceChannel::Interaction,
            };

            match chunk.primitive {
                None => {
                    let anchor_id = anchor.get_or_spawn(backend, style.path_name);
                    chunk.primitive = Some(backend.create_collision_box(anchor_id, params));
                    chunk.needs_update = false;
                }
                Some(primitive) if chunk.needs_update => {
                    backend.update_collision_box(primitive, params);
                    chunk.needs_update = false;
                }
                Some(_) => {}
            }
        }
        self.needs_collision_rebuild = false;
    }

    /// Angular subdivision: walk the segment span in roughly step-sized
    /// increments and close a chunk whenever the direction has turned past
    /// the configured maximum, or the walk reaches the end. Sharper
    /// curvature yields more, shorter chunks. Returns the slot count
    /// produced; slots are only marked for update when they moved beyond
    /// tolerance.
    fn rebuild_chunks_for_curve(&mut self, spline: &PathSpline, settings: &Settings) -> usize {
        let (start_point, end_point) = self.curve_points_for_segment(spline);
        let start_key = start_point as f32;
        let end_key = end_point as f32;

        let span = end_key - start_key;
        let segment_length =
            (spline.distance_at_key(end_key) - spline.distance_at_key(start_key)).abs();

        // A collapsed span cannot be walked; keep one degenerate chunk.
        if span <= 0.0 || segment_length <= f32::EPSILON || settings.collision_step <= 0.0 {
            let location = spline.location_at_key(start_key);
            self.write_chunk_slot(0, location, Vec3::ZERO, 0.0);
            return 1;
        }

        let max_angle = settings.collision_max_angle_difference;
        let step_count = (segment_length / settings.collision_step).ceil().max(1.0);
        let increment_max = span / step_count;

        let mut current_key = start_key;
        let mut current_direction = spline.direction_at_key(current_key);
        let mut current_location = spline.location_at_key(current_key);
        let mut chunk_index = 0usize;

        while current_key < end_key {
            let increment = increment_max.min(end_key - current_key);
            let next_direction = spline.direction_at_key(current_key + increment);
            let next_location = spline.location_at_key(current_key + increment);

            let angle_from_previous = current_direction
                .dot(next_direction)
                .clamp(-1.0, 1.0)
                .acos()
                .to_degrees();

            if angle_from_previous >= max_angle || current_key + increment >= end_key {
                let location = (current_location + next_location) * 0.5;
                let direction = (next_location - current_location).normalize_or_zero();
                let length = current_location.distance(next_location);
                self.write_chunk_slot(chunk_index, location, direction, length);

                current_direction = next_direction;
                current_location = next_location;
                chunk_index += 1;
            }
            current_key += increment;
        }
        chunk_index
    }

    /// Store one chunk slot, marking it for update only when it actually
    /// moved.
    fn write_chunk_slot(&mut self, index: usize, location: Vec3, direction: Vec3, length: f32) {
        if index >= self.collision_chunks.len() {
            self.collision_chunks.push(CollisionChunk {
                location,
                direction,
                length,
                primitive: None,
                needs_update: false,
            });
            return;
        }

        let chunk = &mut self.collision_chunks[index];
        if !within_tolerance(chunk.location, location, CHUNK_LOCATION_TOLERANCE)
            || !within_tolerance(chunk.direction, direction, CHUNK_DIRECTION_TOLERANCE)
            || (chunk.length - length).abs() >= CHUNK_LENGTH_TOLERANCE
        {
            chunk.location = location;
            chunk.direction = direction;
            chunk.length = length;
            chunk.needs_update = true;
        }
    }

    /// Release every primitive this segment owns. The owner clears the
    /// segment out of all trackers afterwards.
    pub fn destroy(&mut self, backend: &mut dyn VisualizationBackend) {
        if let Some(primitive) = self.curve_primitive.take() {
            backend.destroy_curve_primitive(primitive);
            self.needs_visualization_rebuild = true;
        }

        if !self.collision_chunks.is_empty() {
            for chunk in self.collision_chunks.drain(..) {
                if let Some(primitive) = chunk.primitive {
                    backend.destroy_collision_box(primitive);
                }
            }
            self.needs_collision_rebuild = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recording::{BackendCall, RecordingBackend};
    use glam::Vec3;

    fn test_settings() -> Settings {
        Settings {
            collision_step: 100.0,
            collision_max_angle_difference: 90.0,
            ..Settings::default()
        }
    }

    fn straight_spline() -> PathSpline {
        PathSpline::from_loop(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(200.0, 0.0, 0.0),
            Vec3::new(400.0, 0.0, 0.0),
            Vec3::new(600.0, 0.0, 0.0),
        ])
        .unwrap()
    }

    fn square_spline() -> PathSpline {
        PathSpline::from_loop(&[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(500.0, 0.0, 500.0),
            Vec3::new(0.0, 0.0, 500.0),
        ])
        .unwrap()
    }

    fn update_segment(
        segment: &mut SegmentVisualization,
        spline: &PathSpline,
        backend: &mut RecordingBackend,
        anchor: &mut VisualAnchor,
        settings: &Settings,
    ) {
        let style = SegmentStyle {
            settings,
            path_name: "test_path",
            color: [0.5, 0.5, 0.5],
        };
        segment.refresh_geometry(spline);
        if !segment.is_up_to_date() {
            segment.update(spline, backend, anchor, &style);
        }
    }

    #[test]
    fn test_refresh_geometry_caches_curve_samples() {
        let spline = square_spline();
        let mut segment = SegmentVisualization::new(0);

        segment.refresh_geometry(&spline);

        assert!(segment.arrive_location().distance(spline.location_at_point(2)) < 1.0);
        assert!(segment.leave_location().distance(spline.location_at_point(3)) < 1.0);
    }

    #[test]
    fn test_refresh_with_unchanged_curve_sets_no_flags() {
        let spline = square_spline();
        let mut segment = SegmentVisualization::new(0);
        segment.add_remove_visualization_request(false);
        segment.add_remove_collision_request(false);

        segment.refresh_geometry(&spline);
        assert!(!segment.is_up_to_date());

        // Drain the flags, then refresh again with identical curve data.
        let mut backend = RecordingBackend::new();
        let mut anchor = VisualAnchor::new();
        let settings = test_settings();
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        assert!(segment.is_up_to_date());

        segment.refresh_geometry(&spline);
        assert!(segment.is_up_to_date());
    }

    #[test]
    fn test_request_counter_flags_only_zero_crossings() {
        let mut segment = SegmentVisualization::new(0);

        segment.add_remove_visualization_request(false);
        assert!(!segment.is_up_to_date());
        assert_eq!(segment.visualization_requests(), 1);
        segment.needs_visualization_rebuild = false;

        // Second and third requesters change nothing.
        segment.add_remove_visualization_request(false);
        segment.add_remove_visualization_request(false);
        assert!(segment.is_up_to_date());
        assert_eq!(segment.visualization_requests(), 3);

        segment.add_remove_visualization_request(true);
        segment.add_remove_visualization_request(true);
        assert!(segment.is_up_to_date());

        // Last removal crosses back to zero.
        segment.add_remove_visualization_request(true);
        assert!(!segment.is_up_to_date());
        assert_eq!(segment.visualization_requests(), 0);
    }

    #[test]
    fn test_straight_segment_single_chunk_no_churn() {
        let spline = straight_spline();
        let settings = test_settings();
        let mut backend = RecordingBackend::new();
        let mut anchor = VisualAnchor::new();

        // Interior straight segment: nodes 1 -> 2.
        let mut segment = SegmentVisualization::new(1);
        segment.add_remove_collision_request(false);
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);

        assert_eq!(segment.collision_chunk_count(), 1);
        let creates = backend.count_calls(|c| matches!(c, BackendCall::CreateBox(_)));
        assert_eq!(creates, 1);

        // Re-run with unchanged geometry: no creates, destroys or updates.
        backend.clear_calls();
        segment.needs_collision_rebuild = true;
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        segment.needs_collision_rebuild = true;
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);

        assert_eq!(segment.collision_chunk_count(), 1);
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::CreateBox(_))), 0);
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::DestroyBox(_))), 0);
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::UpdateBox(_))), 0);
    }

    #[test]
    fn test_sharp_turn_produces_multiple_chunks() {
        // A hairpin: the curve turns ~90 degrees or more across the corner
        // segments of the square, with a tight angle limit.
        let spline = square_spline();
        let settings = Settings {
            collision_step: 50.0,
            collision_max_angle_difference: 30.0,
            ..Settings::default()
        };
        let mut backend = RecordingBackend::new();
        let mut anchor = VisualAnchor::new();

        let mut segment = SegmentVisualization::new(0);
        segment.add_remove_collision_request(false);
        let style = SegmentStyle {
            settings: &settings,
            path_name: "test_path",
            color: [0.5, 0.5, 0.5],
        };
        segment.refresh_geometry(&spline);
        segment.update(&spline, &mut backend, &mut anchor, &style);

        assert!(
            segment.collision_chunk_count() >= 2,
            "expected subdivision, got {} chunk(s)",
            segment.collision_chunk_count()
        );
    }

    #[test]
    fn test_collision_release_when_unwanted() {
        let spline = straight_spline();
        let settings = test_settings();
        let mut backend = RecordingBackend::new();
        let mut anchor = VisualAnchor::new();

        let mut segment = SegmentVisualization::new(1);
        segment.add_remove_collision_request(false);
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        assert!(!backend.live_boxes.is_empty());

        segment.add_remove_collision_request(true);
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        assert!(backend.live_boxes.is_empty());
        assert_eq!(segment.collision_chunk_count(), 0);
    }

    #[test]
    fn test_visualization_primitive_lifecycle() {
        let spline = straight_spline();
        let settings = test_settings();
        let mut backend = RecordingBackend::new();
        let mut anchor = VisualAnchor::new();

        let mut segment = SegmentVisualization::new(1);
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        assert!(backend.live_curves.is_empty());

        segment.add_remove_visualization_request(false);
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        assert_eq!(backend.live_curves.len(), 1);
        assert_eq!(
            backend.count_calls(|c| matches!(c, BackendCall::SetCurveVisibility(_, true))),
            1
        );

        // Removing interest hides the primitive but keeps it alive.
        segment.add_remove_visualization_request(true);
        update_segment(&mut segment, &spline, &mut backend, &mut anchor, &settings);
        assert_eq!(backend.live_curves.len(), 1);
        assert_eq!(
            backend.count_calls(|c| matches!(c, BackendCall::SetCurveVisibility(_, false))),
            1
        );

        segment.destroy(&mut backend);
        assert!(backend.live_curves.is_empty());
    }
}
