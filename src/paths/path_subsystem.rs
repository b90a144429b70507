//! Per-frame orchestration: keeps one visualization per path container and
//! one interest tracker per local observer, and exposes the screen-space
//! pick helpers. All work runs on the simulation thread; visualizations are
//! reconciled before trackers read segment state, so observers never see a
//! torn topology.

use crate::data::Settings;
use crate::events::PathEvents;
use crate::paths::path_structs::{
    NetMode, NodeId, ObserverId, ObserverState, PathId, PathSegmentHit, PathVisualizationFlags,
};
use crate::paths::path_visualization::PathVisualization;
use crate::paths::paths::PathManager;
use crate::paths::visualization_tracker::VisualizationTracker;
use crate::render::{HitActor, ScreenTracer, TraceChannel, VisualizationBackend};
use glam::{Quat, Vec2, Vec3};
use std::collections::HashMap;

pub struct PathSubsystem {
    pub(crate) net_mode: NetMode,
    pub(crate) settings: Settings,
    pub(crate) visualized_paths: Vec<PathVisualization>,
    pub(crate) trackers: Vec<VisualizationTracker>,
    pub(crate) observers: HashMap<ObserverId, ObserverState>,
    pub(crate) events: PathEvents,
}

impl PathSubsystem {
    pub fn new(net_mode: NetMode, settings: Settings) -> Self {
        Self {
            net_mode,
            settings,
            visualized_paths: Vec::new(),
            trackers: Vec::new(),
            observers: HashMap::new(),
            events: PathEvents::new(),
        }
    }

    #[inline]
    pub fn net_mode(&self) -> NetMode {
        self.net_mode
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn events_mut(&mut self) -> &mut PathEvents {
        &mut self.events
    }

    #[inline]
    pub fn visualized_paths(&self) -> &[PathVisualization] {
        &self.visualized_paths
    }

    pub fn find_visualization(&self, path: PathId) -> Option<&PathVisualization> {
        self.visualized_paths.iter().find(|v| v.path_id() == path)
    }

    pub fn register_observer(&mut self, id: ObserverId, state: ObserverState) {
        self.observers.insert(id, state);
    }

    /// Per-frame view state refresh from the host.
    pub fn update_observer(&mut self, id: ObserverId, state: ObserverState) {
        self.observers.insert(id, state);
    }

    /// The observer's tracker is torn down on the next update.
    pub fn unregister_observer(&mut self, id: ObserverId) {
        self.observers.remove(&id);
    }

    /// Toggle one requester's interest bit on the observer's tracker,
    /// creating the tracker on first use.
    pub fn set_visualization_requester_state(
        &mut self,
        observer: ObserverId,
        requester_id: &str,
        bit: PathVisualizationFlags,
        enabled: bool,
    ) {
        if !self.observers.contains_key(&observer) {
            return;
        }

        if !self.trackers.iter().any(|t| t.owner() == observer) {
            self.trackers.push(VisualizationTracker::new(observer));
        }
        if let Some(tracker) = self.trackers.iter_mut().find(|t| t.owner() == observer) {
            tracker.set_visualization_bit(requester_id, bit, enabled);
        }
    }

    pub fn get_visualization_requester_state(
        &self,
        observer: ObserverId,
        requester_id: &str,
        bit: PathVisualizationFlags,
    ) -> bool {
        self.trackers
            .iter()
            .find(|t| t.owner() == observer)
            .is_some_and(|t| t.get_visualization_bit(requester_id, bit))
    }

    /// One simulation frame.
    pub fn update(&mut self, manager: &mut PathManager, backend: &mut dyn VisualizationBackend) {
        self.tick_active_visualizations(manager, backend);
        self.tick_visualization_trackers();
    }

    fn tick_active_visualizations(
        &mut self,
        manager: &mut PathManager,
        backend: &mut dyn VisualizationBackend,
    ) {
        let has_authority = self.net_mode.is_authority();
        let Self {
            visualized_paths,
            trackers,
            settings,
            ..
        } = self;

        // Clean up visualizations whose container is gone before anything
        // touches them this frame.
        let mut index = 0;
        while index < visualized_paths.len() {
            if manager.contains(visualized_paths[index].path_id()) {
                index += 1;
                continue;
            }
            let mut stale = visualized_paths.remove(index);
            stale.teardown(backend, trackers);
        }

        for path_id in manager.path_ids() {
            let index = match visualized_paths.iter().position(|v| v.path_id() == path_id) {
                Some(index) => index,
                None => {
                    let name = manager
                        .path(path_id)
                        .map(|p| p.name().to_string())
                        .unwrap_or_default();
                    visualized_paths.push(PathVisualization::new(path_id, &name));
                    visualized_paths.len() - 1
                }
            };

            if let Some(container) = manager.path_mut(path_id) {
                visualized_paths[index].update(container, has_authority, trackers, backend, settings);
            }
        }
    }

    fn tick_visualization_trackers(&mut self) {
        let Self {
            trackers,
            visualized_paths,
            observers,
            settings,
            ..
        } = self;

        // Stale or empty trackers release their bits and go away.
        let mut index = 0;
        while index < trackers.len() {
            if trackers[index].is_valid(observers) && !trackers[index].is_empty() {
                index += 1;
                continue;
            }
            let mut stale = trackers.remove(index);
            stale.destroy(visualized_paths);
        }

        for tracker in trackers.iter_mut() {
            if let Some(observer) = observers.get(&tracker.owner()) {
                tracker.update(observer, visualized_paths, settings);
            }
        }
    }

    /// Symmetric teardown of everything this subsystem spawned.
    pub fn destroy(&mut self, backend: &mut dyn VisualizationBackend) {
        for mut tracker in self.trackers.drain(..) {
            tracker.destroy(&mut self.visualized_paths);
        }
        for mut visualization in self.visualized_paths.drain(..) {
            visualization.teardown(backend, &mut []);
        }
        self.observers.clear();
    }

    fn trace_distance_for_observer(&self, observer: ObserverId) -> f32 {
        let interaction = self
            .observers
            .get(&observer)
            .map(|o| o.interaction_distance)
            .unwrap_or(0.0);
        interaction.max(self.settings.min_trace_distance)
    }

    /// Scan the screen trace for the first waypoint node hit.
    pub fn trace_for_path_node(
        &self,
        tracer: &dyn ScreenTracer,
        observer: ObserverId,
        screen_position: Vec2,
    ) -> Option<(PathId, NodeId)> {
        let hits = tracer.trace_multi(
            observer,
            screen_position,
            TraceChannel::Interaction,
            self.trace_distance_for_observer(observer),
        );

        hits.iter().find_map(|hit| match hit.actor {
            HitActor::PathNode { path, node } => Some((path, node)),
            _ => None,
        })
    }

    /// Scan the screen trace for a visualization anchor hit and resolve it
    /// to the enclosing segment: closest curve key to the impact, then the
    /// node that begins that span, compensating for the backtrack points at
    /// the head of the curve.
    pub fn trace_for_segment(
        &self,
        tracer: &dyn ScreenTracer,
        manager: &PathManager,
        observer: ObserverId,
        screen_position: Vec2,
    ) -> Option<PathSegmentHit> {
        let hits = tracer.trace_multi(
            observer,
            screen_position,
            TraceChannel::Interaction,
            self.trace_distance_for_observer(observer),
        );

        for hit in &hits {
            let HitActor::PathAnchor { path } = hit.actor else {
                continue;
            };
            let Some(container) = manager.path(path) else {
                continue;
            };
            let Some(spline) = container.path() else {
                continue;
            };

            let progress = spline.closest_key_to_location(hit.impact_point);
            let point_index = spline.point_index_for_key(progress);
            if let Some(point_after) = container.node_at_curve_point(point_index) {
                return Some(PathSegmentHit {
                    path,
                    point_after,
                    progress,
                });
            }
        }
        None
    }

    /// Trace against solid world geometry, for placing nodes on the ground.
    pub fn trace_for_solid_surface(
        &self,
        tracer: &dyn ScreenTracer,
        observer: ObserverId,
        screen_position: Vec2,
    ) -> Option<(Vec3, Quat)> {
        tracer.trace_solid(
            observer,
            screen_position,
            self.trace_distance_for_observer(observer),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::paths::PathNode;
    use crate::render::recording::RecordingBackend;
    use crate::render::ScreenHit;

    const VIS: PathVisualizationFlags = PathVisualizationFlags::VISUALIZATION;
    const COLL: PathVisualizationFlags = PathVisualizationFlags::COLLISION;

    fn local_observer() -> ObserverState {
        ObserverState {
            view_location: Vec3::ZERO,
            local: true,
            interaction_distance: 1_000.0,
        }
    }

    fn square_manager() -> (PathManager, PathId) {
        let mut manager = PathManager::new();
        let path = manager.create_path("square");
        for position in [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(500.0, 0.0, 0.0),
            Vec3::new(500.0, 0.0, 500.0),
            Vec3::new(0.0, 0.0, 500.0),
        ] {
            let id = manager.alloc_node_id();
            let container = manager.path_mut(path).unwrap();
            container.push_node(PathNode::new(id, position, Quat::IDENTITY, 50));
        }
        (manager, path)
    }

    struct FakeTracer {
        hits: Vec<ScreenHit>,
    }

    impl ScreenTracer for FakeTracer {
        fn trace_multi(
            &self,
            _observer: ObserverId,
            _screen_position: Vec2,
            _channel: TraceChannel,
            _max_distance: f32,
        ) -> Vec<ScreenHit> {
            self.hits.clone()
        }

        fn trace_solid(
            &self,
            _observer: ObserverId,
            _screen_position: Vec2,
            _max_distance: f32,
        ) -> Option<(Vec3, Quat)> {
            None
        }
    }

    #[test]
    fn test_update_builds_visualizations_for_all_paths() {
        let (mut manager, path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();

        subsystem.update(&mut manager, &mut backend);

        let vis = subsystem.find_visualization(path).unwrap();
        assert_eq!(vis.segments().len(), 4);
        assert!(manager.path(path).unwrap().path().is_some());
    }

    #[test]
    fn test_interest_materializes_primitives_on_following_frame() {
        let (mut manager, path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();
        let observer = ObserverId::new(1);

        subsystem.register_observer(observer, local_observer());
        subsystem.set_visualization_requester_state(observer, "keybind", VIS, true);

        // Frame 1: segments come up, then the tracker asserts its interest.
        subsystem.update(&mut manager, &mut backend);
        let vis = subsystem.find_visualization(path).unwrap();
        assert_eq!(vis.segments()[0].visualization_requests(), 1);
        assert!(backend.live_curves.is_empty());

        // Frame 2: the pending rebuild materializes the primitives.
        subsystem.update(&mut manager, &mut backend);
        assert_eq!(backend.live_curves.len(), 4);
    }

    #[test]
    fn test_unregistered_observer_releases_interest() {
        let (mut manager, _path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();
        let observer = ObserverId::new(1);

        subsystem.register_observer(observer, local_observer());
        subsystem.set_visualization_requester_state(observer, "keybind", COLL, true);
        subsystem.update(&mut manager, &mut backend);
        subsystem.update(&mut manager, &mut backend);
        assert!(!backend.live_boxes.is_empty());

        subsystem.unregister_observer(observer);
        subsystem.update(&mut manager, &mut backend);
        let vis = &subsystem.visualized_paths()[0];
        assert!(vis.segments().iter().all(|s| s.collision_requests() == 0));

        // One more frame flushes the now-unwanted boxes.
        subsystem.update(&mut manager, &mut backend);
        assert!(backend.live_boxes.is_empty());
    }

    #[test]
    fn test_removed_path_tears_down_visualization() {
        let (mut manager, path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();
        let observer = ObserverId::new(1);

        subsystem.register_observer(observer, local_observer());
        subsystem.set_visualization_requester_state(observer, "keybind", VIS, true);
        subsystem.update(&mut manager, &mut backend);
        subsystem.update(&mut manager, &mut backend);
        assert!(!backend.live_curves.is_empty());

        manager.remove_path(path);
        subsystem.update(&mut manager, &mut backend);

        assert!(subsystem.find_visualization(path).is_none());
        assert!(backend.live_curves.is_empty());
        assert!(backend.live_anchors.is_empty());
    }

    #[test]
    fn test_requester_state_round_trip() {
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let observer = ObserverId::new(5);

        // No tracker without a registered observer.
        subsystem.set_visualization_requester_state(observer, "keybind", VIS, true);
        assert!(!subsystem.get_visualization_requester_state(observer, "keybind", VIS));

        subsystem.register_observer(observer, local_observer());
        subsystem.set_visualization_requester_state(observer, "keybind", VIS, true);
        assert!(subsystem.get_visualization_requester_state(observer, "keybind", VIS));
        assert!(!subsystem.get_visualization_requester_state(observer, "keybind", COLL));
    }

    #[test]
    fn test_trace_for_segment_resolves_point_after() {
        let (mut manager, path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();
        subsystem.update(&mut manager, &mut backend);

        let spline_mid = {
            let container = manager.path(path).unwrap();
            container.path().unwrap().location_at_key(3.4)
        };
        let tracer = FakeTracer {
            hits: vec![
                ScreenHit {
                    actor: HitActor::Other,
                    impact_point: Vec3::ZERO,
                },
                ScreenHit {
                    actor: HitActor::PathAnchor { path },
                    impact_point: spline_mid,
                },
            ],
        };

        let observer = ObserverId::new(1);
        subsystem.register_observer(observer, local_observer());
        let hit = subsystem
            .trace_for_segment(&tracer, &manager, observer, Vec2::ZERO)
            .unwrap();

        // Key 3.4 lies in the span that starts at node 1.
        let expected = manager.path(path).unwrap().nodes()[1].id();
        assert_eq!(hit.point_after, expected);
        assert!((hit.progress - 3.4).abs() < 0.1);
    }

    #[test]
    fn test_trace_for_path_node_picks_first_node_hit() {
        let (mut manager, path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();
        subsystem.update(&mut manager, &mut backend);

        let node = manager.path(path).unwrap().nodes()[2].id();
        let tracer = FakeTracer {
            hits: vec![ScreenHit {
                actor: HitActor::PathNode { path, node },
                impact_point: Vec3::ZERO,
            }],
        };

        let observer = ObserverId::new(1);
        subsystem.register_observer(observer, local_observer());
        assert_eq!(
            subsystem.trace_for_path_node(&tracer, observer, Vec2::ZERO),
            Some((path, node))
        );
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (mut manager, _path) = square_manager();
        let mut subsystem = PathSubsystem::new(NetMode::Authority, Settings::default());
        let mut backend = RecordingBackend::new();
        let observer = ObserverId::new(1);

        subsystem.register_observer(observer, local_observer());
        subsystem.set_visualization_requester_state(observer, "keybind", VIS | COLL, true);
        subsystem.update(&mut manager, &mut backend);
        subsystem.update(&mut manager, &mut backend);
        assert!(!backend.live_curves.is_empty());

        subsystem.destroy(&mut backend);
        assert!(backend.live_curves.is_empty());
        assert!(backend.live_boxes.is_empty());
        assert!(backend.live_anchors.is_empty());
    }
}
