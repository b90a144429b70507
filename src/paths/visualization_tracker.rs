//! Per-observer interest tracking: named requesters aggregate into a
//! combined mask, distance culling picks the relevant segments, and a diff
//! against the previously applied state keeps segment reference counters
//! exact.

use crate::data::Settings;
use crate::paths::path_structs::{ObserverId, ObserverState, PathVisualizationFlags, SegmentKey};
use crate::paths::path_visualization::PathVisualization;
use std::collections::HashMap;

pub struct VisualizationTracker {
    owner: ObserverId,
    /// Requester id -> requested bits. Entries vanish when their mask does.
    enabled_bits: HashMap<String, PathVisualizationFlags>,
    /// Segment -> bits this tracker currently applies. Only non-empty masks
    /// are kept, so the map stays sized to actively-visualized segments.
    applied_bits: HashMap<SegmentKey, PathVisualizationFlags>,
    /// Capacity hint from the previous pass.
    last_segment_count: usize,
}

impl VisualizationTracker {
    pub fn new(owner: ObserverId) -> Self {
        Self {
            owner,
            enabled_bits: HashMap::new(),
            applied_bits: HashMap::new(),
            last_segment_count: 0,
        }
    }

    #[inline]
    pub fn owner(&self) -> ObserverId {
        self.owner
    }

    /// Valid while the observer is still registered and viewing locally.
    pub fn is_valid(&self, observers: &HashMap<ObserverId, ObserverState>) -> bool {
        observers.get(&self.owner).is_some_and(|o| o.local)
    }

    /// A tracker nobody requests anything from is empty and gets torn down.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.enabled_bits.is_empty()
    }

    pub fn set_visualization_bit(
        &mut self,
        requester_id: &str,
        bit: PathVisualizationFlags,
        enabled: bool,
    ) {
        let mask = self.enabled_bits.entry(requester_id.to_string()).or_default();
        if enabled {
            *mask |= bit;
        } else {
            *mask &= !bit;
        }
        if mask.is_empty() {
            self.enabled_bits.remove(requester_id);
        }
    }

    pub fn get_visualization_bit(&self, requester_id: &str, bit: PathVisualizationFlags) -> bool {
        self.enabled_bits
            .get(requester_id)
            .is_some_and(|mask| mask.intersects(bit))
    }

    /// OR across every requester's mask.
    pub fn combined_visualization_flags(&self) -> PathVisualizationFlags {
        self.enabled_bits
            .values()
            .fold(PathVisualizationFlags::empty(), |acc, mask| acc | *mask)
    }

    /// Drop a destroyed segment without touching its counters; the segment's
    /// own teardown already released the primitives.
    pub fn clear_segment(&mut self, key: SegmentKey) {
        self.applied_bits.remove(&key);
    }

    /// Per-tick pass: compute the desired per-segment bits for this observer
    /// and diff them against what is currently applied.
    pub fn update(
        &mut self,
        observer: &ObserverState,
        visualized_paths: &mut [PathVisualization],
        settings: &Settings,
    ) {
        let combined = self.combined_visualization_flags();

        let view_distances: [f32; 2] = [
            settings.view_distance_for(PathVisualizationFlags::VISUALIZATION),
            settings.view_distance_for(PathVisualizationFlags::COLLISION),
        ];

        let mut desired: HashMap<SegmentKey, PathVisualizationFlags> =
            HashMap::with_capacity(self.last_segment_count);
        let mut segment_count = 0usize;

        for visualization in visualized_paths.iter() {
            let path = visualization.path_id();
            for (index, segment) in visualization.segments().iter().enumerate() {
                segment_count += 1;
                for (type_index, bit) in PathVisualizationFlags::ALL_TYPES.into_iter().enumerate() {
                    if combined.intersects(bit)
                        && segment
                            .is_relevant_for_observer(observer.view_location, view_distances[type_index])
                    {
                        let key = SegmentKey {
                            path,
                            segment_index: index as u32,
                        };
                        *desired.entry(key).or_default() |= bit;
                    }
                }
            }
        }
        self.last_segment_count = segment_count;

        self.apply_visualization_bits(visualized_paths, &desired);
    }

    /// Release everything this tracker applied, then it can be discarded.
    pub fn destroy(&mut self, visualized_paths: &mut [PathVisualization]) {
        let empty = HashMap::new();
        self.apply_visualization_bits(visualized_paths, &empty);
        self.enabled_bits.clear();
    }

    /// Toggle exactly the bits that flipped between the applied state and
    /// the desired state, per segment.
    fn apply_visualization_bits(
        &mut self,
        visualized_paths: &mut [PathVisualization],
        desired: &HashMap<SegmentKey, PathVisualizationFlags>,
    ) {
        for visualization in visualized_paths.iter_mut() {
            let path = visualization.path_id();
            for (index, segment) in visualization.segments_mut().iter_mut().enumerate() {
                let key = SegmentKey {
                    path,
                    segment_index: index as u32,
                };
                let current = self.applied_bits.get(&key).copied().unwrap_or_default();
                let wanted = desired.get(&key).copied().unwrap_or_default();
                if current == wanted {
                    continue;
                }

                for bit in PathVisualizationFlags::ALL_TYPES {
                    let currently_on = current.intersects(bit);
                    let wanted_on = wanted.intersects(bit);
                    if currently_on == wanted_on {
                        continue;
                    }
                    if bit.intersects(PathVisualizationFlags::VISUALIZATION) {
                        segment.add_remove_visualization_request(!wanted_on);
                    }
                    if bit.intersects(PathVisualizationFlags::COLLISION) {
                        segment.add_remove_collision_request(!wanted_on);
                    }
                }

                if wanted.is_empty() {
                    self.applied_bits.remove(&key);
                } else {
                    self.applied_bits.insert(key, wanted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::paths::{PathManager, PathNode};
    use crate::paths::path_structs::PathId;
    use crate::render::recording::RecordingBackend;
    use glam::{Quat, Vec3};

    const VIS: PathVisualizationFlags = PathVisualizationFlags::VISUALIZATION;
    const COLL: PathVisualizationFlags = PathVisualizationFlags::COLLISION;

    fn observer(view_location: Vec3) -> ObserverState {
        ObserverState {
            view_location,
            local: true,
            interaction_distance: 1_000.0,
        }
    }

    fn observers_with(id: ObserverId, state: ObserverState) -> HashMap<ObserverId, ObserverState> {
        let mut map = HashMap::new();
        map.insert(id, state);
        map
    }

    /// A ready square path with its visualization updated once.
    fn visualized_square(
        manager: &mut PathManager,
        backend: &mut RecordingBackend,
        settings: &Settings,
    ) -> (PathId, PathVisualization) {
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
        let mut vis = PathVisualization::new(path, "square");
        let container = manager.path_mut(path).unwrap();
        vis.update(container, true, &mut [], backend, settings);
        (path, vis)
    }

    #[test]
    fn test_requester_entry_dropped_when_mask_empties() {
        let mut tracker = VisualizationTracker::new(ObserverId::new(0));

        tracker.set_visualization_bit("keybind", VIS, true);
        tracker.set_visualization_bit("keybind", COLL, true);
        assert!(tracker.get_visualization_bit("keybind", VIS));
        assert!(!tracker.is_empty());

        tracker.set_visualization_bit("keybind", VIS, false);
        assert!(!tracker.is_empty());
        tracker.set_visualization_bit("keybind", COLL, false);
        assert!(tracker.is_empty());
        assert!(!tracker.get_visualization_bit("keybind", COLL));
    }

    #[test]
    fn test_unknown_requester_reads_false() {
        let tracker = VisualizationTracker::new(ObserverId::new(0));
        assert!(!tracker.get_visualization_bit("never_set", VIS));
    }

    #[test]
    fn test_combined_flags_or_across_requesters() {
        let mut tracker = VisualizationTracker::new(ObserverId::new(0));
        tracker.set_visualization_bit("editor", VIS, true);
        tracker.set_visualization_bit("keybind", COLL, true);

        assert_eq!(tracker.combined_visualization_flags(), VIS | COLL);
    }

    #[test]
    fn test_update_applies_bits_to_segments_in_range() {
        let settings = Settings::default();
        let mut backend = RecordingBackend::new();
        let mut manager = PathManager::new();
        let (_, vis) = visualized_square(&mut manager, &mut backend, &settings);
        let mut paths = [vis];

        let mut tracker = VisualizationTracker::new(ObserverId::new(7));
        tracker.set_visualization_bit("keybind", VIS, true);
        tracker.update(&observer(Vec3::ZERO), &mut paths, &settings);

        for segment in paths[0].segments() {
            assert_eq!(segment.visualization_requests(), 1);
            assert_eq!(segment.collision_requests(), 0);
        }
    }

    #[test]
    fn test_distance_culling_per_type() {
        let settings = Settings {
            max_view_distance_visualization: Some(100_000.0),
            max_view_distance_collision: Some(10.0),
            ..Settings::default()
        };
        let mut backend = RecordingBackend::new();
        let mut manager = PathManager::new();
        let (_, vis) = visualized_square(&mut manager, &mut backend, &settings);
        let mut paths = [vis];

        let mut tracker = VisualizationTracker::new(ObserverId::new(7));
        tracker.set_visualization_bit("keybind", VIS | COLL, true);
        // Observer far from every node but within the huge visualization
        // range: visualization applies, collision does not.
        tracker.update(&observer(Vec3::new(5_000.0, 0.0, 0.0)), &mut paths, &settings);

        for segment in paths[0].segments() {
            assert_eq!(segment.visualization_requests(), 1);
            assert_eq!(segment.collision_requests(), 0);
        }
    }

    #[test]
    fn test_removing_last_requester_releases_on_next_update() {
        let settings = Settings::default();
        let mut backend = RecordingBackend::new();
        let mut manager = PathManager::new();
        let (_, vis) = visualized_square(&mut manager, &mut backend, &settings);
        let mut paths = [vis];

        let mut tracker = VisualizationTracker::new(ObserverId::new(7));
        tracker.set_visualization_bit("keybind", VIS, true);
        tracker.update(&observer(Vec3::ZERO), &mut paths, &settings);
        assert_eq!(paths[0].segments()[0].visualization_requests(), 1);

        tracker.set_visualization_bit("keybind", VIS, false);
        tracker.update(&observer(Vec3::ZERO), &mut paths, &settings);

        for segment in paths[0].segments() {
            assert_eq!(segment.visualization_requests(), 0);
        }
        assert!(tracker.applied_bits.is_empty());
    }

    #[test]
    fn test_two_trackers_share_refcounts() {
        let settings = Settings::default();
        let mut backend = RecordingBackend::new();
        let mut manager = PathManager::new();
        let (_, vis) = visualized_square(&mut manager, &mut backend, &settings);
        let mut paths = [vis];

        let mut first = VisualizationTracker::new(ObserverId::new(1));
        let mut second = VisualizationTracker::new(ObserverId::new(2));
        first.set_visualization_bit("keybind", COLL, true);
        second.set_visualization_bit("editor", COLL, true);

        first.update(&observer(Vec3::ZERO), &mut paths, &settings);
        second.update(&observer(Vec3::ZERO), &mut paths, &settings);
        assert_eq!(paths[0].segments()[0].collision_requests(), 2);

        // Dropping one tracker leaves the other's request intact.
        first.destroy(&mut paths);
        assert_eq!(paths[0].segments()[0].collision_requests(), 1);

        second.destroy(&mut paths);
        assert_eq!(paths[0].segments()[0].collision_requests(), 0);
    }

    #[test]
    fn test_invalid_tracker_detected() {
        let tracker = VisualizationTracker::new(ObserverId::new(3));

        let mut observers = observers_with(ObserverId::new(3), observer(Vec3::ZERO));
        assert!(tracker.is_valid(&observers));

        observers.get_mut(&ObserverId::new(3)).unwrap().local = false;
        assert!(!tracker.is_valid(&observers));

        observers.clear();
        assert!(!tracker.is_valid(&observers));
    }

    #[test]
    fn test_cleared_segment_is_forgotten_without_toggle() {
        let settings = Settings::default();
        let mut backend = RecordingBackend::new();
        let mut manager = PathManager::new();
        let (path, vis) = visualized_square(&mut manager, &mut backend, &settings);
        let mut paths = [vis];

        let mut tracker = VisualizationTracker::new(ObserverId::new(1));
        tracker.set_visualization_bit("keybind", VIS, true);
        tracker.update(&observer(Vec3::ZERO), &mut paths, &settings);
        assert_eq!(tracker.applied_bits.len(), 4);

        tracker.clear_segment(SegmentKey {
            path,
            segment_index: 0,
        });
        assert_eq!(tracker.applied_bits.len(), 3);
        // The segment's counter is untouched; its teardown owns the release.
        assert_eq!(paths[0].segments()[0].visualization_requests(), 1);
    }
}
