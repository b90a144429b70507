//! Per-container visualization: reconciles the segment list against the node
//! count every refresh and keeps segment geometry current.

use crate::data::Settings;
use crate::paths::path_structs::{PathId, SegmentKey};
use crate::paths::paths::PathContainer;
use crate::paths::segment_visualization::{SegmentStyle, SegmentVisualization, VisualAnchor};
use crate::paths::visualization_tracker::VisualizationTracker;
use crate::render::VisualizationBackend;

/// FNV-1a over the container name. Stable across sessions, so the derived
/// color never has to be stored.
fn stable_name_hash(name: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in name.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Hue from the identity hash; saturation and value are fixed so randomized
/// colors do not wash out.
fn color_for_path_name(name: &str) -> [f32; 3] {
    let hash = stable_name_hash(name);
    let hue = (hash >> 11) as f32 / (u64::MAX >> 11) as f32;
    crate::helpers::hsv::hsv_to_rgb(hue, 0.9, 0.5)
}

pub struct PathVisualization {
    path_id: PathId,
    segments: Vec<SegmentVisualization>,
    anchor: VisualAnchor,
    color: [f32; 3],
}

impl PathVisualization {
    pub fn new(path_id: PathId, path_name: &str) -> Self {
        Self {
            path_id,
            segments: Vec::new(),
            anchor: VisualAnchor::new(),
            color: color_for_path_name(path_name),
        }
    }

    #[inline]
    pub fn path_id(&self) -> PathId {
        self.path_id
    }

    #[inline]
    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    #[inline]
    pub fn segments(&self) -> &[SegmentVisualization] {
        &self.segments
    }

    #[inline]
    pub fn segments_mut(&mut self) -> &mut [SegmentVisualization] {
        &mut self.segments
    }

    pub fn segment_by_index(&self, segment_index: usize) -> Option<&SegmentVisualization> {
        self.segments.get(segment_index)
    }

    /// Segment that starts at the given node, by loop position.
    pub fn segment_index_for_node(
        &self,
        container: &PathContainer,
        node: crate::paths::path_structs::NodeId,
    ) -> Option<usize> {
        container.node_index(node).filter(|i| *i < self.segments.len())
    }

    /// Per-tick refresh: derive missing curve data, reconcile the segment
    /// count with the node count, then refresh and rebuild segments.
    pub fn update(
        &mut self,
        container: &mut PathContainer,
        has_authority: bool,
        trackers: &mut [VisualizationTracker],
        backend: &mut dyn VisualizationBackend,
        settings: &Settings,
    ) {
        // Derive, then build; each step is a no-op when already satisfied.
        if container.path().is_none() && container.is_complete() {
            if !container.has_data() && has_authority {
                container.calculate_node_count();
            }
            if container.has_data() {
                container.rebuild_curve();
            }
        }

        if container.path().is_none() {
            // Curve is gone: drop to the empty-but-valid state, ready to
            // rebuild once the loop is complete again.
            if !self.segments.is_empty() || self.anchor.id().is_some() {
                self.teardown(backend, trackers);
            }
            return;
        }

        let target_count = container.node_count();
        if target_count != self.segments.len() {
            while self.segments.len() > target_count {
                if let Some(mut segment) = self.segments.pop() {
                    segment.destroy(backend);
                    let key = SegmentKey {
                        path: self.path_id,
                        segment_index: self.segments.len() as u32,
                    };
                    for tracker in trackers.iter_mut() {
                        tracker.clear_segment(key);
                    }
                }
            }
            while self.segments.len() < target_count {
                self.segments.push(SegmentVisualization::new(self.segments.len()));
            }
        }

        let Some(spline) = container.path() else {
            return;
        };
        let style = SegmentStyle {
            settings,
            path_name: container.name(),
            color: self.color,
        };
        for segment in &mut self.segments {
            segment.refresh_geometry(spline);
            if !segment.is_up_to_date() {
                segment.update(spline, backend, &mut self.anchor, &style);
            }
        }
    }

    /// Release all segments and the anchor. The visualization itself stays
    /// alive unless its container is gone.
    pub fn teardown(
        &mut self,
        backend: &mut dyn VisualizationBackend,
        trackers: &mut [VisualizationTracker],
    ) {
        for (index, segment) in self.segments.iter_mut().enumerate() {
            segment.destroy(backend);
            let key = SegmentKey {
                path: self.path_id,
                segment_index: index as u32,
            };
            for tracker in trackers.iter_mut() {
                tracker.clear_segment(key);
            }
        }
        self.segments.clear();
        self.anchor.destroy(backend);
    }
}
