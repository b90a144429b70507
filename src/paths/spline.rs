//! Piecewise cubic Hermite curve threaded through a closed node loop.
//!
//! The curve is parameterized by input key, where whole keys land exactly on
//! curve points. The point sequence prefixes the loop with its last
//! [`NUM_BACKTRACK_POINTS`] node positions and appends the first node again,
//! so the span starting at key `NUM_BACKTRACK_POINTS + i` always covers
//! segment `i` with loop-continuous tangents on both ends, wraparound
//! included.

use glam::Vec3;

/// Leading curve points that belong to the tail of the loop, not to segment 0.
pub const NUM_BACKTRACK_POINTS: usize = 2;

/// Arc length lookup samples per curve span.
const ARC_SAMPLES_PER_SPAN: usize = 8;

pub struct PathSpline {
    points: Vec<Vec3>,
    tangents: Vec<Vec3>,
    /// Cumulative arc length at key `i / ARC_SAMPLES_PER_SPAN`.
    arc_lengths: Vec<f32>,
}

impl PathSpline {
    /// Build the curve for a closed loop of node positions, in loop order.
    /// Returns `None` for fewer than two nodes.
    pub fn from_loop(node_positions: &[Vec3]) -> Option<Self> {
        let count = node_positions.len();
        if count < 2 {
            return None;
        }

        // Point i maps to node (i + count - NUM_BACKTRACK_POINTS) mod count.
        let total_points = count + NUM_BACKTRACK_POINTS + 1;
        let mut points = Vec::with_capacity(total_points);
        let mut tangents = Vec::with_capacity(total_points);

        for i in 0..total_points {
            let node_index = (i + 2 * count - NUM_BACKTRACK_POINTS) % count;
            let prev = node_positions[(node_index + count - 1) % count];
            let next = node_positions[(node_index + 1) % count];

            points.push(node_positions[node_index]);
            tangents.push((next - prev) * 0.5);
        }

        let mut spline = Self {
            points,
            tangents,
            arc_lengths: Vec::new(),
        };
        spline.rebuild_arc_lengths();
        Some(spline)
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn max_key(&self) -> f32 {
        (self.points.len() - 1) as f32
    }

    #[inline]
    pub fn location_at_point(&self, point_index: usize) -> Vec3 {
        self.points[point_index]
    }

    #[inline]
    pub fn tangent_at_point(&self, point_index: usize) -> Vec3 {
        self.tangents[point_index]
    }

    /// Index of the curve point at or before the given key.
    #[inline]
    pub fn point_index_for_key(&self, key: f32) -> usize {
        (key.floor().max(0.0) as usize).min(self.points.len().saturating_sub(2))
    }

    pub fn location_at_key(&self, key: f32) -> Vec3 {
        let (span, u) = self.span_and_fraction(key);
        self.hermite(span, u)
    }

    /// Normalized curve direction at the given key.
    pub fn direction_at_key(&self, key: f32) -> Vec3 {
        let (span, u) = self.span_and_fraction(key);
        self.hermite_derivative(span, u).normalize_or_zero()
    }

    /// Arc length from the start of the curve to the given key.
    pub fn distance_at_key(&self, key: f32) -> f32 {
        let samples = &self.arc_lengths;
        if samples.is_empty() {
            return 0.0;
        }

        let scaled = (key.clamp(0.0, self.max_key()) * ARC_SAMPLES_PER_SPAN as f32).max(0.0);
        let index = (scaled.floor() as usize).min(samples.len() - 1);
        if index + 1 >= samples.len() {
            return samples[index];
        }
        let frac = scaled - index as f32;
        samples[index] + (samples[index + 1] - samples[index]) * frac
    }

    /// Curve key closest to a world location. Coarse pass over the arc
    /// samples, then a bisection refinement around the winner.
    pub fn closest_key_to_location(&self, location: Vec3) -> f32 {
        let step = 1.0 / ARC_SAMPLES_PER_SPAN as f32;
        let mut best_key = 0.0;
        let mut best_dist = f32::INFINITY;

        let sample_count = (self.points.len() - 1) * ARC_SAMPLES_PER_SPAN + 1;
        for i in 0..sample_count {
            let key = (i as f32 * step).min(self.max_key());
            let dist = self.location_at_key(key).distance_squared(location);
            if dist < best_dist {
                best_dist = dist;
                best_key = key;
            }
        }

        let mut low = (best_key - step).max(0.0);
        let mut high = (best_key + step).min(self.max_key());
        for _ in 0..24 {
            let mid_low = low + (high - low) / 3.0;
            let mid_high = high - (high - low) / 3.0;
            let dist_low = self.location_at_key(mid_low).distance_squared(location);
            let dist_high = self.location_at_key(mid_high).distance_squared(location);
            if dist_low < dist_high {
                high = mid_high;
            } else {
                low = mid_low;
            }
        }
        (low + high) * 0.5
    }

    fn span_and_fraction(&self, key: f32) -> (usize, f32) {
        let clamped = key.clamp(0.0, self.max_key());
        let span = (clamped.floor() as usize).min(self.points.len().saturating_sub(2));
        (span, clamped - span as f32)
    }

    fn hermite(&self, span: usize, u: f32) -> Vec3 {
        let p0 = self.points[span];
        let p1 = self.points[span + 1];
        let m0 = self.tangents[span];
        let m1 = self.tangents[span + 1];

        let u2 = u * u;
        let u3 = u2 * u;
        p0 * (2.0 * u3 - 3.0 * u2 + 1.0)
            + m0 * (u3 - 2.0 * u2 + u)
            + p1 * (-2.0 * u3 + 3.0 * u2)
            + m1 * (u3 - u2)
    }

    fn hermite_derivative(&self, span: usize, u: f32) -> Vec3 {
        let p0 = self.points[span];
        let p1 = self.points[span + 1];
        let m0 = self.tangents[span];
        let m1 = self.tangents[span + 1];

        let u2 = u * u;
        p0 * (6.0 * u2 - 6.0 * u)
            + m0 * (3.0 * u2 - 4.0 * u + 1.0)
            + p1 * (-6.0 * u2 + 6.0 * u)
            + m1 * (3.0 * u2 - 2.0 * u)
    }

    fn rebuild_arc_lengths(&mut self) {
        let sample_count = (self.points.len() - 1) * ARC_SAMPLES_PER_SPAN + 1;
        let step = 1.0 / ARC_SAMPLES_PER_SPAN as f32;

        self.arc_lengths.clear();
        self.arc_lengths.reserve(sample_count);
        self.arc_lengths.push(0.0);

        let mut previous = self.location_at_key(0.0);
        let mut accumulated = 0.0;
        for i in 1..sample_count {
            let key = (i as f32 * step).min(self.max_key());
            let current = self.location_at_key(key);
            accumulated += previous.distance(current);
            self.arc_lengths.push(accumulated);
            previous = current;
        }
    }
}
