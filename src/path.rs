//! Path building and walk metrics.
//!
//! A [`RefinedPath`] is what gets persisted for a walk: the polyline through the
//! retained fixes (optionally densified for smooth rendering) together with its
//! length and elapsed time.

use crate::geo_utils::{compute_bounds, haversine_distance, interpolate, polyline_length};
use crate::{Bounds, GpsPoint, RawFix};

/// Build the polyline connecting fixes in order.
pub fn build_path(fixes: &[RawFix]) -> Vec<GpsPoint> {
    fixes.iter().map(RawFix::point).collect()
}

/// Split every segment longer than `max_segment_m` into equal sub-segments.
///
/// Original vertices are kept and interpolated points are inserted between them,
/// so no segment of the result exceeds `max_segment_m`. The total length changes
/// only by interpolation error (well under 0.1%).
///
/// A non-positive or non-finite `max_segment_m` returns the input unchanged.
///
/// # Example
/// ```
/// use walk_refiner::{densify, GpsPoint};
///
/// // ~111m segment becomes 12 pieces of ~9.3m
/// let line = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.001, 0.0)];
/// let dense = densify(&line, 10.0);
/// assert_eq!(dense.len(), 13);
/// assert_eq!(dense.first(), line.first());
/// assert_eq!(dense.last(), line.last());
/// ```
pub fn densify(points: &[GpsPoint], max_segment_m: f64) -> Vec<GpsPoint> {
    if points.len() < 2 || !max_segment_m.is_finite() || max_segment_m <= 0.0 {
        return points.to_vec();
    }

    let mut result = Vec::with_capacity(points.len());
    result.push(points[0]);

    for w in points.windows(2) {
        let (start, end) = (&w[0], &w[1]);
        let dist = haversine_distance(start, end);

        if dist > max_segment_m {
            let pieces = (dist / max_segment_m).ceil() as usize;
            for j in 1..pieces {
                result.push(interpolate(start, end, j as f64 / pieces as f64));
            }
        }

        result.push(*end);
    }

    result
}

/// Round to 2 decimal places (half away from zero).
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Distance and duration of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathMetrics {
    /// Spheroid length in meters, rounded to 2 decimals
    pub total_distance_m: f64,
    /// Last timestamp minus first timestamp, whole seconds
    pub total_duration_s: i64,
}

impl PathMetrics {
    /// Compute metrics for timestamp-ordered fixes.
    ///
    /// Fewer than 2 fixes give zero distance and zero duration.
    pub fn compute(fixes: &[RawFix]) -> Self {
        let total_distance_m = round2(polyline_length(&build_path(fixes)));

        let total_duration_s = match (fixes.first(), fixes.last()) {
            (Some(first), Some(last)) if fixes.len() >= 2 => {
                (last.timestamp - first.timestamp).num_seconds().max(0)
            }
            _ => 0,
        };

        Self { total_distance_m, total_duration_s }
    }
}

/// The persisted geometry and metrics of a walk.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefinedPath {
    /// Polyline in walk order, densified when configured
    pub points: Vec<GpsPoint>,
    /// Spheroid length in meters, rounded to 2 decimals
    pub total_distance_m: f64,
    /// Elapsed time in whole seconds
    pub total_duration_s: i64,
}

impl RefinedPath {
    /// Build a path from timestamp-ordered fixes.
    ///
    /// Metrics are measured on the fixes themselves; densification only adds
    /// rendering vertices.
    pub fn from_fixes(fixes: &[RawFix], max_segment_m: Option<f64>) -> Self {
        let metrics = PathMetrics::compute(fixes);
        let line = build_path(fixes);
        let points = match max_segment_m {
            Some(max) => densify(&line, max),
            None => line,
        };

        Self {
            points,
            total_distance_m: metrics.total_distance_m,
            total_duration_s: metrics.total_duration_s,
        }
    }

    /// Zero-length, zero-duration path for walks with no usable fixes.
    pub fn empty() -> Self {
        Self {
            points: Vec::new(),
            total_distance_m: 0.0,
            total_duration_s: 0,
        }
    }

    pub fn metrics(&self) -> PathMetrics {
        PathMetrics {
            total_distance_m: self.total_distance_m,
            total_duration_s: self.total_duration_s,
        }
    }

    /// Bounding box for map framing, `None` when the path is empty.
    pub fn bounds(&self) -> Option<Bounds> {
        if self.points.is_empty() {
            return None;
        }
        Some(compute_bounds(&self.points))
    }

    /// Copy of the points with no segment longer than `max_segment_m`, for
    /// smooth rendering. Metrics are unaffected.
    pub fn densified(&self, max_segment_m: f64) -> Vec<GpsPoint> {
        densify(&self.points, max_segment_m)
    }

    /// A path needs two points to be drawn as a line.
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }
}
