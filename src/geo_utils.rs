//! # Geographic Utilities
//!
//! Geometry primitives used by every stage of walk refinement.
//!
//! All functions take WGS84 coordinates (latitude/longitude in degrees) and return
//! distances in meters. They operate on plain in-memory slices so each stage can be
//! tested without a spatial database.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`geodesic_distance`] | Distance on the WGS84 spheroid |
//! | [`polyline_length`] | Spheroid-aware length of a track |
//! | [`haversine_length`] | Spherical length of a track |
//! | [`point_to_segment_distance`] | Distance from a point to a segment |
//! | [`point_to_line_distance`] | Distance from a point to a polyline |
//! | [`interpolate`] | Coordinate between two points |
//! | [`compute_bounds`] | Bounding box of a track |
//! | [`compute_center`] | Centroid of a track |
//!
//! ## Example
//!
//! ```rust
//! use walk_refiner::{GpsPoint, geo_utils};
//!
//! let walk = vec![
//!     GpsPoint::new(37.5665, 126.9780),
//!     GpsPoint::new(37.5670, 126.9785),
//!     GpsPoint::new(37.5676, 126.9791),
//! ];
//!
//! let length = geo_utils::polyline_length(&walk);
//! assert!(length > 100.0 && length < 200.0);
//!
//! let off_path = GpsPoint::new(37.5670, 126.9800);
//! let deviation = geo_utils::point_to_line_distance(&off_path, &walk).unwrap();
//! assert!(deviation > 50.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Spheroid vs sphere
//!
//! Point-to-point checks (teleport rejection, deviation) use the haversine formula.
//! Reported lengths use the geodesic distance on the WGS84 spheroid
//! (a = 6378137 m, f = 1/298.257223563), the same convention the rest of the
//! system stores distances in. The two differ by up to ~0.5%.
//!
//! ### Point to segment
//!
//! The closest point of a segment is located in a local equirectangular plane
//! centred on the query point, then measured with haversine. At walking scale the
//! projection error is far below GPS noise. Segments crossing the antimeridian are
//! not handled.

use geo::{Distance, Geodesic, Haversine, Point};
use crate::{GpsPoint, Bounds};

/// Mean Earth radius used for the local planar projection (meters).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface. Symmetric, and zero
/// for identical points.
///
/// # Example
///
/// ```rust
/// use walk_refiner::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 0.5);
///
/// let distance = geo_utils::haversine_distance(&a, &b);
/// assert!((distance - 55_597.0).abs() < 100.0); // ~55.6 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Haversine::distance(to_point(p1), to_point(p2))
}

/// Calculate the distance between two GPS points on the WGS84 spheroid.
///
/// Uses Karney's geodesic algorithm, accurate to a few nanometers.
#[inline]
pub fn geodesic_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    Geodesic::distance(to_point(p1), to_point(p2))
}

/// Calculate the total length of a polyline in meters on the WGS84 spheroid.
///
/// Sums the geodesic distance between consecutive points. Empty or single-point
/// tracks return 0.0.
///
/// # Example
///
/// ```rust
/// use walk_refiner::{GpsPoint, geo_utils};
///
/// let track = vec![
///     GpsPoint::new(37.5665, 126.9780),
///     GpsPoint::new(37.5666, 126.9780),
/// ];
///
/// let length = geo_utils::polyline_length(&track);
/// assert!((length - 11.1).abs() < 0.1);
/// ```
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| geodesic_distance(&w[0], &w[1]))
        .sum()
}

/// Total length of a polyline using the spherical (haversine) model.
pub fn haversine_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Linear interpolation between two coordinates.
///
/// `t = 0.0` returns `a`, `t = 1.0` returns `b`. Accurate for the short segments
/// of a walk; not a great-circle interpolation.
#[inline]
pub fn interpolate(a: &GpsPoint, b: &GpsPoint, t: f64) -> GpsPoint {
    GpsPoint::new(
        a.latitude + t * (b.latitude - a.latitude),
        a.longitude + t * (b.longitude - a.longitude),
    )
}

/// Distance in meters from `point` to the closest point of the segment `start`-`end`.
///
/// A zero-length segment degenerates to the distance between `point` and `start`.
pub fn point_to_segment_distance(point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64 {
    let t = closest_fraction(point, start, end);
    haversine_distance(point, &interpolate(start, end, t))
}

/// Minimum distance in meters from a point to any segment of a polyline.
///
/// Returns `None` for an empty line. A single-point line yields the distance to
/// that point.
///
/// # Example
///
/// ```rust
/// use walk_refiner::{GpsPoint, geo_utils};
///
/// let course = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.01)];
/// let beside = GpsPoint::new(0.001, 0.005); // ~111m north of the middle
///
/// let d = geo_utils::point_to_line_distance(&beside, &course).unwrap();
/// assert!((d - 111.2).abs() < 1.0);
/// ```
pub fn point_to_line_distance(point: &GpsPoint, line: &[GpsPoint]) -> Option<f64> {
    match line {
        [] => None,
        [only] => Some(haversine_distance(point, only)),
        _ => line
            .windows(2)
            .map(|w| point_to_segment_distance(point, &w[0], &w[1]))
            .reduce(f64::min),
    }
}

/// Fraction along `start`-`end` of the point closest to `point`, clamped to [0, 1].
///
/// Computed in a local equirectangular plane centred on `point`.
fn closest_fraction(point: &GpsPoint, start: &GpsPoint, end: &GpsPoint) -> f64 {
    let scale_x = point.latitude.to_radians().cos();

    let ax = (start.longitude - point.longitude) * scale_x;
    let ay = start.latitude - point.latitude;
    let dx = (end.longitude - start.longitude) * scale_x;
    let dy = end.latitude - start.latitude;

    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON * f64::EPSILON {
        return 0.0;
    }

    (-(ax * dx + ay * dy) / len_sq).clamp(0.0, 1.0)
}

/// Project a point into a local planar frame (meters) around `origin`.
///
/// x grows east, y grows north. Used to index course segments spatially.
#[inline]
pub fn project_local(point: &GpsPoint, origin: &GpsPoint) -> [f64; 2] {
    let meters_per_degree = EARTH_RADIUS_M.to_radians();
    let scale_x = origin.latitude.to_radians().cos();
    [
        (point.longitude - origin.longitude) * scale_x * meters_per_degree,
        (point.latitude - origin.latitude) * meters_per_degree,
    ]
}

#[inline]
fn to_point(p: &GpsPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a GPS track.
///
/// For empty input, returns an inverted bounds (min > max); use
/// [`Bounds::from_points`] to get `None` instead.
///
/// # Example
///
/// ```rust
/// use walk_refiner::{GpsPoint, geo_utils};
///
/// let track = vec![
///     GpsPoint::new(51.5000, -0.1300),
///     GpsPoint::new(51.5100, -0.1200),
///     GpsPoint::new(51.5050, -0.1250),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track);
/// assert_eq!(bounds.min_lat, 51.5000);
/// assert_eq!(bounds.max_lng, -0.1200);
/// ```
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Compute the arithmetic centroid of a GPS track.
///
/// Returns (0, 0) for empty input. Suitable for the small areas a walk covers;
/// tracks crossing the antimeridian give meaningless results.
pub fn compute_center(points: &[GpsPoint]) -> GpsPoint {
    if points.is_empty() {
        return GpsPoint::new(0.0, 0.0);
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    GpsPoint::new(sum_lat / n, sum_lng / n)
}

// =============================================================================
// Unit Tests
// =============================================================================
