//! # Walk Refiner
//!
//! GPS walk-trace refinement for a dog-walking service.
//!
//! This library turns the raw, noisy fixes recorded during a walk into:
//! - A cleaned polyline (sorted, deduplicated, teleport-free, densified)
//! - Distance and duration metrics on the WGS84 spheroid
//! - For walks on a registered course, a deviation analysis against the course
//!
//! ## Features
//!
//! - **`parallel`** - Refine many walks at once with rayon
//! - **`serde`** - Serde derives on public types and GeoJSON export
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use walk_refiner::{refine_trace, GpsPoint, RawFix, RefineConfig};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap();
//! let raw: Vec<RawFix> = (0..5)
//!     .map(|i| RawFix::new(37.5665 + i as f64 * 0.0001, 126.9780, t0 + Duration::seconds(i * 8)))
//!     .collect();
//! let course: Vec<GpsPoint> = raw.iter().map(|f| f.point()).collect();
//!
//! let refinement = refine_trace(&raw, Some(course.as_slice()), &RefineConfig::default());
//!
//! assert!(refinement.is_course_matched());
//! assert_eq!(refinement.path.total_duration_s, 32);
//! assert_eq!(refinement.report.unwrap().deviating_points, 0);
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod geo_utils;

// Trace cleaning: sort, dedupe, teleport rejection
pub mod preprocess;
pub use preprocess::{preprocess, CleanTrace, PreprocessStats};

// Polyline construction, densification and metrics
pub mod path;
pub use path::{build_path, densify, round2, PathMetrics, RefinedPath};

// Course deviation matching
pub mod deviation;
pub use deviation::{
    match_to_course, CourseIndex, CourseMatch, DeviationReport, MatchError,
    HARD_DEVIATION_THRESHOLD_M, SOFT_DEVIATION_THRESHOLD_M,
};

// Storage ports
pub mod store;
pub use store::{MemoryStore, StoreError, WalkStore};

// Refinement orchestration
pub mod refine;
pub use refine::{
    refine_trace, FallbackReason, RefineError, RefineMode, Refinement, RefinementOutcome,
    RefinementState, Refiner, WalkRequest,
};

// GeoJSON export for clients
#[cfg(feature = "serde")]
pub mod geojson;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use walk_refiner::GpsPoint;
/// let point = GpsPoint::new(37.5665, 126.9780); // Seoul
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// A single GPS reading recorded during a walk.
///
/// Fixes are append-only while the walk is active and are ordered by
/// `timestamp`, not by the order they arrived in.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawFix {
    /// Create a fix from coordinates and a UTC instant.
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self { latitude, longitude, timestamp }
    }

    /// Create a fix from an RFC 3339 timestamp as stored by the tracking endpoint.
    ///
    /// # Example
    /// ```
    /// use walk_refiner::RawFix;
    ///
    /// let fix = RawFix::from_rfc3339(37.5665, 126.9780, "2024-05-01T07:30:00+09:00").unwrap();
    /// assert_eq!(fix.timestamp.to_rfc3339(), "2024-04-30T22:30:00+00:00");
    ///
    /// assert!(RawFix::from_rfc3339(37.5665, 126.9780, "yesterday").is_err());
    /// ```
    pub fn from_rfc3339(latitude: f64, longitude: f64, timestamp: &str) -> Result<Self, TraceError> {
        let parsed = DateTime::parse_from_rfc3339(timestamp).map_err(|source| {
            TraceError::InvalidTimestamp {
                value: timestamp.to_string(),
                source,
            }
        })?;
        Ok(Self::new(latitude, longitude, parsed.with_timezone(&Utc)))
    }

    /// The fix's position.
    #[inline]
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// Errors raised while decoding raw trace data at the storage boundary.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid RFC 3339 timestamp {value:?}: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Configuration for walk refinement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RefineConfig {
    /// Jumps from the previous retained fix longer than this are GPS glitches
    /// and the fix is dropped.
    /// Default: 1000.0 meters
    pub teleport_threshold_m: f64,

    /// Maximum segment length of the persisted path. Longer segments get
    /// interpolated points. `None` persists the polyline through the retained
    /// fixes; renderers can densify on their own with [`RefinedPath::densified`].
    /// Default: None
    pub max_segment_m: Option<f64>,

    /// Points farther than this from the course are dropped from the refined path.
    /// Default: 100.0 meters ([`HARD_DEVIATION_THRESHOLD_M`])
    pub deviation_threshold_m: f64,

    /// Threshold used by the analytics deviation report.
    /// Default: 20.0 meters ([`SOFT_DEVIATION_THRESHOLD_M`])
    pub report_threshold_m: f64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            teleport_threshold_m: 1000.0,
            max_segment_m: None,
            deviation_threshold_m: HARD_DEVIATION_THRESHOLD_M,
            report_threshold_m: SOFT_DEVIATION_THRESHOLD_M,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(37.5665, 126.9780).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        assert!(Bounds::from_points(&[]).is_none());

        let bounds = Bounds::from_points(&[
            GpsPoint::new(37.50, 126.90),
            GpsPoint::new(37.60, 127.00),
        ])
        .unwrap();
        let center = bounds.center();
        assert!((center.latitude - 37.55).abs() < 1e-9);
        assert!((center.longitude - 126.95).abs() < 1e-9);
    }

    #[test]
    fn test_fix_from_rfc3339_normalizes_to_utc() {
        let fix = RawFix::from_rfc3339(1.0, 2.0, "2024-05-01T09:00:05+09:00").unwrap();
        assert_eq!(fix.timestamp, Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 5).unwrap());
        assert_eq!(fix.point(), GpsPoint::new(1.0, 2.0));
    }

    #[test]
    fn test_fix_from_rfc3339_rejects_garbage() {
        let err = RawFix::from_rfc3339(1.0, 2.0, "2024-05-01 09:00").unwrap_err();
        assert!(err.to_string().contains("2024-05-01 09:00"));
    }

    #[test]
    fn test_default_config() {
        let config = RefineConfig::default();
        assert_eq!(config.teleport_threshold_m, 1000.0);
        assert_eq!(config.max_segment_m, None);
        assert_eq!(config.deviation_threshold_m, 100.0);
        assert_eq!(config.report_threshold_m, 20.0);
    }
}
