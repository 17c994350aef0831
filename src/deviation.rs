//! # Course Deviation Matching
//!
//! Compares a preprocessed walk against the reference geometry of a registered
//! course.
//!
//! ## Algorithm
//! 1. Project the course into a local metric plane and bulk-load its segments
//!    into an R-tree ([`CourseIndex`])
//! 2. For every trace point, walk the nearest segments in the tree and take the
//!    exact haversine distance to the closest one
//! 3. Points farther than the threshold are deviating
//! 4. The on-course points (in timestamp order) form the refined path
//! 5. The [`DeviationReport`] summarises distances over ALL points, not just
//!    the on-course survivors
//!
//! ## Thresholds
//! Two tiers are in use: [`SOFT_DEVIATION_THRESHOLD_M`] for analytics and
//! [`HARD_DEVIATION_THRESHOLD_M`] for filtering the persisted path. The matcher
//! itself takes the threshold as a parameter.

use log::debug;
use rstar::primitives::{GeomWithData, Line};
use rstar::{PointDistance, RTree};
use thiserror::Error;

use crate::geo_utils::{compute_center, haversine_length, point_to_segment_distance, project_local};
use crate::path::{round2, RefinedPath};
use crate::{GpsPoint, RawFix};

/// Deviation threshold for the analytics report (meters).
pub const SOFT_DEVIATION_THRESHOLD_M: f64 = 20.0;

/// Deviation threshold for filtering the persisted path (meters).
pub const HARD_DEVIATION_THRESHOLD_M: f64 = 100.0;

/// Candidates farther than `best * (1 + slack) + margin` in the projected plane
/// cannot beat the current best segment.
const PLANAR_SLACK: f64 = 0.05;
const PLANAR_MARGIN_M: f64 = 1.0;

/// Failures inside the matcher. The orchestrator recovers from all of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("course geometry is degenerate ({points} usable points, zero length or fewer than 2)")]
    DegenerateCourse { points: usize },
    #[error("course geometry has an invalid coordinate at index {index}")]
    InvalidCoordinate { index: usize },
    #[error("deviation threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f64),
}

/// Summary of how far a walk strayed from its course.
///
/// Invariants: `0 <= deviation_percentage <= 100` and
/// `min_distance <= avg_distance <= max_distance`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DeviationReport {
    pub total_points: usize,
    pub deviating_points: usize,
    /// Share of deviating points, rounded to 2 decimals
    pub deviation_percentage: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    pub avg_distance: f64,
}

impl DeviationReport {
    /// Build a report from per-point distances to the course.
    ///
    /// An empty input gives an all-zero report.
    ///
    /// # Example
    /// ```
    /// use walk_refiner::DeviationReport;
    ///
    /// let report = DeviationReport::from_distances(&[2.0, 4.0, 150.0, 3.0], 100.0);
    /// assert_eq!(report.deviating_points, 1);
    /// assert_eq!(report.deviation_percentage, 25.0);
    /// assert_eq!(report.max_distance, 150.0);
    /// ```
    pub fn from_distances(distances: &[f64], threshold_m: f64) -> Self {
        if distances.is_empty() {
            return Self::default();
        }

        let total_points = distances.len();
        let deviating_points = distances.iter().filter(|&&d| d > threshold_m).count();
        let min_distance = distances.iter().copied().fold(f64::INFINITY, f64::min);
        let max_distance = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = distances.iter().sum::<f64>() / total_points as f64;

        Self {
            total_points,
            deviating_points,
            deviation_percentage: round2(deviating_points as f64 * 100.0 / total_points as f64),
            min_distance,
            max_distance,
            // Summation error can push the mean a ulp outside [min, max]
            avg_distance: mean.clamp(min_distance, max_distance),
        }
    }
}

/// Result of matching one walk against one course.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseMatch {
    /// Distance from each preprocessed point to the course, in trace order
    pub distances: Vec<f64>,
    /// Points within the threshold, in timestamp order
    pub on_course: Vec<RawFix>,
    /// Statistics over all points
    pub report: DeviationReport,
}

impl CourseMatch {
    /// Path through the on-course points, or `None` when fewer than 2 survived.
    pub fn refined_path(&self, max_segment_m: Option<f64>) -> Option<RefinedPath> {
        if self.on_course.len() < 2 {
            return None;
        }
        Some(RefinedPath::from_fixes(&self.on_course, max_segment_m))
    }
}

type IndexedSegment = GeomWithData<Line<[f64; 2]>, usize>;

/// Spatial index over the segments of a course's reference geometry.
///
/// Build once per course and reuse for every point of a walk.
pub struct CourseIndex {
    geometry: Vec<GpsPoint>,
    origin: GpsPoint,
    tree: RTree<IndexedSegment>,
}

impl CourseIndex {
    /// Validate a course geometry and index its segments.
    pub fn new(geometry: &[GpsPoint]) -> Result<Self, MatchError> {
        if let Some(index) = geometry.iter().position(|p| !p.is_valid()) {
            return Err(MatchError::InvalidCoordinate { index });
        }
        if geometry.len() < 2 || haversine_length(geometry) <= 0.0 {
            return Err(MatchError::DegenerateCourse { points: geometry.len() });
        }

        let origin = compute_center(geometry);
        let segments: Vec<IndexedSegment> = geometry
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let line = Line::new(project_local(&w[0], &origin), project_local(&w[1], &origin));
                GeomWithData::new(line, i)
            })
            .collect();

        Ok(Self {
            geometry: geometry.to_vec(),
            origin,
            tree: RTree::bulk_load(segments),
        })
    }

    /// The indexed reference geometry.
    pub fn geometry(&self) -> &[GpsPoint] {
        &self.geometry
    }

    /// Distance in meters from a point to the closest course segment.
    ///
    /// Agrees with [`crate::geo_utils::point_to_line_distance`] for points near
    /// the course.
    pub fn distance_to(&self, point: &GpsPoint) -> f64 {
        let query = project_local(point, &self.origin);
        let mut best = f64::INFINITY;

        for candidate in self.tree.nearest_neighbor_iter(&query) {
            let planar = candidate.distance_2(&query).sqrt();
            if planar > best * (1.0 + PLANAR_SLACK) + PLANAR_MARGIN_M {
                break;
            }
            let i = candidate.data;
            let exact = point_to_segment_distance(point, &self.geometry[i], &self.geometry[i + 1]);
            best = best.min(exact);
        }

        best
    }

    /// Match preprocessed fixes against this course.
    pub fn match_trace(&self, fixes: &[RawFix], threshold_m: f64) -> Result<CourseMatch, MatchError> {
        if !threshold_m.is_finite() || threshold_m < 0.0 {
            return Err(MatchError::InvalidThreshold(threshold_m));
        }

        let distances: Vec<f64> = fixes.iter().map(|f| self.distance_to(&f.point())).collect();

        let on_course: Vec<RawFix> = fixes
            .iter()
            .zip(&distances)
            .filter(|(_, d)| **d <= threshold_m)
            .map(|(f, _)| *f)
            .collect();

        let report = DeviationReport::from_distances(&distances, threshold_m);

        debug!(
            "[Deviation] {} points vs {}-point course: {} deviating ({:.2}%), avg {:.1}m, max {:.1}m",
            report.total_points,
            self.geometry.len(),
            report.deviating_points,
            report.deviation_percentage,
            report.avg_distance,
            report.max_distance
        );

        Ok(CourseMatch { distances, on_course, report })
    }
}

/// Match preprocessed fixes against a course geometry.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use walk_refiner::{match_to_course, GpsPoint, RawFix};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
/// let course = vec![GpsPoint::new(37.5665, 126.9780), GpsPoint::new(37.5705, 126.9780)];
/// let fixes = vec![
///     RawFix::new(37.5665, 126.9780, t0),
///     RawFix::new(37.5685, 126.9800, t0 + Duration::seconds(60)), // ~176m east of the course
///     RawFix::new(37.5705, 126.9780, t0 + Duration::seconds(120)),
/// ];
///
/// let matched = match_to_course(&fixes, &course, 100.0).unwrap();
/// assert_eq!(matched.report.deviating_points, 1);
/// assert_eq!(matched.on_course.len(), 2);
/// ```
pub fn match_to_course(
    fixes: &[RawFix],
    course: &[GpsPoint],
    threshold_m: f64,
) -> Result<CourseMatch, MatchError> {
    CourseIndex::new(course)?.match_trace(fixes, threshold_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::point_to_line_distance;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap() + Duration::seconds(secs)
    }

    /// Five fixes ~11m apart heading north.
    fn straight_walk() -> Vec<RawFix> {
        (0..5)
            .map(|i| RawFix::new(37.5665 + i as f64 * 0.0001, 126.9780, t(i * 10)))
            .collect()
    }

    fn course_of(fixes: &[RawFix]) -> Vec<GpsPoint> {
        fixes.iter().map(RawFix::point).collect()
    }

    /// ~150m east at 37.57N
    const OFFSET_150M_LNG: f64 = 0.0017;

    #[test]
    fn test_identical_course_no_deviation() {
        let walk = straight_walk();
        let matched = match_to_course(&walk, &course_of(&walk), SOFT_DEVIATION_THRESHOLD_M).unwrap();

        assert_eq!(matched.report.total_points, 5);
        assert_eq!(matched.report.deviating_points, 0);
        assert_eq!(matched.report.deviation_percentage, 0.0);
        assert!(matched.report.max_distance < 1e-6);
        assert_eq!(matched.refined_path(None).unwrap().points.len(), 5);
    }

    #[test]
    fn test_offset_points_flagged() {
        let course_walk = straight_walk();
        let course = course_of(&course_walk);

        let mut walk = course_walk.clone();
        walk[1].longitude += OFFSET_150M_LNG;
        walk[3].longitude += OFFSET_150M_LNG;

        let matched = match_to_course(&walk, &course, HARD_DEVIATION_THRESHOLD_M).unwrap();
        assert_eq!(matched.report.deviating_points, 2);
        assert_eq!(matched.report.deviation_percentage, 40.0);
        assert_eq!(matched.on_course, vec![walk[0], walk[2], walk[4]]);
        assert!(matched.distances[1] > 140.0 && matched.distances[1] < 160.0);

        let refined = matched.refined_path(None).unwrap();
        assert_eq!(refined.points.len(), 3);
        assert_eq!(refined.total_duration_s, 40);
    }

    #[test]
    fn test_too_few_on_course_points() {
        let walk: Vec<RawFix> = straight_walk()
            .into_iter()
            .map(|mut f| {
                f.longitude += OFFSET_150M_LNG;
                f
            })
            .collect();
        let course = course_of(&straight_walk());

        let matched = match_to_course(&walk, &course, HARD_DEVIATION_THRESHOLD_M).unwrap();
        assert_eq!(matched.report.deviation_percentage, 100.0);
        assert!(matched.refined_path(Some(10.0)).is_none());
    }

    #[test]
    fn test_report_invariants() {
        let distances = [0.0, 12.5, 99.9, 100.0, 100.1, 3000.0, 7.25];
        for threshold in [0.0, 20.0, 100.0, 5000.0] {
            let report = DeviationReport::from_distances(&distances, threshold);
            assert!(report.deviation_percentage >= 0.0);
            assert!(report.deviation_percentage <= 100.0);
            assert!(report.min_distance <= report.avg_distance);
            assert!(report.avg_distance <= report.max_distance);
        }
    }

    #[test]
    fn test_report_threshold_is_exclusive() {
        let report = DeviationReport::from_distances(&[100.0, 100.0001], 100.0);
        assert_eq!(report.deviating_points, 1);
    }

    #[test]
    fn test_report_equal_distances() {
        let report = DeviationReport::from_distances(&[0.1; 7], 20.0);
        assert_eq!(report.min_distance, 0.1);
        assert_eq!(report.avg_distance, 0.1);
        assert_eq!(report.max_distance, 0.1);
    }

    #[test]
    fn test_report_empty() {
        assert_eq!(DeviationReport::from_distances(&[], 20.0), DeviationReport::default());
    }

    #[test]
    fn test_index_agrees_with_brute_force() {
        let course = vec![
            GpsPoint::new(37.5665, 126.9780),
            GpsPoint::new(37.5680, 126.9790),
            GpsPoint::new(37.5682, 126.9830),
            GpsPoint::new(37.5660, 126.9835),
            GpsPoint::new(37.5650, 126.9800),
            GpsPoint::new(37.5665, 126.9781),
        ];
        let index = CourseIndex::new(&course).unwrap();

        for i in 0..20 {
            for j in 0..20 {
                let p = GpsPoint::new(37.5640 + i as f64 * 0.00025, 126.9770 + j as f64 * 0.00038);
                let indexed = index.distance_to(&p);
                let brute = point_to_line_distance(&p, &course).unwrap();
                assert!((indexed - brute).abs() < 1e-6, "{:?}: {} vs {}", p, indexed, brute);
            }
        }
    }

    #[test]
    fn test_degenerate_course_rejected() {
        let p = GpsPoint::new(37.5665, 126.9780);
        assert_eq!(
            CourseIndex::new(&[]).err(),
            Some(MatchError::DegenerateCourse { points: 0 })
        );
        assert_eq!(
            CourseIndex::new(&[p]).err(),
            Some(MatchError::DegenerateCourse { points: 1 })
        );
        assert_eq!(
            CourseIndex::new(&[p, p, p]).err(),
            Some(MatchError::DegenerateCourse { points: 3 })
        );
    }

    #[test]
    fn test_invalid_course_coordinate_rejected() {
        let course = vec![
            GpsPoint::new(37.5665, 126.9780),
            GpsPoint::new(f64::NAN, 126.9780),
        ];
        assert_eq!(
            CourseIndex::new(&course).err(),
            Some(MatchError::InvalidCoordinate { index: 1 })
        );
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let walk = straight_walk();
        let course = course_of(&walk);
        assert!(matches!(
            match_to_course(&walk, &course, -1.0),
            Err(MatchError::InvalidThreshold(_))
        ));
        assert!(matches!(
            match_to_course(&walk, &course, f64::NAN),
            Err(MatchError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_empty_trace_matches_to_empty_report() {
        let course = course_of(&straight_walk());
        let matched = match_to_course(&[], &course, 20.0).unwrap();
        assert_eq!(matched.report, DeviationReport::default());
        assert!(matched.refined_path(None).is_none());
    }
}
