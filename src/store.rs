//! Storage ports for walk refinement.
//!
//! The refinement engine never talks to a database directly. The host service
//! implements [`WalkStore`] over its own persistence layer and hands it to
//! [`crate::Refiner`]. [`MemoryStore`] is a complete in-memory implementation for
//! tests, demos and embedded use.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;

use crate::{DeviationReport, GpsPoint, RawFix, RefinedPath};

/// Failure reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Read/write access to the data a refinement needs.
///
/// Methods take `&self` so a single store can serve refinements of different
/// walks concurrently. Lookups return `Ok(None)` when the record does not exist.
pub trait WalkStore {
    /// Raw fixes of a walk, in arrival order.
    fn raw_trace(&self, walk_id: &str) -> Result<Option<Vec<RawFix>>, StoreError>;

    /// Reference geometry of a course.
    fn course_geometry(&self, course_id: &str) -> Result<Option<Vec<GpsPoint>>, StoreError>;

    /// Persist the final path and metrics of a walk, replacing any earlier result.
    fn save_refined_path(&self, walk_id: &str, path: &RefinedPath) -> Result<(), StoreError>;

    /// Persist the deviation report of a course walk.
    fn save_deviation_report(&self, walk_id: &str, report: &DeviationReport) -> Result<(), StoreError>;
}

/// In-memory [`WalkStore`].
///
/// # Example
/// ```
/// use walk_refiner::{GpsPoint, MemoryStore, WalkStore};
///
/// let store = MemoryStore::new();
/// store.insert_course("han-river", vec![GpsPoint::new(37.52, 126.93), GpsPoint::new(37.53, 126.94)]);
///
/// assert_eq!(store.course_geometry("han-river").unwrap().unwrap().len(), 2);
/// assert!(store.course_geometry("unknown").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    traces: RwLock<HashMap<String, Vec<RawFix>>>,
    courses: RwLock<HashMap<String, Vec<GpsPoint>>>,
    paths: RwLock<HashMap<String, RefinedPath>>,
    reports: RwLock<HashMap<String, DeviationReport>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the raw trace of a walk.
    pub fn insert_trace(&self, walk_id: &str, fixes: Vec<RawFix>) {
        self.traces.write().insert(walk_id.to_string(), fixes);
    }

    /// Append fixes to a walk while it is being tracked.
    pub fn append_fixes(&self, walk_id: &str, fixes: &[RawFix]) {
        self.traces
            .write()
            .entry(walk_id.to_string())
            .or_default()
            .extend_from_slice(fixes);
    }

    pub fn insert_course(&self, course_id: &str, geometry: Vec<GpsPoint>) {
        self.courses.write().insert(course_id.to_string(), geometry);
    }

    /// Last saved path of a walk.
    pub fn refined_path(&self, walk_id: &str) -> Option<RefinedPath> {
        self.paths.read().get(walk_id).cloned()
    }

    /// Last saved deviation report of a walk.
    pub fn deviation_report(&self, walk_id: &str) -> Option<DeviationReport> {
        self.reports.read().get(walk_id).copied()
    }
}

impl WalkStore for MemoryStore {
    fn raw_trace(&self, walk_id: &str) -> Result<Option<Vec<RawFix>>, StoreError> {
        Ok(self.traces.read().get(walk_id).cloned())
    }

    fn course_geometry(&self, course_id: &str) -> Result<Option<Vec<GpsPoint>>, StoreError> {
        Ok(self.courses.read().get(course_id).cloned())
    }

    fn save_refined_path(&self, walk_id: &str, path: &RefinedPath) -> Result<(), StoreError> {
        self.paths.write().insert(walk_id.to_string(), path.clone());
        Ok(())
    }

    fn save_deviation_report(&self, walk_id: &str, report: &DeviationReport) -> Result<(), StoreError> {
        self.reports.write().insert(walk_id.to_string(), *report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_append_fixes_accumulates() {
        let store = MemoryStore::new();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
        let a = RawFix::new(37.5665, 126.9780, t0);
        let b = RawFix::new(37.5666, 126.9780, t0);

        assert!(store.raw_trace("walk-1").unwrap().is_none());
        store.append_fixes("walk-1", &[a]);
        store.append_fixes("walk-1", &[b]);
        assert_eq!(store.raw_trace("walk-1").unwrap(), Some(vec![a, b]));
    }

    #[test]
    fn test_saved_results_replace_previous() {
        let store = MemoryStore::new();
        let first = RefinedPath::empty();
        let second = RefinedPath {
            points: vec![GpsPoint::new(1.0, 1.0), GpsPoint::new(1.0, 1.0001)],
            total_distance_m: 11.13,
            total_duration_s: 9,
        };

        store.save_refined_path("walk-1", &first).unwrap();
        store.save_refined_path("walk-1", &second).unwrap();
        assert_eq!(store.refined_path("walk-1"), Some(second));

        let report = DeviationReport::from_distances(&[1.0, 2.0], 20.0);
        store.save_deviation_report("walk-1", &report).unwrap();
        assert_eq!(store.deviation_report("walk-1"), Some(report));
        assert!(store.deviation_report("walk-2").is_none());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::new("connection reset");
        assert_eq!(err.to_string(), "storage error: connection reset");
    }
}
