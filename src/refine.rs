//! # Refinement Orchestration
//!
//! Sequences preprocessing, path building, metrics and course matching for one
//! walk, and decides what gets persisted.
//!
//! ## State machine
//!
//! ```text
//! Raw -> Preprocessed -> BasePathBuilt -> CourseMatched     -> Persisted
//!                                      \-> FreeWalkFinalized -> Persisted
//! ```
//!
//! ## Failure contract
//!
//! Only a missing walk or a storage failure reaches the caller. Everything that
//! goes wrong with the course (no geometry, degenerate geometry, too few points
//! on course) degrades to persisting the base path, so every completed walk
//! ends up with a path and metrics.

use log::{debug, info, warn};
use thiserror::Error;

use crate::deviation::{CourseIndex, DeviationReport, MatchError};
use crate::path::RefinedPath;
use crate::preprocess::{preprocess, CleanTrace};
use crate::store::{StoreError, WalkStore};
use crate::{GpsPoint, RawFix, RefineConfig};

/// Errors surfaced to the caller of [`Refiner::refine_walk`].
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("walk {0} has no recorded trace")]
    WalkNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stages of a single refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementState {
    Raw,
    Preprocessed,
    BasePathBuilt,
    CourseMatched,
    FreeWalkFinalized,
    Persisted,
}

impl RefinementState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: RefinementState) -> bool {
        use RefinementState::*;
        matches!(
            (self, next),
            (Raw, Preprocessed)
                | (Preprocessed, BasePathBuilt)
                | (BasePathBuilt, CourseMatched)
                | (BasePathBuilt, FreeWalkFinalized)
                | (CourseMatched, Persisted)
                | (FreeWalkFinalized, Persisted)
        )
    }
}

/// Why a course walk was persisted with its base path instead of a matched one.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// The course id did not resolve to a geometry
    CourseGeometryMissing,
    /// The matcher rejected the course or its parameters
    DeviationMatchFailure(MatchError),
    /// Fewer than 2 points were within the deviation threshold
    TooFewOnCoursePoints,
}

/// How the persisted path was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RefineMode {
    /// No course attached to the walk
    FreeWalk,
    /// Path rebuilt from the on-course points
    CourseMatched,
    /// Course walk persisted with its base path
    CourseFallback(FallbackReason),
}

/// Result of refining one trace, before or after persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    /// The preprocessed trace
    pub clean: CleanTrace,
    /// Path and metrics of the whole clean trace
    pub base_path: RefinedPath,
    /// Path that gets persisted
    pub path: RefinedPath,
    /// Deviation statistics, course walks only
    pub report: Option<DeviationReport>,
    pub mode: RefineMode,
    /// States visited, in order
    pub states: Vec<RefinementState>,
}

impl Refinement {
    pub fn is_course_matched(&self) -> bool {
        self.mode == RefineMode::CourseMatched
    }

    /// The state the refinement stopped in.
    pub fn state(&self) -> RefinementState {
        self.states.last().copied().unwrap_or(RefinementState::Raw)
    }

    fn advance(&mut self, next: RefinementState) {
        advance(&mut self.states, next);
    }
}

fn advance(states: &mut Vec<RefinementState>, next: RefinementState) {
    let current = states.last().copied().unwrap_or(RefinementState::Raw);
    debug_assert!(
        current.can_transition_to(next),
        "illegal refinement transition {:?} -> {:?}",
        current,
        next
    );
    debug!("[Refine] {:?} -> {:?}", current, next);
    states.push(next);
}

/// Where the course for a refinement comes from.
enum CourseInput<'a> {
    None,
    Geometry(&'a [GpsPoint]),
    Unavailable,
}

/// Refine a raw trace without touching storage.
///
/// Pass the course geometry for course walks, `None` for free walks. The result
/// stops in [`RefinementState::CourseMatched`] or
/// [`RefinementState::FreeWalkFinalized`]; persisting is up to the caller.
pub fn refine_trace(raw: &[RawFix], course: Option<&[GpsPoint]>, config: &RefineConfig) -> Refinement {
    let input = match course {
        Some(geometry) => CourseInput::Geometry(geometry),
        None => CourseInput::None,
    };
    run_pipeline(raw, input, config)
}

fn run_pipeline(raw: &[RawFix], course: CourseInput<'_>, config: &RefineConfig) -> Refinement {
    let mut states = vec![RefinementState::Raw];

    let clean = preprocess(raw, config.teleport_threshold_m);
    advance(&mut states, RefinementState::Preprocessed);

    let base_path = RefinedPath::from_fixes(&clean.fixes, config.max_segment_m);
    advance(&mut states, RefinementState::BasePathBuilt);

    let mut refinement = Refinement {
        path: base_path.clone(),
        base_path,
        clean,
        report: None,
        mode: RefineMode::FreeWalk,
        states,
    };

    let geometry = match course {
        CourseInput::None => {
            refinement.advance(RefinementState::FreeWalkFinalized);
            return refinement;
        }
        CourseInput::Unavailable => {
            refinement.mode = RefineMode::CourseFallback(FallbackReason::CourseGeometryMissing);
            refinement.advance(RefinementState::FreeWalkFinalized);
            return refinement;
        }
        CourseInput::Geometry(geometry) => geometry,
    };

    let matched = CourseIndex::new(geometry)
        .and_then(|index| index.match_trace(&refinement.clean.fixes, config.deviation_threshold_m));

    match matched {
        Ok(matched) => {
            refinement.report = Some(matched.report);
            match matched.refined_path(config.max_segment_m) {
                Some(path) => {
                    refinement.path = path;
                    refinement.mode = RefineMode::CourseMatched;
                    refinement.advance(RefinementState::CourseMatched);
                }
                None => {
                    warn!(
                        "[Refine] Only {} of {} points within {}m of the course, keeping base path",
                        matched.on_course.len(),
                        matched.report.total_points,
                        config.deviation_threshold_m
                    );
                    refinement.mode = RefineMode::CourseFallback(FallbackReason::TooFewOnCoursePoints);
                    refinement.advance(RefinementState::FreeWalkFinalized);
                }
            }
        }
        Err(e) => {
            warn!("[Refine] Course matching failed ({}), keeping base path", e);
            refinement.mode = RefineMode::CourseFallback(FallbackReason::DeviationMatchFailure(e));
            refinement.advance(RefinementState::FreeWalkFinalized);
        }
    }

    refinement
}

/// A walk to refine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkRequest {
    pub walk_id: String,
    /// Course the walk was started on, if any
    pub course_id: Option<String>,
}

impl WalkRequest {
    pub fn free(walk_id: impl Into<String>) -> Self {
        Self { walk_id: walk_id.into(), course_id: None }
    }

    pub fn on_course(walk_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self { walk_id: walk_id.into(), course_id: Some(course_id.into()) }
    }
}

/// A persisted refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    pub walk_id: String,
    pub refinement: Refinement,
    /// False when the deviation report could not be stored (or there was none)
    pub report_saved: bool,
}

/// Runs walk refinements against a [`WalkStore`].
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use walk_refiner::{MemoryStore, RawFix, RefineConfig, Refiner, WalkRequest};
///
/// let store = MemoryStore::new();
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
/// store.insert_trace("walk-1", (0..10)
///     .map(|i| RawFix::new(37.5665 + i as f64 * 0.0001, 126.9780, t0 + Duration::seconds(i * 7)))
///     .collect());
///
/// let refiner = Refiner::new(store, RefineConfig::default());
/// let outcome = refiner.refine_walk(&WalkRequest::free("walk-1")).unwrap();
///
/// assert_eq!(outcome.refinement.path.total_duration_s, 63);
/// assert!(refiner.store().refined_path("walk-1").is_some());
/// assert!(refiner.store().deviation_report("walk-1").is_none());
/// ```
pub struct Refiner<S> {
    store: S,
    config: RefineConfig,
}

impl<S: WalkStore> Refiner<S> {
    pub fn new(store: S, config: RefineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &RefineConfig {
        &self.config
    }

    /// Refine a completed walk and persist its path (and report, for course walks).
    ///
    /// Fails only when the walk has no trace or storage fails; course problems
    /// fall back to the base path.
    pub fn refine_walk(&self, request: &WalkRequest) -> Result<RefinementOutcome, RefineError> {
        let walk_id = request.walk_id.as_str();
        let raw = self.load_trace(walk_id)?;

        let geometry = request
            .course_id
            .as_deref()
            .map(|course_id| self.load_course(walk_id, course_id));

        let input = match &geometry {
            None => CourseInput::None,
            Some(Some(points)) => CourseInput::Geometry(points.as_slice()),
            Some(None) => CourseInput::Unavailable,
        };

        let mut refinement = run_pipeline(&raw, input, &self.config);

        self.store.save_refined_path(walk_id, &refinement.path)?;
        refinement.advance(RefinementState::Persisted);

        let report_saved = match &refinement.report {
            Some(report) => match self.store.save_deviation_report(walk_id, report) {
                Ok(()) => true,
                Err(e) => {
                    warn!("[Refine] Walk {}: could not save deviation report: {}", walk_id, e);
                    false
                }
            },
            None => false,
        };

        info!(
            "[Refine] Walk {}: {:?}, {} raw -> {} clean points, {:.2}m in {}s",
            walk_id,
            refinement.mode,
            refinement.clean.stats.input_points,
            refinement.clean.len(),
            refinement.path.total_distance_m,
            refinement.path.total_duration_s
        );

        Ok(RefinementOutcome {
            walk_id: walk_id.to_string(),
            refinement,
            report_saved,
        })
    }

    /// Best-effort analytics report of a walk against a course.
    ///
    /// Nothing is persisted. Returns `Ok(None)` when the course geometry is
    /// unavailable or matching fails.
    pub fn deviation_report(
        &self,
        walk_id: &str,
        course_id: &str,
        threshold_m: f64,
    ) -> Result<Option<DeviationReport>, RefineError> {
        let raw = self.load_trace(walk_id)?;
        let Some(geometry) = self.load_course(walk_id, course_id) else {
            return Ok(None);
        };

        let clean = preprocess(&raw, self.config.teleport_threshold_m);
        match CourseIndex::new(&geometry).and_then(|index| index.match_trace(&clean.fixes, threshold_m)) {
            Ok(matched) => Ok(Some(matched.report)),
            Err(e) => {
                warn!("[Refine] Walk {}: deviation report skipped: {}", walk_id, e);
                Ok(None)
            }
        }
    }

    /// [`Refiner::deviation_report`] at the configured analytics threshold.
    pub fn analytics_report(&self, walk_id: &str, course_id: &str) -> Result<Option<DeviationReport>, RefineError> {
        self.deviation_report(walk_id, course_id, self.config.report_threshold_m)
    }

    /// Refine several walks. Results are in request order.
    #[cfg(not(feature = "parallel"))]
    pub fn refine_walks(&self, requests: &[WalkRequest]) -> Vec<Result<RefinementOutcome, RefineError>> {
        requests.iter().map(|r| self.refine_walk(r)).collect()
    }

    fn load_trace(&self, walk_id: &str) -> Result<Vec<RawFix>, RefineError> {
        self.store
            .raw_trace(walk_id)?
            .ok_or_else(|| RefineError::WalkNotFound(walk_id.to_string()))
    }

    /// Course geometry, or `None` (logged) when it cannot be resolved.
    fn load_course(&self, walk_id: &str, course_id: &str) -> Option<Vec<GpsPoint>> {
        match self.store.course_geometry(course_id) {
            Ok(Some(points)) => Some(points),
            Ok(None) => {
                warn!("[Refine] Walk {}: course {} has no geometry, refining as free walk", walk_id, course_id);
                None
            }
            Err(e) => {
                warn!("[Refine] Walk {}: loading course {} failed ({}), refining as free walk", walk_id, course_id, e);
                None
            }
        }
    }
}

#[cfg(feature = "parallel")]
impl<S: WalkStore + Sync> Refiner<S> {
    /// Refine several walks on the rayon pool. Results are in request order.
    ///
    /// Walks share no state, so each refinement runs independently.
    pub fn refine_walks(&self, requests: &[WalkRequest]) -> Vec<Result<RefinementOutcome, RefineError>> {
        use rayon::prelude::*;

        let start = std::time::Instant::now();
        let results: Vec<_> = requests.par_iter().map(|r| self.refine_walk(r)).collect();
        info!(
            "[Refine] Refined {} walks in parallel in {:?}",
            requests.len(),
            start.elapsed()
        );
        results
    }
}
