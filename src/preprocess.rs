//! Trace preprocessing.
//!
//! Turns the arrival-ordered fixes of a walk into a timestamp-ordered, clean trace:
//! 1. Drop fixes with invalid coordinates
//! 2. Stable sort by timestamp (ties keep arrival order)
//! 3. Drop fixes whose coordinates are bit-identical to an earlier kept fix
//! 4. Drop fixes that jump more than the teleport threshold from the previous kept fix
//!
//! Teleports are discarded, never used to split the trace. Running the
//! preprocessor on its own output returns the same trace.

use std::collections::HashSet;

use log::debug;

use crate::geo_utils::haversine_distance;
use crate::{GpsPoint, RawFix};

/// Counters for each rejection class, for logging and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreprocessStats {
    /// Fixes received
    pub input_points: usize,
    /// Dropped for NaN or out-of-range coordinates
    pub invalid_points: usize,
    /// Dropped as exact coordinate repeats
    pub duplicate_points: usize,
    /// Dropped as GPS teleports
    pub teleport_points: usize,
}

impl PreprocessStats {
    /// Number of fixes that survived preprocessing.
    pub fn retained_points(&self) -> usize {
        self.input_points - self.invalid_points - self.duplicate_points - self.teleport_points
    }
}

/// A preprocessed, timestamp-ordered trace.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanTrace {
    pub fixes: Vec<RawFix>,
    pub stats: PreprocessStats,
}

impl CleanTrace {
    /// Positions of the retained fixes, in order.
    pub fn points(&self) -> Vec<GpsPoint> {
        self.fixes.iter().map(RawFix::point).collect()
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}

/// Clean a raw walk trace.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use walk_refiner::{preprocess, RawFix};
///
/// let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap();
/// let raw = vec![
///     RawFix::new(0.0, 0.0, t0),
///     RawFix::new(0.0, 0.5, t0 + Duration::seconds(1)), // ~55 km jump
/// ];
///
/// let clean = preprocess(&raw, 1000.0);
/// assert_eq!(clean.fixes, vec![raw[0]]);
/// assert_eq!(clean.stats.teleport_points, 1);
/// ```
pub fn preprocess(raw: &[RawFix], teleport_threshold_m: f64) -> CleanTrace {
    let mut stats = PreprocessStats {
        input_points: raw.len(),
        ..Default::default()
    };

    let mut fixes: Vec<RawFix> = raw
        .iter()
        .filter(|f| f.point().is_valid())
        .copied()
        .collect();
    stats.invalid_points = raw.len() - fixes.len();

    // Vec::sort_by_key is stable
    fixes.sort_by_key(|f| f.timestamp);

    let mut seen: HashSet<(u64, u64)> = HashSet::with_capacity(fixes.len());
    let mut retained: Vec<RawFix> = Vec::with_capacity(fixes.len());

    for fix in fixes {
        if !seen.insert((fix.latitude.to_bits(), fix.longitude.to_bits())) {
            stats.duplicate_points += 1;
            continue;
        }

        if let Some(prev) = retained.last() {
            let jump = haversine_distance(&prev.point(), &fix.point());
            if jump > teleport_threshold_m {
                debug!(
                    "[Preprocess] Dropping teleport of {:.0}m at {}",
                    jump, fix.timestamp
                );
                stats.teleport_points += 1;
                continue;
            }
        }

        retained.push(fix);
    }

    debug!(
        "[Preprocess] {} fixes -> {} retained ({} invalid, {} duplicate, {} teleport)",
        stats.input_points,
        retained.len(),
        stats.invalid_points,
        stats.duplicate_points,
        stats.teleport_points
    );

    CleanTrace { fixes: retained, stats }
}
