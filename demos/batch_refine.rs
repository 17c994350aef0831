//! Example of refining many walks at once.
//!
//! Run with: cargo run --example batch_refine --features parallel

use chrono::{Duration, TimeZone, Utc};
use std::time::Instant;
use walk_refiner::{GpsPoint, MemoryStore, RawFix, RefineConfig, Refiner, WalkRequest};

fn main() {
    env_logger::init();

    println!("Batch Walk Refinement Example\n");

    let course: Vec<GpsPoint> = (0..200)
        .map(|i| {
            let angle = i as f64 / 200.0 * std::f64::consts::TAU;
            GpsPoint::new(37.5300 + 0.004 * angle.sin(), 126.9900 + 0.005 * angle.cos())
        })
        .collect();

    let store = MemoryStore::new();
    store.insert_course("park-loop", course.clone());

    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    let mut requests = Vec::new();

    for walk in 0..500 {
        let jitter = (walk % 7) as f64 * 0.00002;
        let fixes: Vec<RawFix> = course
            .iter()
            .enumerate()
            .map(|(i, p)| {
                RawFix::new(
                    p.latitude + jitter,
                    p.longitude - jitter,
                    t0 + Duration::seconds(walk as i64 * 3600 + i as i64 * 5),
                )
            })
            .collect();

        let walk_id = format!("walk-{}", walk);
        store.insert_trace(&walk_id, fixes);

        // Every third walk is a free walk
        requests.push(if walk % 3 == 0 {
            WalkRequest::free(walk_id)
        } else {
            WalkRequest::on_course(walk_id, "park-loop")
        });
    }

    let refiner = Refiner::new(store, RefineConfig::default());

    let start = Instant::now();
    let results = refiner.refine_walks(&requests);
    let elapsed = start.elapsed();

    let matched = results
        .iter()
        .filter(|r| matches!(r, Ok(o) if o.refinement.is_course_matched()))
        .count();
    let failed = results.iter().filter(|r| r.is_err()).count();

    println!("Refined {} walks in {:?}", results.len(), elapsed);
    println!("   Course matched: {}", matched);
    println!("   Base path kept: {}", results.len() - matched - failed);
    println!("   Failed: {}", failed);
}
