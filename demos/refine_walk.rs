//! Example of refining a course walk and a free walk.
//!
//! Run with: RUST_LOG=debug cargo run --example refine_walk

use chrono::{Duration, TimeZone, Utc};
use walk_refiner::{
    GpsPoint, MemoryStore, RawFix, RefineConfig, RefineMode, Refiner, WalkRequest,
};

fn main() {
    env_logger::init();

    // Riverside course heading north (Seoul)
    let course: Vec<GpsPoint> = (0..30)
        .map(|i| GpsPoint::new(37.5200 + i as f64 * 0.0002, 126.9400))
        .collect();

    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap();
    let mut fixes: Vec<RawFix> = course
        .iter()
        .enumerate()
        .map(|(i, p)| RawFix::new(p.latitude, p.longitude + 0.00003, t0 + Duration::seconds(i as i64 * 15)))
        .collect();

    // Detour to a water fountain ~150m east
    for fix in &mut fixes[12..15] {
        fix.longitude += 0.0017;
    }
    // A GPS glitch and a repeated fix, delivered out of order
    fixes.push(RawFix::new(37.6000, 126.9400, t0 + Duration::seconds(100)));
    let repeat = fixes[3];
    fixes.push(repeat);
    fixes.swap(5, 6);

    let store = MemoryStore::new();
    store.insert_course("han-river", course);
    store.insert_trace("walk-course", fixes.clone());
    store.insert_trace("walk-free", fixes);

    let refiner = Refiner::new(store, RefineConfig::default());

    println!("Walk Refinement Example\n");
    println!(
        "Config: teleport={}m, densify={:?}m, deviation={}m, report={}m\n",
        refiner.config().teleport_threshold_m,
        refiner.config().max_segment_m,
        refiner.config().deviation_threshold_m,
        refiner.config().report_threshold_m
    );

    for request in [
        WalkRequest::on_course("walk-course", "han-river"),
        WalkRequest::free("walk-free"),
    ] {
        match refiner.refine_walk(&request) {
            Ok(outcome) => {
                let r = &outcome.refinement;
                println!("{}:", outcome.walk_id);
                println!("   Mode: {:?}", r.mode);
                println!("   Preprocessing: {:?}", r.clean.stats);
                println!("   Path: {} points, {:.2}m, {}s", r.path.points.len(), r.path.total_distance_m, r.path.total_duration_s);
                println!("   Rendered at 10m: {} points", r.path.densified(10.0).len());
                if r.mode == RefineMode::CourseMatched {
                    println!("   Base path was {:.2}m", r.base_path.total_distance_m);
                }
                if let Some(report) = &r.report {
                    println!(
                        "   Deviation: {}/{} points ({:.2}%), avg {:.1}m, max {:.1}m",
                        report.deviating_points,
                        report.total_points,
                        report.deviation_percentage,
                        report.avg_distance,
                        report.max_distance
                    );
                }
                println!();
            }
            Err(e) => println!("{}: failed: {}\n", request.walk_id, e),
        }
    }

    match refiner.analytics_report("walk-course", "han-river") {
        Ok(Some(report)) => println!(
            "Analytics ({}m): {:.2}% of points off course",
            refiner.config().report_threshold_m,
            report.deviation_percentage
        ),
        Ok(None) => println!("Analytics report unavailable"),
        Err(e) => println!("Analytics report failed: {}", e),
    }
}
