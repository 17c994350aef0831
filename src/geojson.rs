//! GeoJSON export of refined walks for map clients.
//!
//! Coordinates are written `[longitude, latitude]` as GeoJSON requires.

use serde_json::{json, Map, Value};

use crate::deviation::DeviationReport;
use crate::path::RefinedPath;

impl RefinedPath {
    /// The path as a GeoJSON `Feature` with a `LineString` geometry.
    ///
    /// # Example
    /// ```
    /// use walk_refiner::{GpsPoint, RefinedPath};
    ///
    /// let path = RefinedPath {
    ///     points: vec![GpsPoint::new(37.5665, 126.9780), GpsPoint::new(37.5666, 126.9780)],
    ///     total_distance_m: 11.1,
    ///     total_duration_s: 8,
    /// };
    ///
    /// let feature = path.to_geojson();
    /// assert_eq!(feature["geometry"]["coordinates"][0][0], 126.9780);
    /// assert_eq!(feature["properties"]["total_duration_s"], 8);
    /// ```
    pub fn to_geojson(&self) -> Value {
        self.to_geojson_with_report(None)
    }

    /// Like [`RefinedPath::to_geojson`], with the deviation report under
    /// `properties.deviation` when present.
    pub fn to_geojson_with_report(&self, report: Option<&DeviationReport>) -> Value {
        let coordinates: Vec<[f64; 2]> = self
            .points
            .iter()
            .map(|p| [p.longitude, p.latitude])
            .collect();

        let mut properties = Map::new();
        properties.insert("total_distance_m".into(), json!(self.total_distance_m));
        properties.insert("total_duration_s".into(), json!(self.total_duration_s));
        if let Some(report) = report {
            properties.insert("deviation".into(), json!(report));
        }

        json!({
            "type": "Feature",
            "geometry": {
                "type": "LineString",
                "coordinates": coordinates,
            },
            "properties": properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    fn sample_path() -> RefinedPath {
        RefinedPath {
            points: vec![
                GpsPoint::new(37.5665, 126.9780),
                GpsPoint::new(37.5670, 126.9785),
            ],
            total_distance_m: 70.87,
            total_duration_s: 45,
        }
    }

    #[test]
    fn test_linestring_is_lng_lat() {
        let feature = sample_path().to_geojson();
        assert_eq!(feature["type"], "Feature");
        assert_eq!(feature["geometry"]["type"], "LineString");
        assert_eq!(feature["geometry"]["coordinates"][1], json!([126.9785, 37.5670]));
        assert_eq!(feature["properties"]["total_distance_m"], 70.87);
        assert!(feature["properties"].get("deviation").is_none());
    }

    #[test]
    fn test_report_properties_are_camel_case() {
        let report = DeviationReport::from_distances(&[1.0, 30.0], 20.0);
        let feature = sample_path().to_geojson_with_report(Some(&report));
        let deviation = &feature["properties"]["deviation"];

        assert_eq!(deviation["totalPoints"], 2);
        assert_eq!(deviation["deviatingPoints"], 1);
        assert_eq!(deviation["deviationPercentage"], 50.0);
    }

    #[test]
    fn test_empty_path_exports() {
        let feature = RefinedPath::empty().to_geojson();
        assert_eq!(feature["geometry"]["coordinates"], json!([]));
        assert_eq!(feature["properties"]["total_duration_s"], 0);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: crate::RefineConfig =
            serde_json::from_str(r#"{"deviation_threshold_m": 50.0, "max_segment_m": 10.0}"#).unwrap();
        assert_eq!(config.deviation_threshold_m, 50.0);
        assert_eq!(config.max_segment_m, Some(10.0));
        assert_eq!(config.teleport_threshold_m, 1000.0);
    }
}
