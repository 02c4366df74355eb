//! Ready-made filters for common Lizard queries.
//!
//! Each helper returns a [`QueryParams`] that can be merged into a request
//! through [`QueryParams::update`] or passed directly to an endpoint.

use chrono::{DateTime, Utc};

use crate::query::{QueryParams, commaify};

/// A `(lat, lon)` pair in WGS84.
pub type LatLon = (f64, f64);

/// Bounding box as a WKT polygon, from its south-west and north-east corners.
pub fn bbox(south_west: LatLon, north_east: LatLon) -> String {
    let (min_lat, min_lon) = south_west;
    let (max_lat, max_lon) = north_east;
    let points = [
        (min_lon, min_lat),
        (min_lon, max_lat),
        (max_lon, max_lat),
        (max_lon, min_lat),
        (min_lon, min_lat),
    ]
    .iter()
    .map(|(x, y)| format!("{} {}", x, y))
    .collect::<Vec<_>>()
    .join(", ");
    format!("POLYGON (({}))", points)
}

/// Records within (or overlapping) a bounding box.
///
/// The `timeseries` endpoint filters on `geom_within`, all others on `in_bbox`.
pub fn in_bbox(south_west: LatLon, north_east: LatLon, endpoint: Option<&str>) -> QueryParams {
    let key = if endpoint == Some("timeseries") {
        "geom_within"
    } else {
        "in_bbox"
    };
    QueryParams::new().with(key, bbox(south_west, north_east))
}

/// Records within `distance` meters of a point.
///
/// The server converts meters to WGS84 degrees, so this is an approximation.
pub fn distance_to_point(distance: f64, lat: f64, lon: f64) -> QueryParams {
    QueryParams::new()
        .with("distance", distance)
        .with("point", commaify([lon, lat]))
}

/// Milliseconds since the epoch, the timestamp format Lizard expects.
pub fn datetime_to_js(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Time window filter. `end` defaults to now.
pub fn datetime_limits(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> QueryParams {
    let end = end.unwrap_or_else(Utc::now);
    let mut q = QueryParams::new();
    if let Some(start) = start {
        q.set("start", datetime_to_js(&start));
    }
    q.set("end", datetime_to_js(&end));
    q
}

/// Filter on one or more organisation ids.
///
/// The key depends on how the endpoint relates to organisations.
pub fn organisation<S: AsRef<str>>(organisation_ids: &[S], endpoint: Option<&str>) -> QueryParams {
    let prefix = match endpoint {
        None | Some("organisation") | Some("organisations") => "",
        Some("location") | Some("locations") => "organisation__",
        Some(_) => "location__organisation__",
    };
    let mut q = QueryParams::new();
    if !organisation_ids.is_empty() {
        let ids = organisation_ids
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        q.set(format!("{}unique_id", prefix), ids);
    }
    q
}

/// Aggregate statistics selection. `mean` is computed client side from
/// `count` and `sum`, so it is requested as those two fields.
pub fn statistics<S: AsRef<str>>(statistics: &[S]) -> QueryParams {
    let fields = statistics
        .iter()
        .map(|s| match s.as_ref() {
            "mean" => "count,sum",
            other => other,
        })
        .collect::<Vec<_>>()
        .join(",");
    QueryParams::new().with("min_points", 1).with("fields", fields)
}

/// Raster value curve at a point.
pub fn feature_info(lat: f64, lng: f64, layername: &str) -> QueryParams {
    QueryParams::new()
        .with("agg", "curve")
        .with("geom", format!("POINT({}+{})", lng, lat))
        .with("srs", "EPSG:4326")
        .with("raster_names", layername)
        .with("count", false)
}

/// Min/max of a raster layer within a bounding box.
pub fn limits(layername: &str, south_west: LatLon, north_east: LatLon) -> QueryParams {
    QueryParams::new()
        .with("request", "getlimits")
        .with("layers", layername)
        .with("bbox", bbox(south_west, north_east))
        .with("width", 16)
        .with("height", 16)
        .with("srs", "epsg:4326")
}

pub fn search(q: &str) -> QueryParams {
    QueryParams::new().with("search", q)
}

/// Groundwater station locations.
pub fn groundwater() -> QueryParams {
    QueryParams::new().with("object_type__id", 107)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bbox_is_a_closed_wkt_ring() {
        assert_eq!(
            bbox((52.0, 4.0), (53.0, 5.5)),
            "POLYGON ((4 52, 4 53, 5.5 53, 5.5 52, 4 52))"
        );
    }

    #[test]
    fn in_bbox_key_depends_on_endpoint() {
        let ts = in_bbox((0.0, 0.0), (1.0, 1.0), Some("timeseries"));
        assert!(ts.contains_key("geom_within"));
        let loc = in_bbox((0.0, 0.0), (1.0, 1.0), Some("locations"));
        assert!(loc.contains_key("in_bbox"));
    }

    #[test]
    fn point_is_lon_lat() {
        let q = distance_to_point(100.0, 52.1, 4.3);
        assert_eq!(q.get("point"), Some("4.3,52.1"));
        assert_eq!(q.get("distance"), Some("100"));
    }

    #[test]
    fn datetime_limits_are_js_timestamps() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let q = datetime_limits(Some(start), Some(end));
        assert_eq!(q.get("start"), Some("1577836800000"));
        assert_eq!(q.get("end"), Some("1577923200000"));

        let open = datetime_limits(None, None);
        assert!(!open.contains_key("start"));
        assert!(open.contains_key("end"));
    }

    #[test]
    fn organisation_key_per_endpoint() {
        let q = organisation(&["a", "b"], Some("timeseries"));
        assert_eq!(q.get("location__organisation__unique_id"), Some("a,b"));
        let q = organisation(&["a"], Some("location"));
        assert_eq!(q.get("organisation__unique_id"), Some("a"));
        let q = organisation(&["a"], None);
        assert_eq!(q.get("unique_id"), Some("a"));
        assert!(organisation::<&str>(&[], None).is_empty());
    }

    #[test]
    fn mean_expands_to_count_and_sum() {
        let q = statistics(&["min", "mean"]);
        assert_eq!(q.get("fields"), Some("min,count,sum"));
        assert_eq!(q.get("min_points"), Some("1"));
    }

    #[test]
    fn feature_info_disables_count() {
        let q = feature_info(52.0, 4.5, "dem:nl");
        assert_eq!(q.get("geom"), Some("POINT(4.5+52)"));
        assert_eq!(q.get("count"), Some("false"));
    }
}
