//! # Geographic Utilities
//!
//! Distance and centroid helpers over [`TrackPoint`]s. All functions expect
//! WGS84 coordinates in degrees.

use geo::{Distance, Haversine, Point};

use crate::TrackPoint;

/// Great-circle distance between two points in meters (spherical Earth,
/// radius 6,371 km).
///
/// ```rust
/// use course_photo_matcher::{TrackPoint, geo_utils};
///
/// let seoul = TrackPoint::new(37.5665, 126.9780);
/// let busan = TrackPoint::new(35.1796, 129.0756);
/// let distance = geo_utils::haversine_distance(&seoul, &busan);
/// assert!((distance - 325_000.0).abs() < 5_000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Running along-track distance in meters at each point.
///
/// The first entry is always 0.0 and the result has the same length as the
/// input. Empty input gives an empty vector.
pub fn cumulative_distances(points: &[TrackPoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(&points[i - 1], point);
        }
        cumulative.push(total);
    }
    cumulative
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Arithmetic mean of latitudes and longitudes.
///
/// This is not a geodesic centroid; it is only meant for centering a map.
pub fn compute_center(points: &[TrackPoint]) -> Option<TrackPoint> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat_sum, lng_sum) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lng), p| (lat + p.latitude, lng + p.longitude));
    Some(TrackPoint::new(lat_sum / n, lng_sum / n))
}
