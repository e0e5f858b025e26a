//! # Course Model
//!
//! A race course is the ordered polyline of a route's track points together
//! with the event's nominal distance (42.195 km for a marathon). Distance
//! lookups come in two flavours:
//!
//! - [`Course::point_at_distance`] maps km to a point by *index fraction*,
//!   treating the points as evenly spaced.
//! - [`Course::point_at_arc_distance`] uses the cumulative along-track
//!   distance, scaled so the measured length equals the nominal distance.
//!
//! GPS traces are rarely evenly spaced, so the two can disagree noticeably.

use std::io::Read;

use serde::Serialize;

use crate::error::{PhotoMatchError, Result};
use crate::geo_utils::{compute_center, cumulative_distances};
use crate::{Bounds, TrackPoint};

/// Minimum number of valid points a course needs.
const MIN_POINTS: usize = 2;

/// Standard marker distances in km; half-distance is added per course.
const STANDARD_WAYPOINT_KMS: [f64; 4] = [10.0, 20.0, 30.0, 40.0];

/// A fixed marker along the course (e.g. the 10 km sign).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Waypoint {
    pub km: f64,
    pub point: TrackPoint,
}

/// An immutable race course.
#[derive(Debug, Clone)]
pub struct Course {
    event_id: String,
    points: Vec<TrackPoint>,
    total_distance_km: f64,
    /// Along-track meters at each point, same length as `points`
    cumulative_m: Vec<f64>,
    bounds: Bounds,
}

impl Course {
    /// Build a course from ordered track points.
    ///
    /// Invalid coordinates are dropped. Fails with `InsufficientPoints` if
    /// fewer than two remain.
    pub fn new(event_id: &str, points: Vec<TrackPoint>, total_distance_km: f64) -> Result<Self> {
        if !total_distance_km.is_finite() || total_distance_km <= 0.0 {
            return Err(PhotoMatchError::ConfigError {
                message: format!(
                    "Course '{}' needs a positive distance, got {}",
                    event_id, total_distance_km
                ),
            });
        }

        let points: Vec<TrackPoint> = points.into_iter().filter(|p| p.is_valid()).collect();
        if points.len() < MIN_POINTS {
            return Err(PhotoMatchError::InsufficientPoints {
                event_id: event_id.to_string(),
                point_count: points.len(),
                minimum_required: MIN_POINTS,
            });
        }

        let cumulative_m = cumulative_distances(&points);
        let bounds = Bounds::from_points(&points).ok_or_else(|| PhotoMatchError::InsufficientPoints {
            event_id: event_id.to_string(),
            point_count: 0,
            minimum_required: MIN_POINTS,
        })?;

        Ok(Self {
            event_id: event_id.to_string(),
            points,
            total_distance_km,
            cumulative_m,
            bounds,
        })
    }

    /// Parse a course from GPX data.
    ///
    /// Track points of all tracks and segments are taken in file order. A
    /// file without tracks falls back to its route points. Any parse error
    /// or a file with fewer than two usable points is `RouteUnavailable`.
    pub fn from_gpx_reader<R: Read>(
        event_id: &str,
        reader: R,
        total_distance_km: f64,
    ) -> Result<Self> {
        let gpx = gpx::read(reader).map_err(|e| PhotoMatchError::route_unavailable(event_id, e))?;

        let mut points: Vec<TrackPoint> = gpx
            .tracks
            .iter()
            .flat_map(|track| track.segments.iter())
            .flat_map(|segment| segment.points.iter())
            .map(|wpt| {
                let p = wpt.point();
                TrackPoint::new(p.y(), p.x())
            })
            .collect();

        if points.is_empty() {
            points = gpx
                .routes
                .iter()
                .flat_map(|route| route.points.iter())
                .map(|wpt| {
                    let p = wpt.point();
                    TrackPoint::new(p.y(), p.x())
                })
                .collect();
        }

        Self::new(event_id, points, total_distance_km).map_err(|e| match e {
            PhotoMatchError::InsufficientPoints { point_count, .. } => {
                PhotoMatchError::route_unavailable(
                    event_id,
                    format!("GPX has {} usable track points", point_count),
                )
            }
            other => other,
        })
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Track points in direction of travel.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Nominal course distance in km.
    pub fn total_distance_km(&self) -> f64 {
        self.total_distance_km
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn start(&self) -> TrackPoint {
        self.points[0]
    }

    pub fn finish(&self) -> TrackPoint {
        self.points[self.points.len() - 1]
    }

    /// Mean latitude and longitude, for centering a map view.
    pub fn centroid(&self) -> TrackPoint {
        compute_center(&self.points).unwrap_or_else(|| self.start())
    }

    /// Along-track length of the polyline itself, in km.
    pub fn measured_length_km(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0) / 1000.0
    }

    /// Index of the point `km` into the course, by index fraction.
    ///
    /// `round((km / total) * count)` clamped to `[0, count - 1]`.
    pub fn index_at_distance(&self, km: f64) -> usize {
        let last = self.points.len() - 1;
        let raw = (km / self.total_distance_km * self.points.len() as f64).round();
        if raw.is_nan() || raw <= 0.0 {
            0
        } else {
            (raw as usize).min(last)
        }
    }

    /// Point `km` into the course, by index fraction. Never fails: distances
    /// past the finish give the last point, negative ones the first.
    pub fn point_at_distance(&self, km: f64) -> TrackPoint {
        self.points[self.index_at_distance(km)]
    }

    /// Index of the first point whose along-track distance reaches
    /// `fraction` of the measured length. Clamped like the index lookup.
    pub fn arc_index_at_fraction(&self, fraction: f64) -> usize {
        let last = self.points.len() - 1;
        let measured = self.cumulative_m[last];
        if measured <= 0.0 || fraction.is_nan() || fraction <= 0.0 {
            return 0;
        }
        let target = fraction.min(1.0) * measured;
        self.cumulative_m
            .partition_point(|&d| d < target)
            .min(last)
    }

    /// Point `km` into the course, by along-track distance.
    pub fn point_at_arc_distance(&self, km: f64) -> TrackPoint {
        self.points[self.arc_index_at_fraction(km / self.total_distance_km)]
    }

    /// Along-track distance of a point, scaled to the nominal distance.
    pub fn scaled_distance_km(&self, index: usize) -> f64 {
        let last = self.points.len() - 1;
        let measured = self.cumulative_m[last];
        if measured <= 0.0 {
            return 0.0;
        }
        self.cumulative_m[index.min(last)] / measured * self.total_distance_km
    }

    /// Waypoint markers at the given distances (clamped, never an error).
    pub fn waypoints(&self, kms: &[f64]) -> Vec<Waypoint> {
        kms.iter()
            .map(|&km| Waypoint {
                km,
                point: self.point_at_distance(km),
            })
            .collect()
    }

    /// 10 km, 20 km, half distance, 30 km and 40 km, keeping those short of
    /// the finish.
    pub fn default_waypoints(&self) -> Vec<Waypoint> {
        let half = self.total_distance_km / 2.0;
        let mut kms: Vec<f64> = STANDARD_WAYPOINT_KMS.to_vec();
        kms.push(half);
        kms.sort_by(|a, b| a.total_cmp(b));
        kms.dedup();
        kms.retain(|&km| km < self.total_distance_km);
        self.waypoints(&kms)
    }
}
