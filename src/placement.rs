//! # Position Assigner
//!
//! Photos uploaded without a capture location are spread along the course
//! by their position in the upload batch: photo `i` of `n` goes to track
//! point `floor(i / n * point_count)`. Its distance is estimated from that
//! point and its timestamp from the distance at a fixed pace.
//!
//! The default [`DistanceModel::PointIndex`] reports
//! `index / point_count * total_distance`, which is only exact for evenly
//! spaced track points. [`DistanceModel::ArcLength`] uses the measured
//! along-track distance instead.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::{DistanceModel, MatcherConfig};
use crate::course::Course;
use crate::TrackPoint;

/// Where and when a photo is estimated to have been taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub point: TrackPoint,
    /// Index of `point` in the course's track
    pub point_index: usize,
    /// Estimated distance from the start in km
    pub distance_km: f64,
    /// Event start plus elapsed time at the assumed pace
    pub timestamp: NaiveDateTime,
}

/// Place photo `ordinal` of `total_photos` on a bare point list by index
/// fraction.
///
/// Returns `None` for an empty point list or zero photos.
pub fn assign_along(
    points: &[TrackPoint],
    total_distance_km: f64,
    ordinal: usize,
    total_photos: usize,
    event_start: NaiveDateTime,
    pace_min_per_km: f64,
) -> Option<Placement> {
    if points.is_empty() || total_photos == 0 {
        return None;
    }
    let count = points.len();
    let index = ordinal_index(ordinal, total_photos, count);
    let distance_km = index as f64 / count as f64 * total_distance_km;

    Some(Placement {
        point: points[index],
        point_index: index,
        distance_km,
        timestamp: estimate_timestamp(event_start, distance_km, pace_min_per_km),
    })
}

/// `floor(ordinal / total * count)`, clamped to the last index.
fn ordinal_index(ordinal: usize, total_photos: usize, count: usize) -> usize {
    let raw = (ordinal as f64 / total_photos as f64 * count as f64).floor() as usize;
    raw.min(count - 1)
}

/// Whole elapsed minutes at the given pace, added to the start time.
///
/// Saturates at `NaiveDateTime::MAX` instead of overflowing.
fn estimate_timestamp(
    event_start: NaiveDateTime,
    distance_km: f64,
    pace_min_per_km: f64,
) -> NaiveDateTime {
    let minutes = (distance_km * pace_min_per_km).floor() as i64;
    Duration::try_minutes(minutes)
        .and_then(|elapsed| event_start.checked_add_signed(elapsed))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Places photos along one course.
#[derive(Debug, Clone, Copy)]
pub struct PositionAssigner<'a> {
    course: &'a Course,
    pace_min_per_km: f64,
    distance_model: DistanceModel,
}

impl<'a> PositionAssigner<'a> {
    pub fn new(course: &'a Course, config: &MatcherConfig) -> Self {
        Self {
            course,
            pace_min_per_km: config.pace_min_per_km,
            distance_model: config.distance_model,
        }
    }

    /// Place photo `ordinal` of a batch of `total_photos`.
    ///
    /// Returns `None` only when `total_photos` is zero. Ordinals past the
    /// end of the batch clamp to the finish.
    pub fn assign(
        &self,
        ordinal: usize,
        total_photos: usize,
        event_start: NaiveDateTime,
    ) -> Option<Placement> {
        match self.distance_model {
            DistanceModel::PointIndex => assign_along(
                self.course.points(),
                self.course.total_distance_km(),
                ordinal,
                total_photos,
                event_start,
                self.pace_min_per_km,
            ),
            DistanceModel::ArcLength => {
                if total_photos == 0 {
                    return None;
                }
                let fraction = ordinal as f64 / total_photos as f64;
                let index = self.course.arc_index_at_fraction(fraction);
                let distance_km = self.course.scaled_distance_km(index);
                Some(Placement {
                    point: self.course.points()[index],
                    point_index: index,
                    distance_km,
                    timestamp: estimate_timestamp(event_start, distance_km, self.pace_min_per_km),
                })
            }
        }
    }

    /// Place a whole batch. Zero photos gives an empty list.
    pub fn assign_all(&self, total_photos: usize, event_start: NaiveDateTime) -> Vec<Placement> {
        (0..total_photos)
            .filter_map(|ordinal| self.assign(ordinal, total_photos, event_start))
            .collect()
    }
}
