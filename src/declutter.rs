//! # Marker Declutter
//!
//! Photos whose coordinates round to the same grid cell would be drawn on
//! top of each other. Members of such a group are fanned out on a small
//! circle around the cell so each marker stays clickable:
//!
//! ```text
//!            k=1 (60°)    k=0 (0°)
//!                 \        /
//!     k=2 (120°) - anchor - ...
//! ```
//!
//! Slot `k` sits at `anchor + r * (cos θ, sin θ)` with
//! `θ = 360° / slots * (k mod slots)`, latitude taking the cosine. Groups
//! larger than the slot count reuse positions.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::MatcherConfig;
use crate::ranking::{RankedResult, SimilarityBand};
use crate::TrackPoint;

/// Coordinates scaled by `10^precision` and rounded.
pub type GridKey = (i64, i64);

/// Grid cell of a point at `precision` decimal places.
pub fn grid_key(point: &TrackPoint, precision: u32) -> GridKey {
    let scale = 10f64.powi(precision as i32);
    (
        (point.latitude * scale).round() as i64,
        (point.longitude * scale).round() as i64,
    )
}

/// Rounded coordinate of a grid cell.
fn key_point(key: GridKey, precision: u32) -> TrackPoint {
    let scale = 10f64.powi(precision as i32);
    TrackPoint::new(key.0 as f64 / scale, key.1 as f64 / scale)
}

/// Results sharing one grid cell, in ranking order.
#[derive(Debug, Clone)]
pub struct MarkerGroup {
    pub key: GridKey,
    /// Rounded coordinate of the cell
    pub anchor: TrackPoint,
    pub members: Vec<RankedResult>,
}

impl MarkerGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// A result with the position it should be drawn at.
#[derive(Debug, Clone)]
pub struct PlacedMarker {
    pub result: RankedResult,
    pub display: TrackPoint,
    pub anchor: TrackPoint,
    /// Fan-out angle, `None` for a marker alone in its cell
    pub angle_degrees: Option<f64>,
    pub group_size: usize,
    pub key: GridKey,
}

/// Group results by grid cell.
///
/// Groups come out in order of first appearance; members keep their
/// relative order from `results`.
pub fn group_markers(results: &[RankedResult], config: &MatcherConfig) -> Vec<MarkerGroup> {
    let precision = config.coordinate_precision;
    let mut groups: Vec<MarkerGroup> = Vec::new();
    let mut slot_of: HashMap<GridKey, usize> = HashMap::new();

    for result in results {
        let key = grid_key(&result.photo.location.point(), precision);
        let slot = *slot_of.entry(key).or_insert_with(|| {
            groups.push(MarkerGroup {
                key,
                anchor: key_point(key, precision),
                members: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].members.push(result.clone());
    }
    groups
}

/// Display position for every result, in the order given.
pub fn layout(results: &[RankedResult], config: &MatcherConfig) -> Vec<PlacedMarker> {
    let precision = config.coordinate_precision;
    let slots = config.fan_out_slots.max(1);
    let keys: Vec<GridKey> = results
        .iter()
        .map(|r| grid_key(&r.photo.location.point(), precision))
        .collect();

    let mut sizes: HashMap<GridKey, usize> = HashMap::new();
    for key in &keys {
        *sizes.entry(*key).or_insert(0) += 1;
    }

    let mut seen: HashMap<GridKey, u32> = HashMap::new();
    results
        .iter()
        .zip(keys)
        .map(|(result, key)| {
            let group_size = sizes.get(&key).copied().unwrap_or(1);
            let exact = result.photo.location.point();
            if group_size == 1 {
                return PlacedMarker {
                    result: result.clone(),
                    display: exact,
                    anchor: exact,
                    angle_degrees: None,
                    group_size,
                    key,
                };
            }

            let k = seen.entry(key).or_insert(0);
            let angle = 360.0 / f64::from(slots) * f64::from(*k % slots);
            *k += 1;

            let anchor = key_point(key, precision);
            let radians = angle.to_radians();
            let radius = config.offset_radius_degrees;
            PlacedMarker {
                result: result.clone(),
                display: TrackPoint::new(
                    anchor.latitude + radius * radians.cos(),
                    anchor.longitude + radius * radians.sin(),
                ),
                anchor,
                angle_degrees: Some(angle),
                group_size,
                key,
            }
        })
        .collect()
}

/// Every result in the same cell as `anchor_photo_id`, best first.
///
/// Empty when the anchor is not among `all`.
pub fn same_location(
    anchor_photo_id: &str,
    all: &[RankedResult],
    precision: u32,
) -> Vec<RankedResult> {
    let Some(anchor) = all.iter().find(|r| r.photo_id() == anchor_photo_id) else {
        return Vec::new();
    };
    let key = grid_key(&anchor.photo.location.point(), precision);

    let mut matches: Vec<RankedResult> = all
        .iter()
        .filter(|r| grid_key(&r.photo.location.point(), precision) == key)
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.similarity_percent.total_cmp(&a.similarity_percent));
    matches
}

/// Flat marker record handed to the map renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    pub photo_id: String,
    pub name: String,
    pub image_ref: String,
    pub thumbnail_ref: String,
    pub latitude: f64,
    pub longitude: f64,
    pub display_latitude: f64,
    pub display_longitude: f64,
    pub distance_km: Option<f64>,
    pub timestamp: Option<NaiveDateTime>,
    pub similarity_percent: f64,
    pub band: SimilarityBand,
    pub group_size: usize,
}

impl MarkerView {
    pub fn from_marker(marker: &PlacedMarker, config: &MatcherConfig) -> Self {
        let photo = &marker.result.photo;
        let point = photo.location.point();
        Self {
            photo_id: photo.id.clone(),
            name: photo.name.clone(),
            image_ref: photo.refs.image_ref.clone(),
            thumbnail_ref: photo.refs.thumbnail_ref.clone(),
            latitude: point.latitude,
            longitude: point.longitude,
            display_latitude: marker.display.latitude,
            display_longitude: marker.display.longitude,
            distance_km: photo.location.distance_km(),
            timestamp: photo.location.timestamp(),
            similarity_percent: marker.result.similarity_percent,
            band: marker.result.band(config),
            group_size: marker.group_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use crate::store::{GalleryPhoto, ImageRefs, PhotoLocation};
    use std::sync::Arc;

    fn result(id: &str, lat: f64, lng: f64, similarity: f64) -> RankedResult {
        RankedResult {
            photo: Arc::new(GalleryPhoto {
                id: id.to_string(),
                event_id: "e".to_string(),
                name: format!("{}.jpg", id),
                embedding: Embedding::new(vec![1.0]),
                location: PhotoLocation::Explicit {
                    point: TrackPoint::new(lat, lng),
                    captured_at: None,
                },
                refs: ImageRefs::default(),
            }),
            similarity_percent: similarity,
        }
    }

    #[test]
    fn test_grid_key_rounding() {
        assert_eq!(
            grid_key(&TrackPoint::new(37.123454, 127.000006), 5),
            (3_712_345, 12_700_001)
        );
        assert_eq!(
            grid_key(&TrackPoint::new(37.123454, 127.0), 5),
            grid_key(&TrackPoint::new(37.123451, 127.0), 5)
        );
    }

    #[test]
    fn test_two_in_one_cell() {
        let config = MatcherConfig::default();
        let results = vec![
            result("a", 37.5, 127.0, 100.0),
            result("b", 37.500001, 127.000002, 100.0),
        ];
        let placed = layout(&results, &config);

        assert_eq!(placed[0].angle_degrees, Some(0.0));
        assert_eq!(placed[1].angle_degrees, Some(60.0));
        assert_eq!(placed[0].group_size, 2);
        assert!((placed[0].display.latitude - (37.5 + 0.00022)).abs() < 1e-12);
        assert!((placed[0].display.longitude - 127.0).abs() < 1e-12);
        let rad = 60f64.to_radians();
        assert!((placed[1].display.latitude - (37.5 + 0.00022 * rad.cos())).abs() < 1e-12);
        assert!((placed[1].display.longitude - (127.0 + 0.00022 * rad.sin())).abs() < 1e-12);
        assert_ne!(placed[0].display, placed[1].display);
    }

    #[test]
    fn test_singleton_at_exact_location() {
        let config = MatcherConfig::default();
        let results = vec![
            result("a", 37.500001, 127.0, 90.0),
            result("b", 37.6, 127.1, 80.0),
        ];
        let placed = layout(&results, &config);
        assert_eq!(placed[0].display, TrackPoint::new(37.500001, 127.0));
        assert_eq!(placed[0].angle_degrees, None);
        assert_eq!(placed[0].group_size, 1);
    }

    #[test]
    fn test_offsets_wrap_after_six() {
        let config = MatcherConfig::default();
        let results: Vec<RankedResult> = (0..8)
            .map(|i| result(&i.to_string(), 37.5, 127.0, 100.0 - i as f64))
            .collect();
        let placed = layout(&results, &config);
        let angles: Vec<f64> = placed.iter().filter_map(|m| m.angle_degrees).collect();
        assert_eq!(angles, vec![0.0, 60.0, 120.0, 180.0, 240.0, 300.0, 0.0, 60.0]);
        assert_eq!(placed[0].display, placed[6].display);
    }

    #[test]
    fn test_group_order() {
        let config = MatcherConfig::default();
        let results = vec![
            result("a", 37.6, 127.0, 99.0),
            result("b", 37.5, 127.0, 95.0),
            result("c", 37.6, 127.0, 90.0),
        ];
        let groups = group_markers(&results, &config);
        assert_eq!(groups.len(), 2);
        let first: Vec<&str> = groups[0].members.iter().map(|r| r.photo_id()).collect();
        assert_eq!(first, vec!["a", "c"]);
        assert_eq!(groups[1].len(), 1);
        assert_eq!(groups[0].anchor, TrackPoint::new(37.6, 127.0));
    }

    #[test]
    fn test_same_location() {
        let results = vec![
            result("a", 37.6, 127.0, 75.0),
            result("b", 37.5, 127.0, 95.0),
            result("c", 37.6, 127.0, 90.0),
        ];
        let from_a: Vec<String> = same_location("a", &results, 5)
            .iter()
            .map(|r| r.photo_id().to_string())
            .collect();
        let from_c: Vec<String> = same_location("c", &results, 5)
            .iter()
            .map(|r| r.photo_id().to_string())
            .collect();
        assert_eq!(from_a, vec!["c", "a"]);
        assert_eq!(from_a, from_c);
        assert!(same_location("zzz", &results, 5).is_empty());
    }

    #[test]
    fn test_marker_view() {
        let config = MatcherConfig::default();
        let results = vec![result("a", 37.5, 127.0, 85.0)];
        let placed = layout(&results, &config);
        let view = MarkerView::from_marker(&placed[0], &config);
        assert_eq!(view.band, SimilarityBand::Medium);
        assert_eq!(view.distance_km, None);
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"band\":\"medium\""));
    }
}
