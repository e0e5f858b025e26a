//! # Course Photo Matcher
//!
//! Course-anchored photo placement and visual similarity search for race
//! photo galleries.
//!
//! This library provides:
//! - Race courses parsed from GPX tracks with distance lookups
//! - Position and time estimates for photos along a course
//! - An in-memory gallery of photo embeddings per event
//! - Cosine-similarity ranking of the gallery against a query photo
//! - Map marker layout that fans out photos sharing a spot
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel scoring and batch embedding with rayon
//! - **`cli`** - Build the `course-photo-cli` debug tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use course_photo_matcher::{Course, TrackPoint, MatcherConfig, PositionAssigner};
//! use chrono::NaiveDate;
//!
//! let points: Vec<TrackPoint> = (0..100)
//!     .map(|i| TrackPoint::new(37.5 + i as f64 * 0.001, 127.0))
//!     .collect();
//! let course = Course::new("seoul-2025", points, 42.195).unwrap();
//!
//! let start = NaiveDate::from_ymd_opt(2025, 3, 16)
//!     .unwrap()
//!     .and_hms_opt(8, 0, 0)
//!     .unwrap();
//! let assigner = PositionAssigner::new(&course, &MatcherConfig::default());
//! let placements = assigner.assign_all(8, start);
//!
//! assert_eq!(placements.len(), 8);
//! assert_eq!(placements[0].distance_km, 0.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PhotoMatchError, Result};

// Matcher and event configuration
pub mod config;
pub use config::{
    CatalogConfig, DistanceModel, EventConfig, MatcherConfig, MARATHON_KM, MAX_DISTANCE_KM,
    MAX_PACE_MIN_PER_KM,
};

// Geographic utilities (distance, centroid)
pub mod geo_utils;

// Course model built from route track points
pub mod course;
pub use course::{Course, Waypoint};

// Event id -> course, lazily loaded from GPX files
pub mod catalog;
pub use catalog::CourseCatalog;

// Photo positions and time estimates along a course
pub mod placement;
pub use placement::{assign_along, Placement, PositionAssigner};

// Embedding vectors and the embedding function seam
pub mod embedding;
pub use embedding::{cosine_similarity, Embedder, Embedding, LazyEmbedder};

// In-memory gallery of embedded photos
pub mod store;
pub use store::{EmbeddingStore, GalleryPhoto, ImageRefs, PhotoId, PhotoLocation, StoreStats};

// Similarity ranking
pub mod ranking;
pub use ranking::{rank, rank_within, CourseSection, RankedResult, SimilarityBand, TimeWindow};

// Marker grouping and fan-out layout
pub mod declutter;
pub use declutter::{
    grid_key, group_markers, layout, same_location, GridKey, MarkerGroup, MarkerView,
    PlacedMarker,
};

// Recent search results kept for marker expansion
pub mod search_cache;

// Caller-facing engine
pub mod engine;
pub use engine::{
    CourseOverview, EngineStats, IngestFailure, IngestReport, PhotoMatchEngine, PhotoUpload,
    SearchResults,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use course_photo_matcher::TrackPoint;
/// let point = TrackPoint::new(37.5665, 126.9780); // Seoul City Hall
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl TrackPoint {
    /// Create a new track point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from track points.
    pub fn from_points(points: &[TrackPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Check whether a point lies inside (edges included).
    pub fn contains(&self, point: &TrackPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lng
            && point.longitude <= self.max_lng
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_point_validation() {
        assert!(TrackPoint::new(37.5665, 126.9780).is_valid());
        assert!(!TrackPoint::new(91.0, 0.0).is_valid());
        assert!(!TrackPoint::new(0.0, 181.0).is_valid());
        assert!(!TrackPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_from_points() {
        let points = vec![
            TrackPoint::new(37.50, 127.00),
            TrackPoint::new(37.52, 126.98),
            TrackPoint::new(37.51, 127.03),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 37.50);
        assert_eq!(bounds.max_lat, 37.52);
        assert_eq!(bounds.min_lng, 126.98);
        assert_eq!(bounds.max_lng, 127.03);
        assert!(bounds.contains(&TrackPoint::new(37.51, 127.0)));
        assert!(!bounds.contains(&TrackPoint::new(37.60, 127.0)));

        assert!(Bounds::from_points(&[]).is_none());
    }
}
