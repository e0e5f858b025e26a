//! # Similarity Ranker
//!
//! Scores every photo of an event against a query embedding and returns the
//! ones at or above a threshold, best first.

use std::sync::Arc;

use chrono::NaiveDateTime;
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::MatcherConfig;
use crate::embedding::Embedding;
use crate::error::{PhotoMatchError, Result};
use crate::store::{EmbeddingStore, GalleryPhoto};

/// A gallery photo with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub photo: Arc<GalleryPhoto>,
    /// Cosine similarity times 100, not clamped
    pub similarity_percent: f64,
}

impl RankedResult {
    pub fn photo_id(&self) -> &str {
        &self.photo.id
    }

    pub fn band(&self, config: &MatcherConfig) -> SimilarityBand {
        SimilarityBand::from_percent(self.similarity_percent, config)
    }
}

/// Display band of a similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBand {
    High,
    Medium,
    Low,
}

impl SimilarityBand {
    pub fn from_percent(percent: f64, config: &MatcherConfig) -> Self {
        if percent >= config.high_band_percent {
            SimilarityBand::High
        } else if percent >= config.medium_band_percent {
            SimilarityBand::Medium
        } else {
            SimilarityBand::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityBand::High => "high",
            SimilarityBand::Medium => "medium",
            SimilarityBand::Low => "low",
        }
    }
}

/// Stretch of the course in km, `[start_km, end_km)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CourseSection {
    pub start_km: f64,
    pub end_km: f64,
}

impl CourseSection {
    pub fn new(start_km: f64, end_km: f64) -> Self {
        Self { start_km, end_km }
    }

    pub fn contains(&self, km: f64) -> bool {
        km >= self.start_km && km < self.end_km
    }

    /// Photos pinned by hand have no course distance and never match.
    fn admits(&self, photo: &GalleryPhoto) -> bool {
        photo
            .location
            .distance_km()
            .map_or(false, |km| self.contains(km))
    }
}

/// Capture-time range, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at >= self.start && at <= self.end
    }

    /// Pinned photos without a capture time never match.
    fn admits(&self, photo: &GalleryPhoto) -> bool {
        photo
            .location
            .timestamp()
            .map_or(false, |at| self.contains(at))
    }
}

/// Rank all photos of an event against `query`.
///
/// Keeps results with `similarity_percent >= min_percent`, sorted
/// descending. Equal scores keep insertion order. An event without photos
/// gives an empty list.
pub fn rank(
    store: &EmbeddingStore,
    query: &Embedding,
    event_id: &str,
    min_percent: f64,
) -> Result<Vec<RankedResult>> {
    rank_within(store, query, event_id, min_percent, None, None)
}

/// [`rank`], optionally restricted to a stretch of the course and to a
/// capture-time window. Both filters must pass when both are given.
pub fn rank_within(
    store: &EmbeddingStore,
    query: &Embedding,
    event_id: &str,
    min_percent: f64,
    section: Option<CourseSection>,
    window: Option<TimeWindow>,
) -> Result<Vec<RankedResult>> {
    if let Some(expected) = store.dimension() {
        if query.len() != expected {
            return Err(PhotoMatchError::InvalidEmbedding {
                expected,
                actual: query.len(),
            });
        }
    }

    let mut candidates = store.all_for(event_id);
    if let Some(section) = section {
        candidates.retain(|photo| section.admits(photo));
    }
    if let Some(window) = window {
        candidates.retain(|photo| window.admits(photo));
    }
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut results = score(candidates, query, min_percent);
    // stable: ties stay in insertion order
    results.sort_by(|a, b| b.similarity_percent.total_cmp(&a.similarity_percent));

    log::debug!(
        "[Ranker] '{}': {} results >= {:.1}%",
        event_id,
        results.len(),
        min_percent
    );
    Ok(results)
}

#[cfg(not(feature = "parallel"))]
fn score(candidates: Vec<Arc<GalleryPhoto>>, query: &Embedding, min_percent: f64) -> Vec<RankedResult> {
    candidates
        .into_iter()
        .filter_map(|photo| to_result(photo, query, min_percent))
        .collect()
}

#[cfg(feature = "parallel")]
fn score(candidates: Vec<Arc<GalleryPhoto>>, query: &Embedding, min_percent: f64) -> Vec<RankedResult> {
    // rayon collect keeps input order
    candidates
        .into_par_iter()
        .filter_map(|photo| to_result(photo, query, min_percent))
        .collect()
}

fn to_result(photo: Arc<GalleryPhoto>, query: &Embedding, min_percent: f64) -> Option<RankedResult> {
    let similarity_percent = photo.embedding.cosine(query) * 100.0;
    (similarity_percent >= min_percent).then(|| RankedResult {
        photo,
        similarity_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ImageRefs, PhotoLocation};
    use crate::TrackPoint;

    fn put(store: &EmbeddingStore, event: &str, v: Vec<f32>) -> String {
        store
            .put(
                event,
                "p.jpg",
                Embedding::new(v),
                PhotoLocation::Explicit {
                    point: TrackPoint::new(37.5, 127.0),
                    captured_at: None,
                },
                ImageRefs::default(),
            )
            .unwrap()
    }

    #[test]
    fn test_rank_order_and_threshold() {
        let store = EmbeddingStore::new();
        let low = put(&store, "e", vec![0.0, 1.0]);
        let best = put(&store, "e", vec![1.0, 0.0]);
        let mid = put(&store, "e", vec![1.0, 0.5]);
        put(&store, "other", vec![1.0, 0.0]);

        let query = Embedding::new(vec![1.0, 0.0]);
        let results = rank(&store, &query, "e", 70.0).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.photo_id()).collect();
        assert_eq!(ids, vec![best.as_str(), mid.as_str()]);
        assert!((results[0].similarity_percent - 100.0).abs() < 1e-9);
        assert!(!ids.contains(&low.as_str()));

        let everything = rank(&store, &query, "e", f64::NEG_INFINITY).unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let store = EmbeddingStore::new();
        let first = put(&store, "e", vec![1.0, 1.0]);
        let second = put(&store, "e", vec![1.0, 1.0]);
        let results = rank(&store, &Embedding::new(vec![1.0, 1.0]), "e", 0.0).unwrap();
        assert_eq!(results[0].photo_id(), first);
        assert_eq!(results[1].photo_id(), second);
    }

    #[test]
    fn test_empty_event() {
        let store = EmbeddingStore::new();
        put(&store, "e", vec![1.0, 0.0]);
        let results = rank(&store, &Embedding::new(vec![1.0, 0.0]), "empty", 0.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let store = EmbeddingStore::new();
        put(&store, "e", vec![1.0, 0.0]);
        let err = rank(&store, &Embedding::new(vec![1.0, 0.0, 0.0]), "e", 0.0).unwrap_err();
        assert!(matches!(err, PhotoMatchError::InvalidEmbedding { .. }));
    }

    #[test]
    fn test_section_excludes_explicit_locations() {
        let store = EmbeddingStore::new();
        put(&store, "e", vec![1.0, 0.0]);
        let section = CourseSection::new(0.0, 10.0);
        let results =
            rank_within(&store, &Embedding::new(vec![1.0, 0.0]), "e", 0.0, Some(section), None)
                .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_time_window_inclusive() {
        let at = |h: u32, m: u32| {
            chrono::NaiveDate::from_ymd_opt(2025, 11, 2)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap()
        };
        let store = EmbeddingStore::new();
        let pinned_at = |hour: u32| PhotoLocation::Explicit {
            point: TrackPoint::new(37.5, 127.0),
            captured_at: Some(at(hour, 0)),
        };
        let nine = store
            .put("e", "9.jpg", Embedding::new(vec![1.0, 0.0]), pinned_at(9), ImageRefs::default())
            .unwrap();
        let ten = store
            .put("e", "10.jpg", Embedding::new(vec![1.0, 0.0]), pinned_at(10), ImageRefs::default())
            .unwrap();
        store
            .put("e", "11.jpg", Embedding::new(vec![1.0, 0.0]), pinned_at(11), ImageRefs::default())
            .unwrap();
        // pinned without a capture time
        put(&store, "e", vec![1.0, 0.0]);

        let window = TimeWindow::new(at(9, 0), at(10, 0));
        let results =
            rank_within(&store, &Embedding::new(vec![1.0, 0.0]), "e", 0.0, None, Some(window))
                .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.photo_id()).collect();
        assert_eq!(ids, vec![nine.as_str(), ten.as_str()]);

        assert!(window.contains(at(9, 0)));
        assert!(window.contains(at(10, 0)));
        assert!(!window.contains(at(10, 1)));
    }

    #[test]
    fn test_bands() {
        let config = MatcherConfig::default();
        assert_eq!(SimilarityBand::from_percent(95.0, &config), SimilarityBand::High);
        assert_eq!(SimilarityBand::from_percent(90.0, &config), SimilarityBand::High);
        assert_eq!(SimilarityBand::from_percent(85.0, &config), SimilarityBand::Medium);
        assert_eq!(SimilarityBand::from_percent(72.0, &config), SimilarityBand::Low);
        assert_eq!(SimilarityBand::Medium.as_str(), "medium");
    }

    #[test]
    fn test_section_bounds() {
        let section = CourseSection::new(10.0, 20.0);
        assert!(section.contains(10.0));
        assert!(section.contains(19.99));
        assert!(!section.contains(20.0));
    }
}
