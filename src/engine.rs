//! # Photo Match Engine
//!
//! Caller-facing facade that ties the pieces together:
//! - the course catalog (event id -> course, lazily loaded)
//! - the embedding store (the gallery)
//! - the embedder (image -> vector)
//! - a bounded cache of recent searches for marker expansion
//!
//! The engine is an ordinary value. Create one per gallery and share it
//! behind an `Arc`; every method takes `&self`.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDateTime;
use image::DynamicImage;
use log::{debug, info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::catalog::CourseCatalog;
use crate::config::MatcherConfig;
use crate::course::{Course, Waypoint};
use crate::declutter::{layout, same_location, MarkerView, PlacedMarker};
use crate::embedding::{Embedder, Embedding};
use crate::error::{OptionExt, PhotoMatchError, Result};
use crate::placement::{Placement, PositionAssigner};
use crate::ranking::{rank_within, CourseSection, RankedResult, TimeWindow};
use crate::search_cache::SearchCache;
use crate::store::{EmbeddingStore, ImageRefs, PhotoId, PhotoLocation};
use crate::{Bounds, TrackPoint};

// ============================================================================
// Request / Response Types
// ============================================================================

/// One photo handed in by a contributor.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub name: String,
    pub image: DynamicImage,
    /// Contributor-supplied pin; when absent the photo is placed on the course
    pub location: Option<TrackPoint>,
    /// Capture time, only used together with `location`
    pub captured_at: Option<NaiveDateTime>,
    pub refs: ImageRefs,
}

impl PhotoUpload {
    pub fn new(name: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            name: name.into(),
            image,
            location: None,
            captured_at: None,
            refs: ImageRefs::default(),
        }
    }

    pub fn with_location(mut self, point: TrackPoint) -> Self {
        self.location = Some(point);
        self
    }

    pub fn with_captured_at(mut self, captured_at: NaiveDateTime) -> Self {
        self.captured_at = Some(captured_at);
        self
    }

    pub fn with_refs(mut self, refs: ImageRefs) -> Self {
        self.refs = refs;
        self
    }
}

/// A batch item that could not be stored.
#[derive(Debug, Clone, Serialize)]
pub struct IngestFailure {
    /// Position in the submitted batch
    pub index: usize,
    pub name: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: PhotoMatchError,
}

/// Outcome of a batch upload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub event_id: String,
    /// Ids of stored photos, in batch order
    pub stored: Vec<PhotoId>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

fn serialize_display<S: Serializer>(
    error: &PhotoMatchError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Ranked matches of one query photo plus their map layout.
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// Handle for [`PhotoMatchEngine::expand_group`]
    pub search_id: String,
    pub event_id: String,
    pub results: Vec<RankedResult>,
    /// Same order as `results`
    pub markers: Vec<PlacedMarker>,
}

impl SearchResults {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Flat marker records for the renderer.
    pub fn views(&self, config: &MatcherConfig) -> Vec<MarkerView> {
        self.markers
            .iter()
            .map(|marker| MarkerView::from_marker(marker, config))
            .collect()
    }

    /// Marker records as a JSON array.
    pub fn markers_json(&self, config: &MatcherConfig) -> String {
        serde_json::to_string(&self.views(config)).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Everything needed for the initial map view of an event.
#[derive(Debug, Clone, Serialize)]
pub struct CourseOverview {
    pub event_id: String,
    pub name: String,
    pub total_distance_km: f64,
    pub measured_length_km: f64,
    pub point_count: usize,
    pub centroid: TrackPoint,
    pub start: TrackPoint,
    pub finish: TrackPoint,
    pub bounds: Bounds,
    pub waypoints: Vec<Waypoint>,
}

impl CourseOverview {
    pub fn from_course(course: &Course, name: &str) -> Self {
        Self {
            event_id: course.event_id().to_string(),
            name: name.to_string(),
            total_distance_km: course.total_distance_km(),
            measured_length_km: course.measured_length_km(),
            point_count: course.point_count(),
            centroid: course.centroid(),
            start: course.start(),
            finish: course.finish(),
            bounds: course.bounds(),
            waypoints: course.default_waypoints(),
        }
    }
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub event_count: usize,
    pub loaded_courses: usize,
    pub photo_count: usize,
    pub embedding_dimension: Option<usize>,
    pub cached_searches: usize,
}

// ============================================================================
// Photo Match Engine
// ============================================================================

/// Course-anchored photo gallery with visual search.
pub struct PhotoMatchEngine {
    catalog: CourseCatalog,
    store: Arc<EmbeddingStore>,
    embedder: Arc<dyn Embedder>,
    config: MatcherConfig,
    searches: Mutex<SearchCache>,
}

impl PhotoMatchEngine {
    /// Create an engine with an empty gallery of its own.
    pub fn new(
        catalog: CourseCatalog,
        embedder: Arc<dyn Embedder>,
        config: MatcherConfig,
    ) -> Result<Self> {
        Self::with_store(catalog, Arc::new(EmbeddingStore::new()), embedder, config)
    }

    /// Create an engine over an existing gallery.
    pub fn with_store(
        catalog: CourseCatalog,
        store: Arc<EmbeddingStore>,
        embedder: Arc<dyn Embedder>,
        config: MatcherConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            "[PhotoEngine] Created with {} events, {} stored photos",
            catalog.len(),
            store.len()
        );
        Ok(Self {
            catalog,
            store,
            embedder,
            searches: Mutex::new(SearchCache::new(config.search_cache_capacity)),
            config,
        })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CourseCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    // ========================================================================
    // Courses
    // ========================================================================

    pub fn load_course(&self, event_id: &str) -> Result<Arc<Course>> {
        self.catalog.load(event_id)
    }

    pub fn course_overview(&self, event_id: &str) -> Result<CourseOverview> {
        let course = self.catalog.load(event_id)?;
        let name = self
            .catalog
            .event(event_id)
            .map(|event| event.name.as_str())
            .unwrap_or_default();
        Ok(CourseOverview::from_course(&course, name))
    }

    /// Estimated positions for a batch of `photo_count` photos, starting
    /// from the event's configured start time.
    pub fn assign_positions(&self, event_id: &str, photo_count: usize) -> Result<Vec<Placement>> {
        let start = self.event_start(event_id)?;
        let course = self.catalog.load(event_id)?;
        Ok(PositionAssigner::new(&course, &self.config).assign_all(photo_count, start))
    }

    fn event_start(&self, event_id: &str) -> Result<NaiveDateTime> {
        self.catalog
            .event(event_id)
            .map(|event| event.start_time)
            .ok_or_unknown_event(event_id)
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Store a single photo. Any failure is returned as-is.
    ///
    /// Without an explicit location the photo is placed as the only member
    /// of its batch, i.e. at the start of the course.
    pub fn store_photo(&self, event_id: &str, upload: PhotoUpload) -> Result<PhotoId> {
        let start = self.event_start(event_id)?;
        let location = self.locate(event_id, start, &upload, 0, 1)?;
        let embedding = self.embed(&upload.name, &upload.image)?;
        self.store
            .put(event_id, &upload.name, embedding, location, upload.refs)
    }

    /// Store a batch of photos.
    ///
    /// Photos without a pin are spread along the course by their position
    /// in `uploads`. A failing item is recorded in the report and the rest
    /// of the batch carries on; if the course cannot be loaded only the
    /// unpinned items fail. Only an unknown event fails the whole call.
    pub fn ingest_batch(&self, event_id: &str, uploads: Vec<PhotoUpload>) -> Result<IngestReport> {
        let start = self.event_start(event_id)?;
        let total = uploads.len();
        let mut report = IngestReport {
            event_id: event_id.to_string(),
            ..IngestReport::default()
        };
        if total == 0 {
            return Ok(report);
        }

        let located: Vec<Result<PhotoLocation>> = uploads
            .iter()
            .enumerate()
            .map(|(ordinal, upload)| self.locate(event_id, start, upload, ordinal, total))
            .collect();
        let prepared = self.embed_located(&uploads, located);

        // inserts stay sequential so ids come out in batch order
        for (index, (upload, outcome)) in uploads.into_iter().zip(prepared).enumerate() {
            let stored = outcome.and_then(|(location, embedding)| {
                self.store
                    .put(event_id, &upload.name, embedding, location, upload.refs)
            });
            match stored {
                Ok(id) => report.stored.push(id),
                Err(error) => {
                    warn!("[PhotoEngine] Skipping '{}': {}", upload.name, error);
                    report.failures.push(IngestFailure {
                        index,
                        name: upload.name,
                        error,
                    });
                }
            }
        }

        info!(
            "[PhotoEngine] Ingested {}/{} photos for '{}'",
            report.stored.len(),
            total,
            event_id
        );
        Ok(report)
    }

    fn locate(
        &self,
        event_id: &str,
        start: NaiveDateTime,
        upload: &PhotoUpload,
        ordinal: usize,
        total: usize,
    ) -> Result<PhotoLocation> {
        if let Some(point) = upload.location {
            return Ok(PhotoLocation::Explicit {
                point,
                captured_at: upload.captured_at,
            });
        }
        let course = self.catalog.load(event_id)?;
        PositionAssigner::new(&course, &self.config)
            .assign(ordinal, total, start)
            .map(PhotoLocation::Assigned)
            .ok_or_else(|| PhotoMatchError::ConfigError {
                message: format!("cannot place photo {} of {}", ordinal, total),
            })
    }

    #[cfg(not(feature = "parallel"))]
    fn embed_located(
        &self,
        uploads: &[PhotoUpload],
        located: Vec<Result<PhotoLocation>>,
    ) -> Vec<Result<(PhotoLocation, Embedding)>> {
        uploads
            .iter()
            .zip(located)
            .map(|(upload, location)| -> Result<(PhotoLocation, Embedding)> {
                let location = location?;
                Ok((location, self.embed(&upload.name, &upload.image)?))
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn embed_located(
        &self,
        uploads: &[PhotoUpload],
        located: Vec<Result<PhotoLocation>>,
    ) -> Vec<Result<(PhotoLocation, Embedding)>> {
        uploads
            .par_iter()
            .zip(located.into_par_iter())
            .map(|(upload, location)| -> Result<(PhotoLocation, Embedding)> {
                let location = location?;
                Ok((location, self.embed(&upload.name, &upload.image)?))
            })
            .collect()
    }

    fn embed(&self, label: &str, image: &DynamicImage) -> Result<Embedding> {
        let embedding = self.embedder.embed(image).map_err(|e| match e {
            PhotoMatchError::EmbeddingFailure { .. } => e,
            other => PhotoMatchError::embedding(label, other),
        })?;
        embedding.check(label)?;
        Ok(embedding)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Find gallery photos that look like `query`.
    ///
    /// `min_percent` defaults to the configured threshold. The whole
    /// request fails if the event's course is unavailable or the query
    /// cannot be embedded.
    pub fn search(
        &self,
        event_id: &str,
        query: &DynamicImage,
        min_percent: Option<f64>,
    ) -> Result<SearchResults> {
        self.search_within(event_id, query, min_percent, None, None)
    }

    /// [`search`](Self::search) restricted to a stretch of the course
    /// and/or a capture-time window.
    pub fn search_within(
        &self,
        event_id: &str,
        query: &DynamicImage,
        min_percent: Option<f64>,
        section: Option<CourseSection>,
        window: Option<TimeWindow>,
    ) -> Result<SearchResults> {
        self.catalog.load(event_id)?;
        let min_percent = min_percent.unwrap_or(self.config.min_similarity_percent);
        let embedding = self.embed("query", query)?;
        let results = rank_within(
            &self.store,
            &embedding,
            event_id,
            min_percent,
            section,
            window,
        )?;
        let markers = layout(&results, &self.config);

        let search_id = Uuid::new_v4().to_string();
        self.searches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(search_id.clone(), Arc::new(results.clone()));

        info!(
            "[PhotoEngine] Search {} on '{}': {} matches >= {:.0}%",
            search_id,
            event_id,
            results.len(),
            min_percent
        );
        Ok(SearchResults {
            search_id,
            event_id: event_id.to_string(),
            results,
            markers,
        })
    }

    /// All results of an earlier search that share the clicked photo's
    /// spot, best first.
    pub fn expand_group(&self, search_id: &str, anchor_photo_id: &str) -> Result<Vec<RankedResult>> {
        let cached = self
            .searches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(search_id)
            .ok_or_else(|| PhotoMatchError::SearchExpired {
                search_id: search_id.to_string(),
            })?;

        let group = same_location(
            anchor_photo_id,
            &cached,
            self.config.coordinate_precision,
        );
        let group = (!group.is_empty())
            .then_some(group)
            .ok_or_photo_not_found(anchor_photo_id)?;
        debug!(
            "[PhotoEngine] Expanded {} in search {} to {} photos",
            anchor_photo_id,
            search_id,
            group.len()
        );
        Ok(group)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> EngineStats {
        let store = self.store.stats();
        let loaded_courses = self
            .catalog
            .event_ids()
            .iter()
            .filter(|id| self.catalog.is_loaded(id))
            .count();
        EngineStats {
            event_count: self.catalog.len(),
            loaded_courses,
            photo_count: store.photo_count,
            embedding_dimension: store.dimension,
            cached_searches: self
                .searches
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EventConfig;
    use chrono::NaiveDate;
    use image::{Rgb, RgbImage};

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 2)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([r, g, b])))
    }

    fn color_embedder() -> Arc<dyn Embedder> {
        Arc::new(|image: &DynamicImage| -> Result<Embedding> {
            let [r, g, b] = image.to_rgb8().get_pixel(0, 0).0;
            Ok(Embedding::new(vec![f32::from(r), f32::from(g), f32::from(b)]))
        })
    }

    fn engine() -> PhotoMatchEngine {
        let mut catalog = CourseCatalog::empty();
        let points: Vec<TrackPoint> = (0..100)
            .map(|i| TrackPoint::new(37.5 + i as f64 * 0.003, 127.0))
            .collect();
        catalog.insert_course(
            EventConfig::new("seoul", "seoul.gpx", start_time()),
            Course::new("seoul", points, 42.195).unwrap(),
        );
        PhotoMatchEngine::new(catalog, color_embedder(), MatcherConfig::default()).unwrap()
    }

    #[test]
    fn test_batch_places_by_ordinal() {
        let engine = engine();
        let uploads: Vec<PhotoUpload> = (0..8)
            .map(|i| PhotoUpload::new(format!("{}.jpg", i), solid(200, 10, 10)))
            .collect();
        let report = engine.ingest_batch("seoul", uploads).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.stored.len(), 8);

        let last = engine.store().get(&report.stored[7]).unwrap();
        assert!((last.location.distance_km().unwrap() - 0.87 * 42.195).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_event() {
        let engine = engine();
        let err = engine
            .ingest_batch("busan", vec![PhotoUpload::new("a.jpg", solid(1, 2, 3))])
            .unwrap_err();
        assert!(matches!(err, PhotoMatchError::UnknownEvent { .. }));
        assert!(engine.search("busan", &solid(1, 2, 3), None).is_err());
    }

    #[test]
    fn test_search_and_expand() {
        let engine = engine();
        let spot = TrackPoint::new(37.55, 127.0);
        let a = engine
            .store_photo("seoul", PhotoUpload::new("a.jpg", solid(200, 0, 0)).with_location(spot))
            .unwrap();
        let b = engine
            .store_photo("seoul", PhotoUpload::new("b.jpg", solid(100, 0, 0)).with_location(spot))
            .unwrap();
        engine
            .store_photo("seoul", PhotoUpload::new("c.jpg", solid(0, 0, 200)))
            .unwrap();

        let found = engine.search("seoul", &solid(50, 0, 0), None).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.markers.len(), 2);
        assert_eq!(found.markers[0].angle_degrees, Some(0.0));
        assert_eq!(found.markers[1].angle_degrees, Some(60.0));

        let group = engine.expand_group(&found.search_id, &b).unwrap();
        let ids: Vec<&str> = group.iter().map(|r| r.photo_id()).collect();
        assert_eq!(ids, vec![a.as_str(), b.as_str()]);

        assert!(matches!(
            engine.expand_group(&found.search_id, "nope"),
            Err(PhotoMatchError::PhotoNotFound { .. })
        ));
        assert!(matches!(
            engine.expand_group("old-search", &a),
            Err(PhotoMatchError::SearchExpired { .. })
        ));
    }

    #[test]
    fn test_search_within_time_window() {
        let engine = engine();
        let spot = TrackPoint::new(37.55, 127.0);
        let minutes = |m: i64| start_time() + chrono::Duration::minutes(m);
        let upload = |name: &str| PhotoUpload::new(name, solid(200, 0, 0)).with_location(spot);

        let at_nine = engine
            .store_photo("seoul", upload("nine.jpg").with_captured_at(minutes(60)))
            .unwrap();
        engine
            .store_photo("seoul", upload("late.jpg").with_captured_at(minutes(150)))
            .unwrap();
        // placed at the start line, stamped with the start time
        let placed = engine
            .store_photo("seoul", PhotoUpload::new("placed.jpg", solid(200, 0, 0)))
            .unwrap();
        engine.store_photo("seoul", upload("untimed.jpg")).unwrap();

        let window = TimeWindow::new(start_time(), minutes(60));
        let found = engine
            .search_within("seoul", &solid(200, 0, 0), None, None, Some(window))
            .unwrap();
        let ids: Vec<&str> = found.results.iter().map(|r| r.photo_id()).collect();
        assert_eq!(ids, vec![at_nine.as_str(), placed.as_str()]);

        let everything = engine.search("seoul", &solid(200, 0, 0), None).unwrap();
        assert_eq!(everything.len(), 4);
    }

    #[test]
    fn test_markers_json() {
        let engine = engine();
        engine
            .store_photo("seoul", PhotoUpload::new("a.jpg", solid(10, 20, 30)))
            .unwrap();
        let found = engine.search("seoul", &solid(10, 20, 30), None).unwrap();
        let json = found.markers_json(engine.config());
        assert!(json.contains("\"name\":\"a.jpg\""));
        assert!(json.contains("\"band\":\"high\""));
    }

    #[test]
    fn test_stats_and_overview() {
        let engine = engine();
        let overview = engine.course_overview("seoul").unwrap();
        assert_eq!(overview.point_count, 100);
        assert_eq!(overview.waypoints.len(), 5);

        engine
            .store_photo("seoul", PhotoUpload::new("a.jpg", solid(1, 1, 1)))
            .unwrap();
        engine.search("seoul", &solid(1, 1, 1), None).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.event_count, 1);
        assert_eq!(stats.loaded_courses, 1);
        assert_eq!(stats.photo_count, 1);
        assert_eq!(stats.embedding_dimension, Some(3));
        assert_eq!(stats.cached_searches, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MatcherConfig {
            fan_out_slots: 0,
            ..MatcherConfig::default()
        };
        assert!(matches!(
            PhotoMatchEngine::new(CourseCatalog::empty(), color_embedder(), config),
            Err(PhotoMatchError::ConfigError { .. })
        ));
    }
}
