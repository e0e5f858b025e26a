//! # Course Catalog
//!
//! Maps event ids to their route files and lazily loads each course the first
//! time it is asked for. The outcome is memoised per event for the lifetime of
//! the catalog: a course that fails to load stays unavailable, it is not
//! re-read on the next request.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use once_cell::sync::OnceCell;

use crate::config::{CatalogConfig, EventConfig};
use crate::course::Course;
use crate::error::{OptionExt, PhotoMatchError, Result};

struct CatalogEntry {
    event: EventConfig,
    course: OnceCell<Result<Arc<Course>>>,
}

/// Event id -> course, loaded on first access.
pub struct CourseCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl CourseCatalog {
    /// Create a catalog for the configured events. Nothing is read yet.
    pub fn new(config: CatalogConfig) -> Self {
        let entries = config
            .events
            .into_iter()
            .map(|event| {
                (
                    event.event_id.clone(),
                    CatalogEntry {
                        event,
                        course: OnceCell::new(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Catalog with no events; add courses with [`insert_course`](Self::insert_course).
    pub fn empty() -> Self {
        Self::new(CatalogConfig::default())
    }

    /// Read a catalog JSON file. Relative route paths are resolved against
    /// the directory of the catalog file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = CatalogConfig::from_json_file(path)?;
        if let Some(base) = path.parent() {
            for event in &mut config.events {
                if event.route_path.is_relative() {
                    event.route_path = base.join(&event.route_path);
                }
            }
        }
        Ok(Self::new(config))
    }

    /// Register an event with an already-built course.
    ///
    /// The event's route path is never read. Replaces any previous entry
    /// for the same id.
    pub fn insert_course(&mut self, event: EventConfig, course: Course) {
        let cell = OnceCell::new();
        let _ = cell.set(Ok(Arc::new(course)));
        self.entries
            .insert(event.event_id.clone(), CatalogEntry { event, course: cell });
    }

    /// Configuration of an event.
    pub fn event(&self, event_id: &str) -> Option<&EventConfig> {
        self.entries.get(event_id).map(|entry| &entry.event)
    }

    /// All configured event ids, sorted.
    pub fn event_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a load has been attempted for this event.
    pub fn is_loaded(&self, event_id: &str) -> bool {
        self.entries
            .get(event_id)
            .map_or(false, |entry| entry.course.get().is_some())
    }

    /// Get the course of an event, reading its route file on first access.
    ///
    /// Unknown ids fail with `UnknownEvent`; a missing or malformed route
    /// with `RouteUnavailable`, now and on every later call.
    pub fn load(&self, event_id: &str) -> Result<Arc<Course>> {
        let entry = self.entries.get(event_id).ok_or_unknown_event(event_id)?;
        entry
            .course
            .get_or_init(|| {
                let result = read_course(&entry.event).map(Arc::new);
                match &result {
                    Ok(course) => info!(
                        "[CourseCatalog] Loaded '{}': {} points, {:.2} km measured / {:.3} km nominal",
                        event_id,
                        course.point_count(),
                        course.measured_length_km(),
                        course.total_distance_km()
                    ),
                    Err(e) => warn!("[CourseCatalog] {}", e),
                }
                result
            })
            .clone()
    }
}

fn read_course(event: &EventConfig) -> Result<Course> {
    let file = File::open(&event.route_path).map_err(|e| {
        PhotoMatchError::route_unavailable(
            &event.event_id,
            format!("{}: {}", event.route_path.display(), e),
        )
    })?;
    Course::from_gpx_reader(
        &event.event_id,
        BufReader::new(file),
        event.total_distance_km,
    )
}
