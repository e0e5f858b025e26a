//! # Embedding Store
//!
//! In-memory gallery of embedded photos, partitioned by event.
//!
//! Records are appended and never mutated. Readers clone `Arc`s out under a
//! read lock, so a concurrent insert is either fully visible or not at all.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::error::{PhotoMatchError, Result};
use crate::placement::Placement;
use crate::TrackPoint;

/// Gallery-wide unique photo id (UUID v4 string).
pub type PhotoId = String;

/// Where a photo sits on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhotoLocation {
    /// Estimated from the photo's position in its upload batch.
    Assigned(Placement),
    /// Pinned by the contributor. No course distance is estimated.
    Explicit {
        point: TrackPoint,
        captured_at: Option<NaiveDateTime>,
    },
}

impl PhotoLocation {
    pub fn point(&self) -> TrackPoint {
        match self {
            PhotoLocation::Assigned(placement) => placement.point,
            PhotoLocation::Explicit { point, .. } => *point,
        }
    }

    /// Distance from the start in km, only known for assigned locations.
    pub fn distance_km(&self) -> Option<f64> {
        match self {
            PhotoLocation::Assigned(placement) => Some(placement.distance_km),
            PhotoLocation::Explicit { .. } => None,
        }
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            PhotoLocation::Assigned(placement) => Some(placement.timestamp),
            PhotoLocation::Explicit { captured_at, .. } => *captured_at,
        }
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, PhotoLocation::Explicit { .. })
    }
}

/// Opaque handles to the stored image and its thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRefs {
    pub image_ref: String,
    pub thumbnail_ref: String,
}

impl ImageRefs {
    pub fn new(image_ref: impl Into<String>, thumbnail_ref: impl Into<String>) -> Self {
        Self {
            image_ref: image_ref.into(),
            thumbnail_ref: thumbnail_ref.into(),
        }
    }
}

/// One photo in the gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryPhoto {
    pub id: PhotoId,
    pub event_id: String,
    /// Original file name
    pub name: String,
    pub embedding: Embedding,
    pub location: PhotoLocation,
    pub refs: ImageRefs,
}

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub photo_count: usize,
    pub event_count: usize,
    /// Embedding length fixed by the first insert
    pub dimension: Option<usize>,
}

#[derive(Default)]
struct StoreInner {
    events: HashMap<String, Vec<Arc<GalleryPhoto>>>,
    by_id: HashMap<PhotoId, Arc<GalleryPhoto>>,
    dimension: Option<usize>,
}

/// Append-only photo gallery keyed by event id.
#[derive(Default)]
pub struct EmbeddingStore {
    inner: RwLock<StoreInner>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a photo and return its new id.
    ///
    /// The first insert fixes the embedding dimension for the whole store;
    /// later embeddings of another length fail with `InvalidEmbedding`.
    pub fn put(
        &self,
        event_id: &str,
        name: &str,
        embedding: Embedding,
        location: PhotoLocation,
        refs: ImageRefs,
    ) -> Result<PhotoId> {
        embedding.check(name)?;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(expected) = inner.dimension {
            if embedding.len() != expected {
                return Err(PhotoMatchError::InvalidEmbedding {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        let id = Uuid::new_v4().to_string();
        let photo = Arc::new(GalleryPhoto {
            id: id.clone(),
            event_id: event_id.to_string(),
            name: name.to_string(),
            embedding,
            location,
            refs,
        });

        inner.dimension.get_or_insert(photo.embedding.len());
        inner.by_id.insert(id.clone(), Arc::clone(&photo));
        let event_photos = inner.events.entry(event_id.to_string()).or_default();
        event_photos.push(photo);
        debug!(
            "[EmbeddingStore] Stored {} for '{}' ({} photos in event)",
            id,
            event_id,
            event_photos.len()
        );
        Ok(id)
    }

    /// All photos of an event in insertion order. Unknown events give an
    /// empty list.
    pub fn all_for(&self, event_id: &str) -> Vec<Arc<GalleryPhoto>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.events.get(event_id).cloned().unwrap_or_default()
    }

    pub fn get(&self, photo_id: &str) -> Option<Arc<GalleryPhoto>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_id.get(photo_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_for(&self, event_id: &str) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.events.get(event_id).map_or(0, Vec::len)
    }

    /// Embedding length, `None` until the first photo is stored.
    pub fn dimension(&self) -> Option<usize> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dimension
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        StoreStats {
            photo_count: inner.by_id.len(),
            event_count: inner.events.len(),
            dimension: inner.dimension,
        }
    }
}
