//! # Search Cache
//!
//! Keeps the ranked results of recent searches so a map click on a marker
//! group can be expanded without re-embedding the query photo.
//!
//! Bounded by entry count with least-recently-used eviction. Eviction is a
//! linear scan, which is fine for the few dozen searches kept.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ranking::RankedResult;

#[derive(Debug)]
struct Slot {
    results: Arc<Vec<RankedResult>>,
    last_access: u64,
}

/// Search id -> ranked results, least recently used evicted first.
#[derive(Debug)]
pub struct SearchCache {
    capacity: usize,
    slots: HashMap<String, Slot>,
    clock: u64,
}

impl SearchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: HashMap::with_capacity(capacity),
            clock: 0,
        }
    }

    /// Remember a search, evicting the stalest one when full.
    pub fn insert(&mut self, search_id: String, results: Arc<Vec<RankedResult>>) {
        self.clock += 1;
        if let Some(slot) = self.slots.get_mut(&search_id) {
            slot.results = results;
            slot.last_access = self.clock;
            return;
        }
        if self.slots.len() >= self.capacity {
            self.evict_oldest();
        }
        self.slots.insert(
            search_id,
            Slot {
                results,
                last_access: self.clock,
            },
        );
    }

    /// Look up a search and mark it as recently used.
    pub fn get(&mut self, search_id: &str) -> Option<Arc<Vec<RankedResult>>> {
        let slot = self.slots.get_mut(search_id)?;
        self.clock += 1;
        slot.last_access = self.clock;
        Some(Arc::clone(&slot.results))
    }

    pub fn contains(&self, search_id: &str) -> bool {
        self.slots.contains_key(search_id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.clock = 0;
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_access)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            log::debug!("[SearchCache] Evicting search {}", id);
            self.slots.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use crate::store::{GalleryPhoto, ImageRefs, PhotoLocation};
    use crate::TrackPoint;

    fn results(count: usize) -> Arc<Vec<RankedResult>> {
        let photos = (0..count)
            .map(|i| RankedResult {
                photo: Arc::new(GalleryPhoto {
                    id: i.to_string(),
                    event_id: "e".to_string(),
                    name: format!("{}.jpg", i),
                    embedding: Embedding::new(vec![1.0]),
                    location: PhotoLocation::Explicit {
                        point: TrackPoint::new(37.5, 127.0),
                        captured_at: None,
                    },
                    refs: ImageRefs::default(),
                }),
                similarity_percent: 90.0,
            })
            .collect();
        Arc::new(photos)
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = SearchCache::new(4);
        cache.insert("s1".to_string(), results(3));
        assert_eq!(cache.get("s1").unwrap().len(), 3);
        assert!(cache.get("s2").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = SearchCache::new(3);
        cache.insert("a".to_string(), results(1));
        cache.insert("b".to_string(), results(1));
        cache.insert("c".to_string(), results(1));

        // touch "a" so "b" is the stalest
        cache.get("a");
        cache.insert("d".to_string(), results(1));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_replace_existing() {
        let mut cache = SearchCache::new(2);
        cache.insert("a".to_string(), results(1));
        cache.insert("a".to_string(), results(4));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").unwrap().len(), 4);
    }

    #[test]
    fn test_clear_and_zero_capacity() {
        let mut cache = SearchCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.insert("a".to_string(), results(0));
        cache.insert("b".to_string(), results(0));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
