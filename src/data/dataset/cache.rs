use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use ndarray::ArrayD;

use crate::error::Result;

/// Identifies one chunk: the column it belongs to and its position in that
/// column's chunk sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey {
    pub column: String,
    pub chunk: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Chunks currently held.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Reads issued to the array store.
    pub fetches: usize,
}

// `None` until the first successful fetch. The slot's lock is held for the
// duration of a fetch, so concurrent lookups of a missing chunk wait for it
// instead of fetching again.
type Slot = Arc<Mutex<Option<Arc<ArrayD<f64>>>>>;

/// Process-local cache of fetched chunks. Never persisted; failed fetches are
/// not remembered.
#[derive(Debug, Default)]
pub struct ChunkCache {
    slots: RwLock<HashMap<ChunkKey, Slot>>,
    hits: AtomicUsize,
    fetches: AtomicUsize,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the chunk under `key`, calling `fetch` only if no earlier call
    /// has stored it.
    pub fn get_or_fetch<F>(&self, key: &ChunkKey, fetch: F) -> Result<Arc<ArrayD<f64>>>
    where
        F: FnOnce() -> Result<ArrayD<f64>>,
    {
        let slot = self.slot(key);
        let mut chunk = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(array) = chunk.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("chunk {} of `{}` served from cache", key.chunk, key.column);
            return Ok(Arc::clone(array));
        }

        log::debug!("fetching chunk {} of `{}`", key.chunk, key.column);
        let array = Arc::new(fetch()?);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        *chunk = Some(Arc::clone(&array));
        Ok(array)
    }

    pub fn contains(&self, key: &ChunkKey) -> bool {
        let slot = self.slots.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned();
        slot.map_or(false, |s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
    }

    pub fn stats(&self) -> CacheStats {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let entries = slots
            .values()
            .filter(|s| s.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count();
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }

    /// Drops every cached chunk. The hit and fetch counters keep counting.
    pub fn clear(&self) {
        self.slots.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn slot(&self, key: &ChunkKey) -> Slot {
        let existing = self.slots.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned();
        match existing {
            Some(slot) => slot,
            None => self
                .slots
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key.clone())
                .or_default()
                .clone(),
        }
    }
}
