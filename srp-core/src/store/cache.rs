use crate::error::Result;
use crate::sparse::csc::CscMatrix;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of decoded chunks kept resident.
pub const DEFAULT_CAPACITY: usize = 2;

/// Bounded, recency-ordered cache of decoded haplotype chunks.
///
/// Decoded chunks are shared by `Arc`; evicting an entry only drops the
/// shelf's reference, so matrices handed out earlier stay valid. A per-key
/// guard serializes decoding, so at most one decode per chunk id runs at a
/// time and late arrivals pick up the shared result.
pub struct ChunkCache {
    capacity: usize,
    shelf: Mutex<LruCache<u64, Arc<CscMatrix>>>,
    inflight: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()).into())
}

impl ChunkCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            capacity: cap.get(),
            shelf: Mutex::new(LruCache::new(cap)),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The decoded chunk for `id`, loading it with `load` on a miss.
    pub fn get_or_load(
        &self,
        id: u64,
        load: impl FnOnce() -> Result<CscMatrix>,
    ) -> Result<Arc<CscMatrix>> {
        if let Some(hit) = lock(&self.shelf)?.get(&id) {
            return Ok(Arc::clone(hit));
        }
        let gate = Arc::clone(lock(&self.inflight)?.entry(id).or_default());
        let held = lock(&gate)?;
        // Someone may have finished decoding while we waited on the gate.
        let parked = lock(&self.shelf)?.get(&id).map(Arc::clone);
        let decoded = match parked {
            Some(hit) => Ok(hit),
            None => load().map(Arc::new).inspect(|decoded| {
                if let Ok(mut shelf) = lock(&self.shelf) {
                    shelf.put(id, Arc::clone(decoded));
                }
            }),
        };
        drop(held);
        lock(&self.inflight)?.remove(&id);
        decoded
    }

    #[cfg(test)]
    fn contains(&self, id: u64) -> bool {
        self.shelf
            .lock()
            .map(|shelf| shelf.contains(&id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn one_by_one(tag: u32) -> CscMatrix {
        CscMatrix::from_rows(&[vec![tag % 2 == 0]]).unwrap()
    }

    #[test]
    fn hit_skips_the_loader() {
        let cache = ChunkCache::new(2);
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_load(7, || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(one_by_one(7))
                })
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lru_eviction_order() {
        let cache = ChunkCache::new(2);
        let loads = AtomicUsize::new(0);
        let load = |id: u64| {
            cache
                .get_or_load(id, || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(one_by_one(id as u32))
                })
                .unwrap()
        };
        // access order 0,1,2,3,0: capacity 2 keeps {2,3} before the last access
        for id in [0, 1, 2, 3] {
            load(id);
        }
        assert!(!cache.contains(0) && !cache.contains(1));
        assert!(cache.contains(2) && cache.contains(3));
        load(0);
        assert_eq!(loads.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn evicted_chunks_stay_alive_for_holders() {
        let cache = ChunkCache::new(1);
        let kept = cache.get_or_load(0, || Ok(one_by_one(0))).unwrap();
        cache.get_or_load(1, || Ok(one_by_one(1))).unwrap();
        assert!(!cache.contains(0));
        assert_eq!(kept.shape(), (1, 1));
    }

    #[test]
    fn loader_failure_is_not_cached() {
        let cache = ChunkCache::new(2);
        let err = cache.get_or_load(5, || {
            Err(crate::error::PanelError::CorruptArchive("boom".into()))
        });
        assert!(err.is_err());
        assert!(!cache.contains(5));
        assert!(cache.get_or_load(5, || Ok(one_by_one(5))).is_ok());
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let cache = ChunkCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.get_or_load(0, || Ok(one_by_one(0))).unwrap();
        assert!(cache.contains(0));
    }
}
