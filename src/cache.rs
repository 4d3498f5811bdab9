//! Fixed-capacity, LRU-evicted cache of decoded raw blocks.
//!
//! Generalizes the teacher's per-call `read_sectors` pattern
//! (`drivers/fs/ext2/structs.rs`) with a shared cache in front of it, guarded
//! by a single mutex plus a "stall slot" so concurrent misses on the same
//! block coalesce into one read instead of racing (see `BlockCache::get_or_load`).

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::Result;

const DEFAULT_CAPACITY: usize = 128;

enum Slot {
    /// Another caller is already performing the underlying read.
    Loading,
    Ready(Arc<[u8]>),
}

struct Inner {
    entries: HashMap<u64, (Slot, u64)>,
    tick: u64,
}

impl Inner {
    fn touch(&mut self, block_no: u64) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(&block_no) {
            entry.1 = tick;
        }
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .filter(|(_, (slot, _))| matches!(slot, Slot::Ready(_)))
            .min_by_key(|(_, (_, tick))| *tick)
            .map(|(block_no, _)| *block_no);
        if let Some(block_no) = victim {
            log::debug!("block cache evicting block {block_no}");
            self.entries.remove(&block_no);
        }
    }
}

/// Read-through cache keyed by physical block number. Block 0 is never
/// cached: it holds the boot record/reserved area and every caller that
/// needs it reads directly.
pub struct BlockCache {
    capacity: usize,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Return the decoded contents of `block_no`, loading it via `loader` on
    /// a cache miss. `loader` is called with no lock held, so other readers
    /// can hit the cache (or wait on the same miss) while I/O is in flight.
    pub fn get_or_load(
        &self,
        block_no: u64,
        loader: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<Arc<[u8]>> {
        if block_no == 0 {
            return loader().map(|data| Arc::from(data.into_boxed_slice()));
        }

        let mut guard = self.inner.lock().expect("block cache mutex poisoned");
        loop {
            match guard.entries.get(&block_no) {
                Some((Slot::Ready(data), _)) => {
                    let data = data.clone();
                    guard.touch(block_no);
                    return Ok(data);
                }
                Some((Slot::Loading, _)) => {
                    guard = self.cond.wait(guard).expect("block cache mutex poisoned");
                }
                None => break,
            }
        }

        if guard.entries.len() >= self.capacity {
            guard.evict_one();
        }
        guard.tick += 1;
        let tick = guard.tick;
        guard.entries.insert(block_no, (Slot::Loading, tick));
        drop(guard);

        let result = loader();

        let mut guard = self.inner.lock().expect("block cache mutex poisoned");
        match result {
            Ok(data) => {
                let arc: Arc<[u8]> = Arc::from(data.into_boxed_slice());
                let tick = guard.tick;
                guard.entries.insert(block_no, (Slot::Ready(arc.clone()), tick));
                drop(guard);
                self.cond.notify_all();
                Ok(arc)
            }
            Err(e) => {
                guard.entries.remove(&block_no);
                drop(guard);
                self.cond.notify_all();
                Err(e)
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn caches_hits_without_reloading() {
        let cache = BlockCache::new();
        let loads = AtomicUsize::new(0);
        for _ in 0..5 {
            cache
                .get_or_load(7, || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_caches_block_zero() {
        let cache = BlockCache::new();
        let loads = AtomicUsize::new(0);
        for _ in 0..3 {
            cache
                .get_or_load(0, || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![0; 8])
                })
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn evicts_lru_beyond_capacity() {
        let cache = BlockCache::with_capacity(2);
        cache.get_or_load(1, || Ok(vec![1])).unwrap();
        cache.get_or_load(2, || Ok(vec![2])).unwrap();
        cache.get_or_load(1, || Ok(vec![1])).unwrap(); // touch 1, 2 becomes LRU
        cache.get_or_load(3, || Ok(vec![3])).unwrap(); // evicts 2
        assert_eq!(cache.len(), 2);
        let loads = AtomicUsize::new(0);
        cache
            .get_or_load(2, || {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok(vec![2])
            })
            .unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
