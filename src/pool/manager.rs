/*!
 * Buffer Manager
 *
 * One tier of the pool: a list of fixed-size slabs plus a chunk index.
 * Misses fetch from the parent (the next tier out, or the data provider
 * standing in for disk) under a per-key condition variable so concurrent
 * getters wait on one producer instead of duplicating the fetch.
 */

use super::buffer::PinnedBuffer;
use super::slab::Slab;
use super::types::{ChunkKey, ChunkPrefix, MemTier, PoolError, PoolResult, PoolStats};
use crate::core::limits::{MIN_SLAB_SIZE, POOL_PAGE_SIZE};
use crate::storage::provider::DataProvider;
use ahash::RandomState;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where a tier's misses are satisfied from
pub enum ParentSource {
    /// The next tier out
    Tier(Arc<BufferMgr>),
    /// The data provider, standing in for the disk level
    Provider(Arc<dyn DataProvider>),
}

#[derive(Clone)]
struct BufferEntry {
    bytes: Arc<[u8]>,
    /// (slab index, start page, page count); None for zero-copy wrappers
    loc: Option<(usize, usize, usize)>,
}

struct FetchState {
    done: Mutex<bool>,
    cv: Condvar,
}

/// Shared tier state; buffer handles keep it alive for unpinning
pub struct MgrInner {
    slabs: Mutex<Vec<Slab>>,
    chunk_index: Mutex<HashMap<ChunkKey, BufferEntry, RandomState>>,
    in_flight: Mutex<HashMap<ChunkKey, Arc<FetchState>, RandomState>>,
    clock: AtomicU64,
    evictions: AtomicU64,
}

impl MgrInner {
    pub(super) fn unpin_segment(&self, slab: usize, start_page: usize) {
        let mut slabs = self.slabs.lock();
        if let Some(s) = slabs.get_mut(slab) {
            s.unpin(start_page);
        }
    }
}

/// One pool tier
pub struct BufferMgr {
    tier: MemTier,
    page_size: usize,
    /// Preferred pages per new slab
    slab_pages: usize,
    /// Total page budget for the tier
    max_pages: usize,
    parent: ParentSource,
    inner: Arc<MgrInner>,
}

impl BufferMgr {
    #[must_use]
    pub fn new(tier: MemTier, slab_bytes: usize, max_bytes: usize, parent: ParentSource) -> Self {
        Self {
            tier,
            page_size: POOL_PAGE_SIZE,
            slab_pages: (slab_bytes / POOL_PAGE_SIZE).max(1),
            max_pages: (max_bytes / POOL_PAGE_SIZE).max(1),
            parent,
            inner: Arc::new(MgrInner {
                slabs: Mutex::new(Vec::new()),
                chunk_index: Mutex::new(HashMap::with_hasher(RandomState::new())),
                in_flight: Mutex::new(HashMap::with_hasher(RandomState::new())),
                clock: AtomicU64::new(1),
                evictions: AtomicU64::new(0),
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn tier(&self) -> MemTier {
        self.tier
    }

    fn tick(&self) -> u64 {
        self.inner.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn pages_for(&self, len: usize) -> usize {
        (len.max(1) + self.page_size - 1) / self.page_size
    }

    /// Register bytes under a new key, reserving pool space. Errors when
    /// the key is already resident or the tier cannot host the request
    /// even after eviction and slab growth.
    pub fn create_buffer(&self, key: ChunkKey, bytes: Arc<[u8]>) -> PoolResult<PinnedBuffer> {
        {
            let index = self.inner.chunk_index.lock();
            if index.contains_key(&key) {
                return Err(PoolError::DuplicateKey(key));
            }
        }
        let pages = self.pages_for(bytes.len());
        let clock = self.tick();
        let (slab_idx, start_page, displaced) = self.reserve_pages(key, pages, clock)?;
        if !displaced.is_empty() {
            let mut index = self.inner.chunk_index.lock();
            for evicted in &displaced {
                index.remove(evicted);
            }
            self.inner
                .evictions
                .fetch_add(displaced.len() as u64, Ordering::Relaxed);
            info!(
                "Evicted {} chunks from {:?} tier to host {}",
                displaced.len(),
                self.tier,
                key
            );
        }
        let entry = BufferEntry {
            bytes: Arc::clone(&bytes),
            loc: Some((slab_idx, start_page, pages)),
        };
        self.inner.chunk_index.lock().insert(key, entry);
        Ok(PinnedBuffer::new(
            key,
            bytes,
            Some((slab_idx, start_page)),
            Arc::clone(&self.inner),
        ))
    }

    /// Find space for `pages`: a free run, then eviction, then a new
    /// slab (halving the slab size until it fits the remaining budget).
    fn reserve_pages(
        &self,
        key: ChunkKey,
        pages: usize,
        clock: u64,
    ) -> PoolResult<(usize, usize, Vec<ChunkKey>)> {
        let mut slabs = self.inner.slabs.lock();

        for (i, slab) in slabs.iter_mut().enumerate() {
            if let Some(start) = slab.reserve(pages, key, clock) {
                return Ok((i, start, Vec::new()));
            }
        }

        // evict the cheapest run across slabs
        let victim = slabs
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.find_eviction_run(pages).map(|run| (i, run)))
            .min_by_key(|(_, (_, _, score))| *score);
        if let Some((i, (first, count, _))) = victim {
            let displaced = slabs[i].evict_run(first, count);
            let start = slabs[i]
                .reserve(pages, key, clock)
                .expect("eviction freed insufficient space");
            return Ok((i, start, displaced));
        }

        // grow: new slab, halving on budget pressure down to the minimum
        let used: usize = slabs.iter().map(|s| s.total_pages).sum();
        let budget = self.max_pages.saturating_sub(used);
        let min_slab_pages = (MIN_SLAB_SIZE / self.page_size).max(1);
        let mut want = self.slab_pages.max(pages);
        while want > budget && want / 2 >= min_slab_pages.max(pages) {
            want /= 2;
        }
        if want > budget {
            warn!(
                "{:?} tier exhausted: {} pages requested, {} in budget",
                self.tier, pages, budget
            );
            return Err(PoolError::OutOfMemory {
                tier: self.tier,
                requested_bytes: pages * self.page_size,
            });
        }
        let mut slab = Slab::new(want);
        let start = slab
            .reserve(pages, key, clock)
            .expect("fresh slab rejected reservation");
        slabs.push(slab);
        Ok((slabs.len() - 1, start, Vec::new()))
    }

    /// Pin and return a resident chunk, fetching it from the parent on a
    /// miss. Concurrent getters of the same missing key block on one
    /// fetch. A resident buffer smaller than `min_len` is refetched.
    pub fn get_buffer(&self, key: ChunkKey, min_len: usize) -> PoolResult<PinnedBuffer> {
        loop {
            if let Some(entry) = self.lookup(&key) {
                if entry.bytes.len() >= min_len {
                    match self.pin_entry(key, &entry) {
                        Some(buffer) => return Ok(buffer),
                        // evicted between lookup and pin
                        None => continue,
                    }
                }
                // resident but short: displace and refetch
                self.delete_buffer(key).ok();
            }
            match self.fetch_through(key)? {
                Some(buffer) => return Ok(buffer),
                // another getter fetched it; loop to pin the resident copy
                None => continue,
            }
        }
    }

    fn lookup(&self, key: &ChunkKey) -> Option<BufferEntry> {
        self.inner.chunk_index.lock().get(key).cloned()
    }

    fn pin_entry(&self, key: ChunkKey, entry: &BufferEntry) -> Option<PinnedBuffer> {
        match entry.loc {
            None => Some(PinnedBuffer::new(
                key,
                Arc::clone(&entry.bytes),
                None,
                Arc::clone(&self.inner),
            )),
            Some((slab_idx, start_page, _)) => {
                let clock = self.tick();
                let mut slabs = self.inner.slabs.lock();
                let slab = slabs.get_mut(slab_idx)?;
                if !slab.pin(start_page, &key) {
                    return None;
                }
                slab.touch(start_page, clock);
                drop(slabs);
                Some(PinnedBuffer::new(
                    key,
                    Arc::clone(&entry.bytes),
                    Some((slab_idx, start_page)),
                    Arc::clone(&self.inner),
                ))
            }
        }
    }

    /// Fetch a missing chunk from the parent under the key's in-flight
    /// state. Ok(None) means another thread completed the fetch and the
    /// caller should re-lookup.
    fn fetch_through(&self, key: ChunkKey) -> PoolResult<Option<PinnedBuffer>> {
        let (state, owner) = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key) {
                Some(state) => (Arc::clone(state), false),
                None => {
                    let state = Arc::new(FetchState {
                        done: Mutex::new(false),
                        cv: Condvar::new(),
                    });
                    in_flight.insert(key, Arc::clone(&state));
                    (state, true)
                }
            }
        };

        if !owner {
            let mut done = state.done.lock();
            while !*done {
                state.cv.wait(&mut done);
            }
            return Ok(None);
        }

        let result = self.fetch_from_parent(key);
        {
            let mut done = state.done.lock();
            *done = true;
            state.cv.notify_all();
        }
        self.inner.in_flight.lock().remove(&key);
        result.map(Some)
    }

    fn fetch_from_parent(&self, key: ChunkKey) -> PoolResult<PinnedBuffer> {
        let bytes: Arc<[u8]> = match &self.parent {
            ParentSource::Provider(provider) => provider
                .fetch(&key)
                .ok_or(PoolError::FetchFailed(key))?
                .shared_bytes(),
            ParentSource::Tier(parent) => parent.get_buffer(key, 0)?.shared_bytes(),
        };
        loop {
            match self.create_buffer(key, Arc::clone(&bytes)) {
                Ok(buffer) => return Ok(buffer),
                // racing creator won; pin the resident copy without
                // re-entering the in-flight path we currently own
                Err(PoolError::DuplicateKey(_)) => {
                    if let Some(entry) = self.lookup(&key) {
                        if let Some(buffer) = self.pin_entry(key, &entry) {
                            return Ok(buffer);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wrap provider-owned memory without copying. Only available when
    /// the parent is a zero-copy capable provider.
    pub fn zero_copy_buffer(&self, key: ChunkKey) -> PoolResult<PinnedBuffer> {
        let ParentSource::Provider(provider) = &self.parent else {
            return Err(PoolError::ZeroCopyUnsupported(key));
        };
        let token = provider
            .zero_copy(&key)
            .ok_or(PoolError::ZeroCopyUnsupported(key))?;
        let entry = BufferEntry {
            bytes: Arc::clone(&token.bytes),
            loc: None,
        };
        self.inner.chunk_index.lock().insert(key, entry);
        Ok(PinnedBuffer::new(
            key,
            token.bytes,
            None,
            Arc::clone(&self.inner),
        ))
    }

    /// Drop a chunk from this tier
    pub fn delete_buffer(&self, key: ChunkKey) -> PoolResult<()> {
        let entry = self
            .inner
            .chunk_index
            .lock()
            .remove(&key)
            .ok_or(PoolError::KeyNotFound(key))?;
        if let Some((slab_idx, start_page, _)) = entry.loc {
            let mut slabs = self.inner.slabs.lock();
            if let Some(slab) = slabs.get_mut(slab_idx) {
                slab.release(start_page);
            }
        }
        Ok(())
    }

    /// Drop every chunk under a prefix (a table, or one column of it)
    pub fn delete_buffers_with_prefix(&self, prefix: ChunkPrefix) -> usize {
        let removed: Vec<(ChunkKey, BufferEntry)> = {
            let mut index = self.inner.chunk_index.lock();
            let keys: Vec<ChunkKey> = index
                .keys()
                .filter(|k| k.matches(&prefix))
                .copied()
                .collect();
            keys.into_iter()
                .filter_map(|k| index.remove(&k).map(|e| (k, e)))
                .collect()
        };
        let count = removed.len();
        let mut slabs = self.inner.slabs.lock();
        for (_, entry) in removed {
            if let Some((slab_idx, start_page, _)) = entry.loc {
                if let Some(slab) = slabs.get_mut(slab_idx) {
                    slab.release(start_page);
                }
            }
        }
        count
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let slabs = self.inner.slabs.lock();
        let pages_free = slabs.iter().map(Slab::free_pages).sum();
        let pages_used = slabs.iter().map(Slab::used_pages).sum();
        PoolStats {
            num_slabs: slabs.len(),
            pages_used,
            pages_free,
            num_buffers: self.inner.chunk_index.lock().len(),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }
}

/// The tier stack: provider-backed disk level, CPU tier, GPU tier.
pub struct BufferPool {
    cpu: Arc<BufferMgr>,
    gpu: Arc<BufferMgr>,
}

impl BufferPool {
    #[must_use]
    pub fn new(
        provider: Arc<dyn DataProvider>,
        cpu_slab_bytes: usize,
        cpu_max_bytes: usize,
        gpu_slab_bytes: usize,
        gpu_max_bytes: usize,
    ) -> Self {
        let cpu = Arc::new(BufferMgr::new(
            MemTier::Cpu,
            cpu_slab_bytes,
            cpu_max_bytes,
            ParentSource::Provider(provider),
        ));
        let gpu = Arc::new(BufferMgr::new(
            MemTier::Gpu,
            gpu_slab_bytes,
            gpu_max_bytes,
            ParentSource::Tier(Arc::clone(&cpu)),
        ));
        Self { cpu, gpu }
    }

    #[inline]
    #[must_use]
    pub fn cpu(&self) -> &Arc<BufferMgr> {
        &self.cpu
    }

    #[inline]
    #[must_use]
    pub fn gpu(&self) -> &Arc<BufferMgr> {
        &self.gpu
    }

    #[must_use]
    pub fn tier(&self, tier: MemTier) -> &Arc<BufferMgr> {
        match tier {
            MemTier::Gpu => &self.gpu,
            _ => &self.cpu,
        }
    }
}
